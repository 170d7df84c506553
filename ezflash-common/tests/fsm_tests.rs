// SPDX-License-Identifier: MIT

//! Host tests for the flash-programming state machine, driven through a
//! recording mock of the fixture capabilities.

use ezflash_common::fsm::{
    FixtureOps, FlashFsm, FsmEvent, ImageError, RunResult, RunState, BOOT_CONFIRM_TIMEOUT_MS,
    BULK_ERASE_TIMEOUT_MS, POWER_SETTLE_TIMEOUT_MS, SECTOR_PROGRAM_TIMEOUT_MS,
};
use ezflash_common::status::Status;

const SECTOR: u32 = 1024;

/// Everything the machine asked the hardware to do, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    PowerOn,
    PowerOff,
    AttachSpi,
    ReadStatus,
    BulkErase,
    ProgramSector(u32),
    ResetTarget,
    ArmTimeout(u32),
    CancelTimeout,
    ShowResult(RunResult),
}

#[derive(Default)]
struct MockFixture {
    ops: Vec<Op>,
}

impl MockFixture {
    fn count(&self, op: Op) -> usize {
        self.ops.iter().filter(|&&o| o == op).count()
    }

    fn programmed_addrs(&self) -> Vec<u32> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::ProgramSector(addr) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    fn last_result(&self) -> Option<RunResult> {
        self.ops.iter().rev().find_map(|op| match op {
            Op::ShowResult(r) => Some(*r),
            _ => None,
        })
    }
}

impl FixtureOps for MockFixture {
    fn power_on(&mut self) {
        self.ops.push(Op::PowerOn);
    }
    fn power_off(&mut self) {
        self.ops.push(Op::PowerOff);
    }
    fn attach_spi(&mut self) {
        self.ops.push(Op::AttachSpi);
    }
    fn read_status(&mut self) {
        self.ops.push(Op::ReadStatus);
    }
    fn bulk_erase(&mut self) {
        self.ops.push(Op::BulkErase);
    }
    fn program_sector(&mut self, addr: u32) {
        self.ops.push(Op::ProgramSector(addr));
    }
    fn reset_target(&mut self) {
        self.ops.push(Op::ResetTarget);
    }
    fn arm_timeout(&mut self, ms: u32) {
        self.ops.push(Op::ArmTimeout(ms));
    }
    fn cancel_timeout(&mut self) {
        self.ops.push(Op::CancelTimeout);
    }
    fn show_result(&mut self, result: RunResult) {
        self.ops.push(Op::ShowResult(result));
    }
}

fn idle_status() -> Status {
    Status::from_bits(0)
}

fn busy_status() -> Status {
    Status::from_bits(Status::WIP)
}

fn bricked_status() -> Status {
    Status::from_bits(Status::FS | Status::BEDIS)
}

fn fsm(image_len: u32) -> FlashFsm {
    FlashFsm::new(image_len, SECTOR).expect("valid image geometry")
}

/// Drive a fresh machine along the happy path up to (and including) the
/// given state.
fn fsm_in(state: RunState, image_len: u32) -> (FlashFsm, MockFixture) {
    let mut m = fsm(image_len);
    let mut hw = MockFixture::default();

    let path: &[(RunState, FsmEvent)] = &[
        (RunState::PoweredWaitingReset, FsmEvent::ButtonPressed),
        (RunState::EzPortActive, FsmEvent::TargetResetEdge),
        (RunState::Erasing, FsmEvent::CommandDone(idle_status())),
        (RunState::Programming, FsmEvent::CommandDone(idle_status())),
    ];
    for &(reached, event) in path {
        if m.state() == state {
            return (m, hw);
        }
        m.handle(event, &mut hw);
        assert_eq!(m.state(), reached);
    }
    if state == RunState::AppRunning {
        // Finish programming every sector, then release the target.
        while m.cursor() < image_len {
            m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
        }
        m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
        assert_eq!(m.state(), RunState::AppRunning);
    }
    (m, hw)
}

#[test]
fn test_button_press_starts_run() {
    let mut m = fsm(SECTOR);
    let mut hw = MockFixture::default();

    m.handle(FsmEvent::ButtonPressed, &mut hw);

    assert_eq!(m.state(), RunState::PoweredWaitingReset);
    assert_eq!(
        hw.ops,
        vec![
            Op::ShowResult(RunResult::Unknown),
            Op::PowerOn,
            Op::ArmTimeout(POWER_SETTLE_TIMEOUT_MS),
        ]
    );
}

#[test]
fn test_missing_reset_edge_fails_run() {
    let (mut m, mut hw) = fsm_in(RunState::PoweredWaitingReset, SECTOR);

    m.handle(FsmEvent::TimedOut, &mut hw);

    assert_eq!(m.state(), RunState::Off);
    assert_eq!(hw.last_result(), Some(RunResult::Fail));
    assert_eq!(hw.count(Op::PowerOff), 1);
}

#[test]
fn test_reset_edge_enters_ezport_and_reads_status() {
    let (mut m, mut hw) = fsm_in(RunState::PoweredWaitingReset, SECTOR);
    hw.ops.clear();

    m.handle(FsmEvent::TargetResetEdge, &mut hw);

    assert_eq!(m.state(), RunState::EzPortActive);
    assert_eq!(hw.ops, vec![Op::CancelTimeout, Op::AttachSpi, Op::ReadStatus]);
}

#[test]
fn test_secured_target_aborts_before_erase() {
    let (mut m, mut hw) = fsm_in(RunState::EzPortActive, SECTOR);

    m.handle(FsmEvent::CommandDone(bricked_status()), &mut hw);

    assert_eq!(m.state(), RunState::Off);
    assert_eq!(hw.last_result(), Some(RunResult::Fail));
    assert_eq!(hw.count(Op::BulkErase), 0);
    assert_eq!(hw.count(Op::ProgramSector(0)), 0);
}

#[test]
fn test_sane_status_starts_bulk_erase() {
    let (mut m, mut hw) = fsm_in(RunState::EzPortActive, SECTOR);
    hw.ops.clear();

    m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);

    assert_eq!(m.state(), RunState::Erasing);
    assert_eq!(
        hw.ops,
        vec![Op::BulkErase, Op::ArmTimeout(BULK_ERASE_TIMEOUT_MS)]
    );
}

#[test]
fn test_erase_polls_until_wip_clears() {
    let (mut m, mut hw) = fsm_in(RunState::Erasing, SECTOR);
    hw.ops.clear();

    // N completions with WIP set reissue the poll without changing state.
    const N: usize = 5;
    for _ in 0..N {
        m.handle(FsmEvent::CommandDone(busy_status()), &mut hw);
        assert_eq!(m.state(), RunState::Erasing);
    }
    assert_eq!(hw.count(Op::ReadStatus), N);

    // WIP clear: exactly one transition to programming, first sector at 0.
    m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
    assert_eq!(m.state(), RunState::Programming);
    assert_eq!(hw.programmed_addrs(), vec![0]);
}

#[test]
fn test_erase_stuck_busy_fails_on_watchdog() {
    let (mut m, mut hw) = fsm_in(RunState::Erasing, SECTOR);

    m.handle(FsmEvent::CommandDone(busy_status()), &mut hw);
    m.handle(FsmEvent::TimedOut, &mut hw);

    assert_eq!(m.state(), RunState::Off);
    assert_eq!(hw.last_result(), Some(RunResult::Fail));
}

#[test]
fn test_programs_every_sector_once() {
    let image_len = 3 * SECTOR;
    let (mut m, mut hw) = fsm_in(RunState::Erasing, image_len);
    hw.ops.clear();

    // Erase done: sector 0 goes out, then one sector per WIP-clear poll.
    m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
    assert_eq!(m.cursor(), SECTOR);
    m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
    assert_eq!(m.cursor(), 2 * SECTOR);
    m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
    assert_eq!(m.cursor(), 3 * SECTOR);
    assert_eq!(m.state(), RunState::Programming);

    // Final WIP-clear: nothing left, release the target.
    m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
    assert_eq!(m.state(), RunState::AppRunning);
    assert_eq!(m.cursor(), image_len);

    assert_eq!(hw.programmed_addrs(), vec![0, SECTOR, 2 * SECTOR]);
    assert_eq!(hw.count(Op::ArmTimeout(SECTOR_PROGRAM_TIMEOUT_MS)), 3);
    assert_eq!(hw.count(Op::ResetTarget), 1);
    assert_eq!(hw.count(Op::ArmTimeout(BOOT_CONFIRM_TIMEOUT_MS)), 1);
}

#[test]
fn test_program_phase_polls_while_busy() {
    let (mut m, mut hw) = fsm_in(RunState::Programming, 2 * SECTOR);
    hw.ops.clear();

    m.handle(FsmEvent::CommandDone(busy_status()), &mut hw);
    m.handle(FsmEvent::CommandDone(busy_status()), &mut hw);

    assert_eq!(m.state(), RunState::Programming);
    assert_eq!(hw.ops, vec![Op::ReadStatus, Op::ReadStatus]);
    // Polling must not advance the cursor.
    assert_eq!(m.cursor(), SECTOR);
}

#[test]
fn test_cursor_stays_sector_aligned_and_bounded() {
    let image_len = 4 * SECTOR;
    let mut m = fsm(image_len);
    let mut hw = MockFixture::default();

    let events = [
        FsmEvent::ButtonPressed,
        FsmEvent::TargetResetEdge,
        FsmEvent::CommandDone(idle_status()),
        FsmEvent::CommandDone(busy_status()),
        FsmEvent::CommandDone(idle_status()),
        FsmEvent::CommandDone(busy_status()),
        FsmEvent::CommandDone(idle_status()),
        FsmEvent::CommandDone(idle_status()),
        FsmEvent::CommandDone(idle_status()),
        FsmEvent::CommandDone(idle_status()),
    ];
    for event in events {
        m.handle(event, &mut hw);
        assert_eq!(m.cursor() % SECTOR, 0);
        assert!(m.cursor() <= image_len);
    }
    // The cursor covers the whole image exactly when the target is released.
    assert_eq!(m.state(), RunState::AppRunning);
    assert_eq!(m.cursor(), image_len);
}

#[test]
fn test_target_led_edge_completes_run() {
    let (mut m, mut hw) = fsm_in(RunState::AppRunning, SECTOR);
    hw.ops.clear();

    m.handle(FsmEvent::TargetLedEdge, &mut hw);

    assert_eq!(m.state(), RunState::Off);
    assert_eq!(
        hw.ops,
        vec![
            Op::CancelTimeout,
            Op::ShowResult(RunResult::Success),
            Op::PowerOff,
        ]
    );
}

#[test]
fn test_boot_watchdog_fails_run() {
    let (mut m, mut hw) = fsm_in(RunState::AppRunning, SECTOR);

    m.handle(FsmEvent::TimedOut, &mut hw);

    assert_eq!(m.state(), RunState::Off);
    assert_eq!(hw.last_result(), Some(RunResult::Fail));
    assert_eq!(hw.count(Op::PowerOff), 1);
}

#[test]
fn test_undefined_pairs_resolve_to_failed_run() {
    use FsmEvent::*;
    use RunState::*;

    let all_events = [
        ButtonPressed,
        TargetResetEdge,
        TargetLedEdge,
        CommandDone(idle_status()),
        TimedOut,
    ];
    let defined: &[(RunState, FsmEvent)] = &[
        (Off, ButtonPressed),
        (PoweredWaitingReset, TargetResetEdge),
        (EzPortActive, CommandDone(idle_status())),
        (Erasing, CommandDone(idle_status())),
        (Programming, CommandDone(idle_status())),
        (AppRunning, TargetLedEdge),
    ];

    for state in [
        Off,
        PoweredWaitingReset,
        EzPortActive,
        Erasing,
        Programming,
        AppRunning,
    ] {
        for event in all_events {
            if defined.contains(&(state, event)) {
                continue;
            }
            let (mut m, mut hw) = fsm_in(state, 2 * SECTOR);
            m.handle(event, &mut hw);
            assert_eq!(m.state(), Off, "({state:?}, {event:?})");
            assert_eq!(
                hw.last_result(),
                Some(RunResult::Fail),
                "({state:?}, {event:?})"
            );
        }
    }
}

#[test]
fn test_watchdog_rearm_is_preceded_by_cancel() {
    let (mut m, mut hw) = fsm_in(RunState::Erasing, 2 * SECTOR);
    while m.state() != RunState::AppRunning {
        m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
    }

    // Between any two arm calls there must be an explicit cancel: the
    // timeout slot is single-shot and never implicitly superseded.
    let mut cancel_seen = true;
    for op in &hw.ops {
        match op {
            Op::ArmTimeout(_) => {
                assert!(cancel_seen, "armed twice without an intervening cancel");
                cancel_seen = false;
            }
            Op::CancelTimeout => cancel_seen = true,
            _ => {}
        }
    }
}

#[test]
fn test_failed_run_can_be_restarted() {
    let (mut m, mut hw) = fsm_in(RunState::Erasing, SECTOR);
    m.handle(FsmEvent::TimedOut, &mut hw);
    assert_eq!(m.state(), RunState::Off);

    hw.ops.clear();
    m.handle(FsmEvent::ButtonPressed, &mut hw);

    assert_eq!(m.state(), RunState::PoweredWaitingReset);
    assert_eq!(hw.ops[0], Op::ShowResult(RunResult::Unknown));
    // A new run reprograms from the start.
    m.handle(FsmEvent::TargetResetEdge, &mut hw);
    m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
    m.handle(FsmEvent::CommandDone(idle_status()), &mut hw);
    assert_eq!(hw.programmed_addrs(), vec![0]);
}

#[test]
fn test_image_geometry_is_validated() {
    assert!(matches!(FlashFsm::new(0, SECTOR), Err(ImageError::Empty)));
    assert!(matches!(
        FlashFsm::new(SECTOR + 1, SECTOR),
        Err(ImageError::NotSectorAligned)
    ));
    assert!(matches!(
        FlashFsm::new(SECTOR, 0),
        Err(ImageError::NotSectorAligned)
    ));
    assert!(FlashFsm::new(3 * SECTOR, SECTOR).is_ok());
}
