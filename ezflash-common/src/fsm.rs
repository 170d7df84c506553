// SPDX-License-Identifier: MIT

//! Flash-programming state machine.
//!
//! This is the single stateful component of the fixture. It consumes discrete
//! events (pin edges, command completions, timeouts) and drives the target
//! through power-up, EZPort handshake, bulk erase, sector-by-sector
//! programming and the final reset-and-boot confirmation. All hardware access
//! goes through the [`FixtureOps`] capability trait, which keeps the machine
//! free of `rp2040-hal` types and fully testable on the host.
//!
//! Each event runs one transition to completion; the machine never blocks.
//! Anything whose completion is not immediate (an SPI exchange, a deadline)
//! is started here and resumes the machine later through a new event.

use crate::status::Status;

/// Power/reset settle deadline after switching the target rail on.
pub const POWER_SETTLE_TIMEOUT_MS: u32 = 10;
/// Worst-case bulk erase duration per the target datasheet.
pub const BULK_ERASE_TIMEOUT_MS: u32 = 300;
/// Worst-case single sector program duration per the target datasheet.
pub const SECTOR_PROGRAM_TIMEOUT_MS: u32 = 200;
/// Allowance for the reprogrammed application to boot and blink its LED.
pub const BOOT_CONFIRM_TIMEOUT_MS: u32 = 1000;

/// Run states. Exactly one is active; the machine cycles `Off → … → Off`
/// once per button press, with no state carried across runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunState {
    /// Idle, target unpowered. A button press starts a run.
    Off,
    /// Rail is on, chip select held low; waiting for the target's reset line
    /// to rise so we know it latched EZPort mode.
    PoweredWaitingReset,
    /// EZPort handshake: first status read in flight.
    EzPortActive,
    /// Bulk erase issued; polling WIP until the array is blank.
    Erasing,
    /// Sector programming; alternates one SP command per WIP-clear.
    Programming,
    /// Target released into its application; waiting for its LED to blink.
    AppRunning,
}

/// External event observed by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FsmEvent {
    /// Operator pressed the program button.
    ButtonPressed,
    /// The target's reset line rose: it is out of reset with CS held low,
    /// i.e. running its EZPort bootloader.
    TargetResetEdge,
    /// The target's onboard LED toggled: the flashed application is alive.
    TargetLedEdge,
    /// A queued command chain finished; carries the fresh status snapshot.
    CommandDone(Status),
    /// The armed phase watchdog expired.
    TimedOut,
}

/// Tri-state outcome projected onto the two fixture LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RunResult {
    /// Run in progress (or never started): both LEDs off.
    #[default]
    Unknown,
    Success,
    Fail,
}

/// Payload image geometry rejected at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ImageError {
    /// Zero-length payload; nothing to program.
    Empty,
    /// The payload length is not a whole number of flash sectors. The cursor
    /// invariant would not hold; the image is rejected rather than padded or
    /// truncated.
    NotSectorAligned,
}

/// Hardware capabilities the machine drives. Implemented by the fixture
/// board glue on the device and by a recording mock in the host tests.
///
/// Operations that expect a completion (`read_status`, `bulk_erase`,
/// `program_sector`) end their transfer chain with a status read whose
/// completion is delivered back as [`FsmEvent::CommandDone`].
/// `reset_target` has no completion; the run ends via the LED edge or the
/// boot watchdog.
pub trait FixtureOps {
    /// Assert chip select low and switch the target power rail on. CS must
    /// already be low when the target leaves reset for it to latch EZPort
    /// mode.
    fn power_on(&mut self);
    /// Switch the rail off and float every target-facing pin.
    fn power_off(&mut self);
    /// Hand the four EZPort signals to the SPI peripheral.
    fn attach_spi(&mut self);
    /// Queue an RDSR exchange.
    fn read_status(&mut self);
    /// Queue WREN, BE, and the follow-up status read.
    fn bulk_erase(&mut self);
    /// Queue WREN, SP for one sector at `addr`, and the follow-up status
    /// read.
    fn program_sector(&mut self, addr: u32);
    /// Queue the RESET command releasing the target into its application.
    fn reset_target(&mut self);
    /// Arm the single-slot one-shot watchdog.
    fn arm_timeout(&mut self, ms: u32);
    /// Disarm the watchdog. Idempotent; a no-op when nothing is pending.
    fn cancel_timeout(&mut self);
    /// Project the run result onto the LEDs.
    fn show_result(&mut self, result: RunResult);
}

/// Side effect to execute after a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsmAction {
    /// Clear the LEDs, power the target and start the reset-settle watchdog.
    BeginRun,
    /// Reset edge seen: mux the SPI pins and read the first status.
    EnterEzPort,
    /// Status is sane: erase the whole array under the erase watchdog.
    BeginErase,
    /// WIP still set: reissue the status read, watchdog untouched.
    PollStatus,
    /// Program one sector at `addr` under a fresh per-sector watchdog.
    /// Shared by the erase-complete entry (`addr == 0`) and the
    /// `Programming` self-loop.
    ProgramSector { addr: u32 },
    /// Image fully programmed: release the target and wait for it to boot.
    ReleaseTarget,
    /// Target LED blinked: the run succeeded.
    Finish,
    /// Shared error path: watchdog expiry, brick condition, or an event this
    /// state has no business receiving.
    Abort,
}

/// Result of one pure transition step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FsmStep {
    next_state: RunState,
    action: FsmAction,
}

/// The flash-programming state machine. One instance exists for the lifetime
/// of the fixture; it owns all mutable run state (current state, program
/// cursor).
pub struct FlashFsm {
    state: RunState,
    /// Byte offset of the next sector to program. Always sector-aligned;
    /// equals `image_len` exactly when programming hands over to
    /// [`RunState::AppRunning`].
    cursor: u32,
    image_len: u32,
    sector_size: u32,
}

impl FlashFsm {
    /// Create the machine in [`RunState::Off`] for an image of `image_len`
    /// bytes programmed in `sector_size`-byte units.
    pub fn new(image_len: u32, sector_size: u32) -> Result<Self, ImageError> {
        if image_len == 0 {
            return Err(ImageError::Empty);
        }
        if sector_size == 0 || image_len % sector_size != 0 {
            return Err(ImageError::NotSectorAligned);
        }
        Ok(Self {
            state: RunState::Off,
            cursor: 0,
            image_len,
            sector_size,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Current program cursor, for progress reporting.
    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    /// Dispatch one event: run the transition to completion, side effects
    /// included. Must not be re-entered from inside a capability call.
    pub fn handle(&mut self, event: FsmEvent, ops: &mut impl FixtureOps) {
        let step = self.transition(event);
        self.state = step.next_state;
        self.run_action(step.action, ops);
    }

    /// Pure transition function: `(state, event) → (next state, action)`.
    /// Unlisted pairs resolve to the shared error path.
    fn transition(&self, event: FsmEvent) -> FsmStep {
        use RunState::*;

        match (self.state, event) {
            (Off, FsmEvent::ButtonPressed) => FsmStep {
                next_state: PoweredWaitingReset,
                action: FsmAction::BeginRun,
            },
            (PoweredWaitingReset, FsmEvent::TargetResetEdge) => FsmStep {
                next_state: EzPortActive,
                action: FsmAction::EnterEzPort,
            },
            // A secured part with bulk erase disabled is unrecoverable:
            // fail before attempting any erase.
            (EzPortActive, FsmEvent::CommandDone(status)) if status.bricked() => FsmStep {
                next_state: Off,
                action: FsmAction::Abort,
            },
            (EzPortActive, FsmEvent::CommandDone(_)) => FsmStep {
                next_state: Erasing,
                action: FsmAction::BeginErase,
            },
            (Erasing, FsmEvent::CommandDone(status)) if status.wip() => FsmStep {
                next_state: Erasing,
                action: FsmAction::PollStatus,
            },
            (Erasing, FsmEvent::CommandDone(_)) => FsmStep {
                next_state: Programming,
                action: FsmAction::ProgramSector { addr: 0 },
            },
            (Programming, FsmEvent::CommandDone(status)) if status.wip() => FsmStep {
                next_state: Programming,
                action: FsmAction::PollStatus,
            },
            (Programming, FsmEvent::CommandDone(_)) if self.cursor < self.image_len => FsmStep {
                next_state: Programming,
                action: FsmAction::ProgramSector { addr: self.cursor },
            },
            (Programming, FsmEvent::CommandDone(_)) => FsmStep {
                next_state: AppRunning,
                action: FsmAction::ReleaseTarget,
            },
            (AppRunning, FsmEvent::TargetLedEdge) => FsmStep {
                next_state: Off,
                action: FsmAction::Finish,
            },
            // Watchdog expiry in any state, and every undefined pair.
            _ => FsmStep {
                next_state: Off,
                action: FsmAction::Abort,
            },
        }
    }

    fn run_action(&mut self, action: FsmAction, ops: &mut impl FixtureOps) {
        match action {
            FsmAction::BeginRun => {
                ops.show_result(RunResult::Unknown);
                ops.power_on();
                ops.arm_timeout(POWER_SETTLE_TIMEOUT_MS);
            }
            FsmAction::EnterEzPort => {
                ops.cancel_timeout();
                ops.attach_spi();
                ops.read_status();
            }
            FsmAction::BeginErase => {
                ops.bulk_erase();
                ops.arm_timeout(BULK_ERASE_TIMEOUT_MS);
            }
            FsmAction::PollStatus => {
                ops.read_status();
            }
            FsmAction::ProgramSector { addr } => {
                ops.cancel_timeout();
                ops.program_sector(addr);
                self.cursor = addr + self.sector_size;
                ops.arm_timeout(SECTOR_PROGRAM_TIMEOUT_MS);
            }
            FsmAction::ReleaseTarget => {
                ops.cancel_timeout();
                ops.reset_target();
                ops.arm_timeout(BOOT_CONFIRM_TIMEOUT_MS);
            }
            FsmAction::Finish => {
                ops.cancel_timeout();
                ops.show_result(RunResult::Success);
                ops.power_off();
            }
            FsmAction::Abort => {
                ops.cancel_timeout();
                ops.show_result(RunResult::Fail);
                ops.power_off();
            }
        }
    }
}
