// SPDX-License-Identifier: MIT

//! Single-slot one-shot watchdog on hardware alarm 0.
//!
//! The machine owns at most one outstanding deadline at a time and cancels
//! it explicitly before leaving the state that armed it. Expiry is latched
//! into a flag and converted into a `TimedOut` event by the main loop, never
//! dispatched from interrupt context.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
use fugit::MicrosDurationU32;
use rp2040_hal::pac::interrupt;
use rp2040_hal::timer::{Alarm, Alarm0};

static ALARM: Mutex<RefCell<Option<Alarm0>>> = Mutex::new(RefCell::new(None));
static FIRED: AtomicBool = AtomicBool::new(false);

/// Hand the alarm to the service. Call once, before unmasking `TIMER_IRQ_0`.
pub fn init(mut alarm: Alarm0) {
    alarm.enable_interrupt();
    critical_section::with(|cs| {
        ALARM.borrow_ref_mut(cs).replace(alarm);
    });
}

/// Arm the slot for `ms` milliseconds from now.
pub fn arm(ms: u32) {
    critical_section::with(|cs| {
        if let Some(alarm) = ALARM.borrow_ref_mut(cs).as_mut() {
            alarm.schedule(MicrosDurationU32::millis(ms)).ok();
        }
    });
}

/// Disarm the slot. Idempotent: cancelling with nothing pending is a no-op.
/// Also drops an expiry that fired but has not been consumed yet, so a
/// cancelled deadline can never fail the phase that follows it.
pub fn cancel() {
    critical_section::with(|cs| {
        if let Some(alarm) = ALARM.borrow_ref_mut(cs).as_mut() {
            alarm.cancel().ok();
        }
        FIRED.store(false, Ordering::Relaxed);
    });
}

/// True exactly once per expiry; consumed by the main loop.
pub fn fired() -> bool {
    FIRED.swap(false, Ordering::AcqRel)
}

#[interrupt]
fn TIMER_IRQ_0() {
    critical_section::with(|cs| {
        if let Some(alarm) = ALARM.borrow_ref_mut(cs).as_mut() {
            alarm.clear_interrupt();
        }
    });
    FIRED.store(true, Ordering::Release);
}
