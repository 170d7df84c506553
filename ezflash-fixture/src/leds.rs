// SPDX-License-Identifier: MIT

//! Result indicator LEDs.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use ezflash_common::RunResult;

use crate::peripherals::{FailLedPin, OkLedPin};

/// The two operator-facing LEDs. Stateless: every call projects a result
/// onto the pins, mutually exclusive.
pub struct StatusLeds {
    ok: OkLedPin,
    fail: FailLedPin,
}

impl StatusLeds {
    pub fn new(ok: OkLedPin, fail: FailLedPin) -> Self {
        Self { ok, fail }
    }

    /// `Unknown` → both off, `Success` → green, `Fail` → red.
    pub fn show(&mut self, result: RunResult) {
        self.ok.set_low().ok();
        self.fail.set_low().ok();
        match result {
            RunResult::Unknown => {}
            RunResult::Success => {
                self.ok.set_high().ok();
            }
            RunResult::Fail => {
                self.fail.set_high().ok();
            }
        }
    }

    /// Flash both LEDs once at boot so a dead indicator is caught before it
    /// can silently report anything.
    pub fn lamp_test(&mut self, delay: &mut impl DelayNs) {
        self.ok.set_high().ok();
        self.fail.set_high().ok();
        delay.delay_ms(150);
        self.ok.set_low().ok();
        self.fail.set_low().ok();
    }
}
