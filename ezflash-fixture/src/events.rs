// SPDX-License-Identifier: MIT

//! Edge event source: GPIO interrupts to discrete machine events.
//!
//! The handler clears each pending edge flag and enqueues the matching event
//! in fixed priority order (button, target reset, target LED). The queue is
//! drained by the main loop, which runs every transition to completion, so
//! the machine is never re-entered from interrupt context.

use core::cell::RefCell;

use critical_section::{CriticalSection, Mutex};
use heapless::Deque;
use rp2040_hal::gpio::Interrupt::{EdgeHigh, EdgeLow};
use rp2040_hal::pac;
use rp2040_hal::pac::interrupt;

use ezflash_common::FsmEvent;

use crate::peripherals::{ButtonPin, LedSensePin, ResetSensePin};

/// Lockout between accepted button edges. The button pin has no hardware
/// glitch filter on this part, so contact bounce is suppressed in software.
const BUTTON_LOCKOUT_US: u32 = 30_000;

/// The three edge-sensing inputs.
pub struct SensePins {
    pub button: ButtonPin,
    pub reset_sense: ResetSensePin,
    pub led_sense: LedSensePin,
}

struct EdgeSources {
    pins: SensePins,
    last_button_us: u32,
}

static SOURCES: Mutex<RefCell<Option<EdgeSources>>> = Mutex::new(RefCell::new(None));
static PENDING: Mutex<RefCell<Deque<FsmEvent, 8>>> = Mutex::new(RefCell::new(Deque::new()));

/// Park the sense pins in the handler's care and enable their edge
/// interrupts. Call once, before unmasking `IO_IRQ_BANK0`.
pub fn init(pins: SensePins) {
    // Button is active low (pull-up); the target's reset line rises out of
    // reset; the target LED sinks current when lit.
    pins.button.set_interrupt_enabled(EdgeLow, true);
    pins.reset_sense.set_interrupt_enabled(EdgeHigh, true);
    pins.led_sense.set_interrupt_enabled(EdgeLow, true);

    critical_section::with(|cs| {
        SOURCES.borrow_ref_mut(cs).replace(EdgeSources {
            pins,
            last_button_us: 0,
        });
    });
}

/// Next queued event, oldest first.
pub fn next_pending() -> Option<FsmEvent> {
    critical_section::with(|cs| PENDING.borrow_ref_mut(cs).pop_front())
}

fn push(cs: CriticalSection, event: FsmEvent) {
    if PENDING.borrow_ref_mut(cs).push_back(event).is_err() {
        defmt::warn!("events: queue full, dropping {:?}", event);
    }
}

/// Raw microsecond counter, safe to read from interrupt context.
fn now_us() -> u32 {
    // TIMERAWL reads the running low word without latching TIMEHR.
    unsafe { (*pac::TIMER::ptr()).timerawl().read().bits() }
}

#[interrupt]
fn IO_IRQ_BANK0() {
    critical_section::with(|cs| {
        let mut sources = SOURCES.borrow_ref_mut(cs);
        let Some(src) = sources.as_mut() else {
            return;
        };

        // Fixed delivery priority: button, then reset sense, then LED sense.
        if src.pins.button.interrupt_status(EdgeLow) {
            src.pins.button.clear_interrupt(EdgeLow);
            let now = now_us();
            if now.wrapping_sub(src.last_button_us) >= BUTTON_LOCKOUT_US {
                src.last_button_us = now;
                push(cs, FsmEvent::ButtonPressed);
            }
        }
        if src.pins.reset_sense.interrupt_status(EdgeHigh) {
            src.pins.reset_sense.clear_interrupt(EdgeHigh);
            push(cs, FsmEvent::TargetResetEdge);
        }
        if src.pins.led_sense.interrupt_status(EdgeLow) {
            src.pins.led_sense.clear_interrupt(EdgeLow);
            push(cs, FsmEvent::TargetLedEdge);
        }
    });
}
