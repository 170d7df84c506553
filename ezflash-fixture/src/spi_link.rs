// SPDX-License-Identifier: MIT

//! Non-blocking SPI transfer queue for EZPort command chains.
//!
//! Exchanges are queued by the machine's actions and pumped from the main
//! loop a FIFO-load at a time; nothing here blocks on the wire. Chip select
//! frames each exchange (the WREN latch commits on the CS rising edge, so
//! chained commands must not share a frame). A completed status read yields
//! the fresh [`Status`] for dispatch as a `CommandDone` event; bare commands
//! complete silently and the next queued exchange starts immediately.
//!
//! Only completion is modeled. A transfer that never finishes (wiring fault,
//! unpowered target) simply stops producing events and the phase watchdog
//! fails the run.

use embedded_hal::digital::OutputPin;
use embedded_hal_nb::spi::FullDuplex;
use heapless::Deque;

use ezflash_common::{Opcode, Status, RDSR_FRAME_LEN, SP_HEADER_LEN};

use crate::peripherals::{CsOutPin, FixtureSpi};

/// Depth of the PL022 TX/RX FIFOs.
const SPI_FIFO_DEPTH: usize = 8;

/// One chip-select-framed exchange.
pub enum Exchange {
    /// Single opcode, nothing read back.
    Command(Opcode),
    /// RDSR: opcode plus one clocked status byte (the byte clocked during
    /// the opcode is discarded).
    StatusRead,
    /// SP header followed by one sector of payload.
    SectorProgram {
        header: [u8; SP_HEADER_LEN],
        data: &'static [u8],
    },
}

impl Exchange {
    fn len(&self) -> usize {
        match self {
            Exchange::Command(_) => 1,
            Exchange::StatusRead => RDSR_FRAME_LEN,
            Exchange::SectorProgram { data, .. } => SP_HEADER_LEN + data.len(),
        }
    }

    fn tx_byte(&self, index: usize) -> u8 {
        match self {
            Exchange::Command(op) => op.byte(),
            Exchange::StatusRead => {
                if index == 0 {
                    Opcode::Rdsr.byte()
                } else {
                    0
                }
            }
            Exchange::SectorProgram { header, data } => {
                if index < SP_HEADER_LEN {
                    header[index]
                } else {
                    data[index - SP_HEADER_LEN]
                }
            }
        }
    }
}

struct ActiveExchange {
    exchange: Exchange,
    sent: usize,
    rcvd: usize,
    last_byte: u8,
}

struct Bus {
    spi: FixtureSpi,
    cs: CsOutPin,
}

/// The transfer engine. Holds the bus only while a session is attached.
pub struct SpiLink {
    bus: Option<Bus>,
    queue: Deque<Exchange, 4>,
    active: Option<ActiveExchange>,
}

impl SpiLink {
    pub const fn new() -> Self {
        Self {
            bus: None,
            queue: Deque::new(),
            active: None,
        }
    }

    /// Take ownership of the enabled bus for one programming session.
    pub fn attach(&mut self, spi: FixtureSpi, cs: CsOutPin) {
        self.bus = Some(Bus { spi, cs });
    }

    /// Drop all pending work and give the bus back. Any exchange in flight
    /// is abandoned; the SPI block is re-initialized on the next session.
    pub fn detach(&mut self) -> Option<(FixtureSpi, CsOutPin)> {
        while self.queue.pop_front().is_some() {}
        self.active = None;
        self.bus.take().map(|bus| (bus.spi, bus.cs))
    }

    pub fn enqueue(&mut self, exchange: Exchange) {
        if self.queue.push_back(exchange).is_err() {
            defmt::warn!("spi: transfer queue full, dropping exchange");
        }
    }

    /// Advance the engine: keep the TX FIFO fed, drain the RX FIFO, finish
    /// exchanges. Returns the status of a just-completed status read.
    pub fn pump(&mut self) -> Option<Status> {
        let bus = self.bus.as_mut()?;

        loop {
            if self.active.is_none() {
                let next = self.queue.pop_front()?;
                bus.cs.set_low().ok();
                self.active = Some(ActiveExchange {
                    exchange: next,
                    sent: 0,
                    rcvd: 0,
                    last_byte: 0,
                });
            }
            let active = self.active.as_mut()?;
            let total = active.exchange.len();

            // Drain before feeding: with at most a FIFO's worth of bytes in
            // flight the RX side can never overrun.
            while active.rcvd < active.sent {
                match bus.spi.read() {
                    Ok(byte) => {
                        active.last_byte = byte;
                        active.rcvd += 1;
                    }
                    Err(_) => break,
                }
            }
            while active.sent < total && active.sent - active.rcvd < SPI_FIFO_DEPTH {
                match bus.spi.write(active.exchange.tx_byte(active.sent)) {
                    Ok(()) => active.sent += 1,
                    Err(_) => break,
                }
            }

            if active.rcvd < total {
                return None;
            }

            bus.cs.set_high().ok();
            let done = self.active.take()?;
            if matches!(done.exchange, Exchange::StatusRead) {
                return Some(Status::from_bits(done.last_byte));
            }
        }
    }
}
