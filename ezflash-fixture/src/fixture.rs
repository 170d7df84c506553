// SPDX-License-Identifier: MIT

//! Board-level implementation of the machine's capability trait.
//!
//! Every [`FixtureOps`] call maps onto the target port, the transfer queue,
//! the watchdog slot, or the LEDs; progress is mirrored onto the USB side
//! channel as it happens.

use ezflash_common::{sp_header, FixtureOps, Opcode, Report, RunResult, Status};

use crate::leds::StatusLeds;
use crate::payload;
use crate::peripherals::TargetPort;
use crate::spi_link::{Exchange, SpiLink};
use crate::timeout;
use crate::usb_transport::UsbTransport;

pub struct Fixture {
    port: TargetPort,
    link: SpiLink,
    leds: StatusLeds,
    usb: Option<UsbTransport>,
}

impl Fixture {
    pub fn new(port: TargetPort, leds: StatusLeds, usb: Option<UsbTransport>) -> Self {
        Self {
            port,
            link: SpiLink::new(),
            leds,
            usb,
        }
    }

    /// One main-loop round of background work: USB housekeeping and the SPI
    /// engine. Returns the status of a just-completed command chain.
    pub fn poll(&mut self) -> Option<Status> {
        if let Some(usb) = self.usb.as_mut() {
            usb.poll();
        }
        self.link.pump()
    }

    pub fn report(&mut self, report: Report) {
        if let Some(usb) = self.usb.as_mut() {
            usb.send(&report);
        }
    }
}

impl FixtureOps for Fixture {
    fn power_on(&mut self) {
        defmt::println!("run: target power on");
        self.port.power_on();
        self.report(Report::RunStarted);
    }

    fn power_off(&mut self) {
        let bus = self.link.detach();
        self.port.release(bus);
        defmt::println!("run: pins floated, rail off");
    }

    fn attach_spi(&mut self) {
        match self.port.build_spi() {
            Some((spi, cs)) => self.link.attach(spi, cs),
            None => defmt::error!("spi: bus unavailable"),
        }
    }

    fn read_status(&mut self) {
        self.link.enqueue(Exchange::StatusRead);
    }

    fn bulk_erase(&mut self) {
        self.link.enqueue(Exchange::Command(Opcode::Wren));
        self.link.enqueue(Exchange::Command(Opcode::Be));
        self.link.enqueue(Exchange::StatusRead);
    }

    fn program_sector(&mut self, addr: u32) {
        let Some(data) = payload::sector(addr) else {
            // A cursor outside the image would be a machine bug; the missing
            // completion turns into a watchdog failure.
            defmt::error!("payload: sector out of range: 0x{:08x}", addr);
            return;
        };
        self.link.enqueue(Exchange::Command(Opcode::Wren));
        self.link.enqueue(Exchange::SectorProgram {
            header: sp_header(addr),
            data,
        });
        self.link.enqueue(Exchange::StatusRead);
        self.report(Report::Sector { addr });
    }

    fn reset_target(&mut self) {
        self.link.enqueue(Exchange::Command(Opcode::Reset));
    }

    fn arm_timeout(&mut self, ms: u32) {
        timeout::arm(ms);
    }

    fn cancel_timeout(&mut self) {
        timeout::cancel();
    }

    fn show_result(&mut self, result: RunResult) {
        self.leds.show(result);
        match result {
            RunResult::Unknown => {}
            RunResult::Success => self.report(Report::RunFinished { ok: true }),
            RunResult::Fail => self.report(Report::RunFinished { ok: false }),
        }
    }
}
