// SPDX-License-Identifier: MIT

#![no_std]
#![no_main]

mod events;
mod fixture;
mod leds;
mod payload;
mod peripherals;
mod spi_link;
mod timeout;
mod usb_transport;

use defmt_rtt as _;
use panic_probe as _;

defmt::timestamp!("{=u64:us}", { 0 });

use cortex_m_rt::entry;
use ezflash_common::{FlashFsm, FsmEvent, Report, RunResult, FLASH_SECTOR_SIZE};
use rp2040_hal::pac;

use fixture::Fixture;

#[unsafe(link_section = ".boot2")]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

#[entry]
fn main() -> ! {
    defmt::println!("ezflash fixture init");

    let Some(mut board) = peripherals::init() else {
        defmt::error!("board bring-up failed");
        halt();
    };

    // Lamp test so a dead indicator is caught before the first run.
    board.leds.lamp_test(&mut board.timer);

    let image_len = payload::IMAGE.len() as u32;
    let image_crc = payload::image_crc();
    defmt::println!("payload: {} bytes, crc32 0x{:08x}", image_len, image_crc);

    let Ok(mut fsm) = FlashFsm::new(image_len, FLASH_SECTOR_SIZE) else {
        // Unreachable with the compile-time payload checks, but a bad image
        // must never look like a working fixture.
        defmt::error!("payload geometry rejected");
        board.leds.show(RunResult::Fail);
        halt();
    };

    let usb = board.usb_bus.and_then(|bus| match usb_transport::UsbTransport::new(bus) {
        Ok(transport) => Some(transport),
        Err(e) => {
            defmt::warn!("usb: init failed: {:?}", e);
            None
        }
    });

    let mut fixture = Fixture::new(board.port, board.leds, usb);

    timeout::init(board.alarm);
    events::init(board.sense);
    // SAFETY: all handler-shared state is initialized above; the handlers
    // only enqueue and flag.
    unsafe {
        pac::NVIC::unmask(pac::Interrupt::IO_IRQ_BANK0);
        pac::NVIC::unmask(pac::Interrupt::TIMER_IRQ_0);
    }

    fixture.report(Report::Hello {
        image_len,
        image_crc,
        sector_size: FLASH_SECTOR_SIZE,
    });
    defmt::println!("ready: press the program button");

    loop {
        if let Some(status) = fixture.poll() {
            dispatch(&mut fsm, FsmEvent::CommandDone(status), &mut fixture);
        }
        while let Some(event) = events::next_pending() {
            dispatch(&mut fsm, event, &mut fixture);
        }
        if timeout::fired() {
            dispatch(&mut fsm, FsmEvent::TimedOut, &mut fixture);
        }
    }
}

/// Run one event's transition to completion.
fn dispatch(fsm: &mut FlashFsm, event: FsmEvent, fixture: &mut Fixture) {
    let before = fsm.state();
    fsm.handle(event, fixture);
    defmt::trace!("fsm: {:?} --{:?}--> {:?}", before, event, fsm.state());
}

fn halt() -> ! {
    loop {
        cortex_m::asm::nop();
    }
}
