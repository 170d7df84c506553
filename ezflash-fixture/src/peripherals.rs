// SPDX-License-Identifier: MIT

//! Board bring-up and the target-facing pin port.
//!
//! All target-facing pins idle in a high-impedance state so the fixture
//! cannot back-power an unpowered target through its protection diodes.
//! [`TargetPort`] moves them between that idle state and their active modes:
//! chip select and the power rail become driven outputs at power-on, and the
//! four SPI signals are handed to the SPI peripheral only once the target has
//! latched EZPort mode.

use core::cell::UnsafeCell;

use fugit::{HertzU32, RateExtU32};
use rp2040_hal as hal;

use hal::clocks::Clock;
use hal::gpio::bank0::{
    Gpio14, Gpio15, Gpio16, Gpio17, Gpio18, Gpio19, Gpio2, Gpio20, Gpio21, Gpio22,
};
use hal::gpio::{
    FunctionNull, FunctionSio, FunctionSpi, Pin, PinState, PullDown, PullNone, PullUp, SioInput,
    SioOutput,
};
use hal::pac;
use hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;

use crate::events::SensePins;
use crate::leds::StatusLeds;

/// External crystal on the fixture board.
pub const XTAL_FREQ_HZ: u32 = 12_000_000;

/// EZPort clock. The target samples reliably well below half its bus clock;
/// 1 MHz leaves margin on every supported part.
const SPI_BAUD_HZ: u32 = 1_000_000;

// Operator-facing pins.
pub type ButtonPin = Pin<Gpio2, FunctionSio<SioInput>, PullUp>;
pub type ResetSensePin = Pin<Gpio21, FunctionSio<SioInput>, PullNone>;
pub type LedSensePin = Pin<Gpio22, FunctionSio<SioInput>, PullNone>;
pub type OkLedPin = Pin<Gpio14, FunctionSio<SioOutput>, PullDown>;
pub type FailLedPin = Pin<Gpio15, FunctionSio<SioOutput>, PullDown>;

// Target-facing pins, idle (high-Z) and active flavors.
pub type MosiIdlePin = Pin<Gpio19, FunctionNull, PullNone>;
pub type MisoIdlePin = Pin<Gpio16, FunctionNull, PullNone>;
pub type SckIdlePin = Pin<Gpio18, FunctionNull, PullNone>;
pub type CsIdlePin = Pin<Gpio17, FunctionNull, PullNone>;
pub type PowerIdlePin = Pin<Gpio20, FunctionNull, PullNone>;

pub type MosiSpiPin = Pin<Gpio19, FunctionSpi, PullNone>;
pub type MisoSpiPin = Pin<Gpio16, FunctionSpi, PullNone>;
pub type SckSpiPin = Pin<Gpio18, FunctionSpi, PullNone>;
pub type CsOutPin = Pin<Gpio17, FunctionSio<SioOutput>, PullNone>;
type PowerOutPin = Pin<Gpio20, FunctionSio<SioOutput>, PullNone>;

pub type FixtureSpi =
    hal::spi::Spi<hal::spi::Enabled, pac::SPI0, (MosiSpiPin, MisoSpiPin, SckSpiPin), 8>;

enum CsPin {
    Idle(CsIdlePin),
    Driven(CsOutPin),
}

enum PowerPin {
    Idle(PowerIdlePin),
    Driven(PowerOutPin),
}

/// The five target-facing pins in their idle state.
pub struct TargetPortPins {
    pub mosi: MosiIdlePin,
    pub miso: MisoIdlePin,
    pub sck: SckIdlePin,
    pub cs: CsIdlePin,
    pub power: PowerIdlePin,
}

/// Owner of everything that touches the target: the five pins, the SPI
/// peripheral, and the reset block needed to (re)initialize it per run.
pub struct TargetPort {
    spi0: Option<pac::SPI0>,
    resets: pac::RESETS,
    peri_hz: HertzU32,
    bus_pins: Option<(MosiIdlePin, MisoIdlePin, SckIdlePin)>,
    cs: Option<CsPin>,
    power: Option<PowerPin>,
}

impl TargetPort {
    pub fn new(
        pins: TargetPortPins,
        spi0: pac::SPI0,
        resets: pac::RESETS,
        peri_hz: HertzU32,
    ) -> Self {
        Self {
            spi0: Some(spi0),
            resets,
            peri_hz,
            bus_pins: Some((pins.mosi, pins.miso, pins.sck)),
            cs: Some(CsPin::Idle(pins.cs)),
            power: Some(PowerPin::Idle(pins.power)),
        }
    }

    /// Drive chip select low, then switch the rail on. The target latches
    /// EZPort mode only if CS is already low when it comes out of reset.
    /// The rail control is active low; high-Z is off.
    pub fn power_on(&mut self) {
        if let Some(cs) = self.cs.take() {
            self.cs = Some(match cs {
                CsPin::Idle(pin) => {
                    CsPin::Driven(pin.into_push_pull_output_in_state(PinState::Low))
                }
                driven => driven,
            });
        }
        if let Some(power) = self.power.take() {
            self.power = Some(match power {
                PowerPin::Idle(pin) => {
                    PowerPin::Driven(pin.into_push_pull_output_in_state(PinState::Low))
                }
                driven => driven,
            });
        }
    }

    /// Mux the bus pins into the SPI peripheral and bring it up in mode 0.
    /// Hands the enabled bus and the driven chip select to the caller.
    pub fn build_spi(&mut self) -> Option<(FixtureSpi, CsOutPin)> {
        match (self.spi0.take(), self.bus_pins.take(), self.cs.take()) {
            (Some(spi0), Some((mosi, miso, sck)), Some(CsPin::Driven(cs))) => {
                let pins = (
                    mosi.into_function::<FunctionSpi>(),
                    miso.into_function::<FunctionSpi>(),
                    sck.into_function::<FunctionSpi>(),
                );
                let spi = hal::spi::Spi::<_, _, _, 8>::new(spi0, pins).init(
                    &mut self.resets,
                    self.peri_hz,
                    SPI_BAUD_HZ.Hz(),
                    embedded_hal::spi::MODE_0,
                );
                Some((spi, cs))
            }
            (spi0, bus_pins, cs) => {
                // Called out of sequence; put everything back untouched.
                self.spi0 = spi0;
                self.bus_pins = bus_pins;
                self.cs = cs;
                None
            }
        }
    }

    /// Tear the session down: float the bus pins, chip select, and finally
    /// the rail control, leaving the target unpowered and undriven.
    pub fn release(&mut self, bus: Option<(FixtureSpi, CsOutPin)>) {
        if let Some((spi, cs)) = bus {
            let (spi0, (mosi, miso, sck)) = spi.free();
            self.spi0 = Some(spi0);
            self.bus_pins = Some((
                mosi.into_function::<FunctionNull>(),
                miso.into_function::<FunctionNull>(),
                sck.into_function::<FunctionNull>(),
            ));
            self.cs = Some(CsPin::Idle(cs.into_function::<FunctionNull>()));
        }
        self.cs = self.cs.take().map(|cs| match cs {
            CsPin::Driven(pin) => CsPin::Idle(pin.into_function::<FunctionNull>()),
            idle => idle,
        });
        self.power = self.power.take().map(|power| match power {
            PowerPin::Driven(pin) => PowerPin::Idle(pin.into_function::<FunctionNull>()),
            idle => idle,
        });
    }
}

/// Everything `main` needs after bring-up.
pub struct Board {
    pub timer: hal::Timer,
    pub alarm: hal::timer::Alarm0,
    pub port: TargetPort,
    pub leds: StatusLeds,
    pub sense: SensePins,
    pub usb_bus: Option<&'static UsbBusAllocator<UsbBus>>,
}

/// Wrapper to hold the USB bus allocator in a static without `static mut`.
///
/// SAFETY: written exactly once during bring-up, before the USB device
/// exists and before interrupts are enabled.
struct SyncUsbBus(UnsafeCell<Option<UsbBusAllocator<UsbBus>>>);
unsafe impl Sync for SyncUsbBus {}

static USB_BUS: SyncUsbBus = SyncUsbBus(UnsafeCell::new(None));

fn install_usb_bus(bus: UsbBusAllocator<UsbBus>) -> &'static UsbBusAllocator<UsbBus> {
    // SAFETY: single write at init time, single-threaded at this point.
    unsafe { (*USB_BUS.0.get()).insert(bus) }
}

/// Bring the board up. `None` means the hardware is in a state we cannot
/// recover from in software (peripherals already taken, clock init failed).
pub fn init() -> Option<Board> {
    let mut pac = pac::Peripherals::take()?;
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    let clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .ok()?;

    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);

    let mut timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    let alarm = timer.alarm_0()?;

    let usb_bus = install_usb_bus(UsbBusAllocator::new(UsbBus::new(
        pac.USBCTRL_REGS,
        pac.USBCTRL_DPRAM,
        clocks.usb_clock,
        true,
        &mut pac.RESETS,
    )));

    let leds = StatusLeds::new(
        pins.gpio14.into_push_pull_output_in_state(PinState::Low),
        pins.gpio15.into_push_pull_output_in_state(PinState::Low),
    );

    let sense = SensePins {
        button: pins.gpio2.into_pull_up_input(),
        reset_sense: pins.gpio21.into_floating_input(),
        led_sense: pins.gpio22.into_floating_input(),
    };

    let port = TargetPort::new(
        TargetPortPins {
            mosi: pins.gpio19.into_pull_type::<PullNone>(),
            miso: pins.gpio16.into_pull_type::<PullNone>(),
            sck: pins.gpio18.into_pull_type::<PullNone>(),
            cs: pins.gpio17.into_pull_type::<PullNone>(),
            power: pins.gpio20.into_pull_type::<PullNone>(),
        },
        pac.SPI0,
        pac.RESETS,
        clocks.peripheral_clock.freq(),
    );

    Some(Board {
        timer,
        alarm,
        port,
        leds,
        sense,
        usb_bus: Some(usb_bus),
    })
}
