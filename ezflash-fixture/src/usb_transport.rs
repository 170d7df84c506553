// SPDX-License-Identifier: MIT

//! USB CDC side channel carrying COBS-framed postcard reports.
//!
//! Strictly informational and one-way: the programming machine never
//! consults it, and a detached or slow host must never stall a run.

use ezflash_common::Report;
use rp2040_hal::usb::UsbBus;
use usb_device::class_prelude::UsbBusAllocator;
use usb_device::prelude::*;
use usbd_serial::SerialPort;

const TX_BUF_SIZE: usize = 64;

#[derive(Debug, defmt::Format)]
pub enum TransportError {
    StringTooLong,
}

pub struct UsbTransport {
    serial: SerialPort<'static, UsbBus>,
    usb_dev: UsbDevice<'static, UsbBus>,
}

impl UsbTransport {
    pub fn new(usb_bus: &'static UsbBusAllocator<UsbBus>) -> Result<Self, TransportError> {
        let serial = SerialPort::new(usb_bus);
        let usb_dev = UsbDeviceBuilder::new(usb_bus, UsbVidPid(0x2323, 0x0005))
            .strings(&[StringDescriptors::default()
                .manufacturer("ezflash")
                .product("EZPort flashing fixture")
                .serial_number("0001")])
            .map_err(|_| TransportError::StringTooLong)?
            .device_class(usbd_serial::USB_CLASS_CDC)
            .build();

        Ok(Self { serial, usb_dev })
    }

    /// Poll the device. Must be called frequently. Anything the host sends
    /// is drained and discarded; the channel is one-way.
    pub fn poll(&mut self) {
        if self.usb_dev.poll(&mut [&mut self.serial]) {
            let mut sink = [0u8; 16];
            let _ = self.serial.read(&mut sink);
        }
    }

    /// Send one report as a COBS-framed postcard message. Best effort: if
    /// the host is not reading, the remainder of the frame is dropped.
    pub fn send(&mut self, report: &Report) {
        let mut buf = [0u8; TX_BUF_SIZE];
        let Ok(frame) = postcard::to_slice_cobs(report, &mut buf) else {
            return;
        };

        let mut offset = 0;
        while offset < frame.len() {
            match self.serial.write(&frame[offset..]) {
                Ok(n) => offset += n,
                Err(_) => break,
            }
        }
    }
}
