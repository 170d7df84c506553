// SPDX-License-Identifier: MIT

//! EZPort wire protocol: command opcodes and frame layout.
//!
//! EZPort is the factory-mask SPI bootloader present on Kinetis parts. Every
//! command starts with a single opcode byte; SP additionally carries a 3-byte
//! big-endian address and one sector of data in the same chip-select frame.

/// Program-flash sector size of the supported targets (Kinetis K20). One SP
/// command programs exactly this many bytes.
pub const FLASH_SECTOR_SIZE: u32 = 1024;

/// Clocked length of an RDSR exchange: the command byte plus the status byte.
/// The receive byte clocked alongside the command is discarded.
pub const RDSR_FRAME_LEN: usize = 2;

/// Length of the SP command header: opcode + 3-byte big-endian address.
pub const SP_HEADER_LEN: usize = 4;

/// EZPort command opcodes (8-bit).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Set the write-enable latch. Required immediately before SE, BE, SP.
    Wren = 0x06,
    /// Clear the write-enable latch.
    Wrdi = 0x04,
    /// Read the status register.
    Rdsr = 0x05,
    Read = 0x03,
    FastRead = 0x0b,
    /// Sector program: header + one sector of data.
    Sp = 0x02,
    /// Sector erase.
    Se = 0xd8,
    /// Bulk erase the whole flash array.
    Be = 0xc7,
    /// Release the target out of EZPort mode into its application.
    Reset = 0xb9,
    Wrfccob = 0xba,
    FastRdfccob = 0xbb,
    Wrflexram = 0xbc,
    Rdflexram = 0xbd,
    FastRdflexram = 0xbe,
}

impl Opcode {
    pub const fn byte(self) -> u8 {
        self as u8
    }
}

/// Build the 4-byte SP header for a sector starting at `addr`.
///
/// The address is truncated to 24 bits and sent big-endian, as the target
/// expects it on the wire.
pub const fn sp_header(addr: u32) -> [u8; SP_HEADER_LEN] {
    [
        Opcode::Sp as u8,
        (addr >> 16) as u8,
        (addr >> 8) as u8,
        addr as u8,
    ]
}
