// SPDX-License-Identifier: MIT

//! The embedded payload image.
//!
//! An opaque flat binary selected at build time (`EZFLASH_PAYLOAD`, see
//! `build.rs`) and burned into the target sector by sector. The machine only
//! ever sees its length; the bytes go straight from here onto the wire.

use crc::{Crc, CRC_32_ISO_HDLC};

use ezflash_common::FLASH_SECTOR_SIZE;

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

pub const IMAGE: &[u8] = include_bytes!(env!("EZFLASH_PAYLOAD"));

// Geometry is enforced before the firmware can even link; the machine
// re-validates at runtime.
const _: () = assert!(!IMAGE.is_empty(), "payload image is empty");
const _: () = assert!(
    IMAGE.len() % FLASH_SECTOR_SIZE as usize == 0,
    "payload image must be a whole number of flash sectors"
);

/// CRC-32 (ISO HDLC) of the whole image, for the boot report.
pub fn image_crc() -> u32 {
    CRC32.checksum(IMAGE)
}

/// One sector of the image starting at byte `addr`, if in bounds.
pub fn sector(addr: u32) -> Option<&'static [u8]> {
    let start = addr as usize;
    IMAGE.get(start..start + FLASH_SECTOR_SIZE as usize)
}
