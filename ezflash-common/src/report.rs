// SPDX-License-Identifier: MIT

//! Out-of-band reports sent over the USB CDC side channel.
//!
//! The channel is purely informational: the state machine never consults it,
//! and a host does not need to be attached for the fixture to work. Reports
//! are postcard-serialized and COBS-framed on the wire, one frame per report.

use serde::{Deserialize, Serialize};

/// One fixture → host report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Report {
    /// Sent once after boot: geometry and checksum of the embedded payload.
    Hello {
        image_len: u32,
        image_crc: u32,
        sector_size: u32,
    },
    /// The operator started a programming run.
    RunStarted,
    /// One sector-program command was queued at the given byte address.
    Sector { addr: u32 },
    /// Terminal outcome of the current run.
    RunFinished { ok: bool },
}
