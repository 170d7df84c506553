// SPDX-License-Identifier: MIT

//! Target-independent core of the EZPort flashing fixture.
//!
//! This crate supports both `no_std` (embedded) and `std` (host) environments:
//! - Default: `no_std` mode for the fixture firmware
//! - `std` feature: Enables `std` support for host-side tests and tools
//! - `defmt` feature: Enables `defmt::Format` derives on the public types

#![cfg_attr(not(feature = "std"), no_std)]

pub mod fsm;
pub mod protocol;
pub mod report;
pub mod status;

// Re-export commonly used types
pub use fsm::{FixtureOps, FlashFsm, FsmEvent, ImageError, RunResult, RunState};
pub use protocol::{sp_header, Opcode, FLASH_SECTOR_SIZE, RDSR_FRAME_LEN, SP_HEADER_LEN};
pub use report::Report;
pub use status::Status;
