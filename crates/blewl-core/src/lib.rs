//! # blewl-core
//!
//! Core BLE whitelist data model and wire codec.
//!
//! This crate provides:
//! - MAC address parsing and canonical formatting
//! - Whitelist model types (WhitelistEntry, Whitelist, LegacySlots)
//! - JSON wire codec for remote updates and the persisted blob
//!
//! This crate is intentionally runtime-agnostic and contains no I/O or async
//! code, so the same model can back both the synchronizer and the scanning
//! pipeline that consumes it.

pub mod codec;
pub mod mac;
pub mod model;

pub use codec::{decode, decode_report, encode, DecodeError, DecodeReport, EntryError};
pub use mac::{MacAddress, MacParseError};
pub use model::*;
