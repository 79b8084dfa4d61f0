//! JSON wire codec for whitelist updates.
//!
//! Remote updates and the persisted blob share one shape:
//!
//! ```json
//! {"ble":{"wl":[{"desc":"kitchen sensor","mac":"aa:bb:cc:dd:ee:01","type":"bthome"}]}}
//! ```
//!
//! Decoding is strict on structure and lenient on entries: a payload without
//! the `ble.wl` array is rejected as a whole, while a single bad entry is
//! dropped and the rest of the update still applies.

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::mac::MacAddress;
use crate::model::{DeviceType, Whitelist, WhitelistEntry};

const SECTION: &str = "ble";
const ENTRIES: &str = "wl";

/// Errors that reject a whole payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not valid UTF-8 JSON.
    #[error("Malformed JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Top-level value is not an object.
    #[error("Payload is not a JSON object")]
    NotAnObject,

    /// No `ble` object at the top level.
    #[error("Missing \"ble\" section")]
    MissingSection,

    /// No `wl` array inside `ble`.
    #[error("Missing \"ble.wl\" entry array")]
    MissingEntries,
}

/// A single entry that was dropped during decoding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("entry {index} is not an object")]
    NotAnObject { index: usize },

    #[error("entry {index} has no \"mac\" field")]
    MissingMac { index: usize },

    #[error("entry {index} has invalid MAC {mac}")]
    InvalidMac { index: usize, mac: String },
}

/// Result of a successful decode, including the entries that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub whitelist: Whitelist,
    pub skipped: Vec<EntryError>,
}

/// Decode a payload, logging every skipped entry at warning level.
pub fn decode(payload: &[u8]) -> Result<Whitelist, DecodeError> {
    let report = decode_report(payload)?;
    for skipped in &report.skipped {
        warn!(error = %skipped, "Skipping malformed whitelist entry");
    }
    Ok(report.whitelist)
}

/// Decode a payload and report which entries were skipped.
pub fn decode_report(payload: &[u8]) -> Result<DecodeReport, DecodeError> {
    let doc: Value = serde_json::from_slice(payload)?;
    let root = doc.as_object().ok_or(DecodeError::NotAnObject)?;
    let section = root
        .get(SECTION)
        .and_then(Value::as_object)
        .ok_or(DecodeError::MissingSection)?;
    let raw = section
        .get(ENTRIES)
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingEntries)?;

    let mut entries = Vec::with_capacity(raw.len());
    let mut skipped = Vec::new();

    for (index, value) in raw.iter().enumerate() {
        match decode_entry(index, value) {
            Ok(entry) => entries.push(entry),
            Err(e) => skipped.push(e),
        }
    }

    Ok(DecodeReport {
        whitelist: Whitelist::from_entries(entries),
        skipped,
    })
}

fn decode_entry(index: usize, value: &Value) -> Result<WhitelistEntry, EntryError> {
    let obj = value.as_object().ok_or(EntryError::NotAnObject { index })?;

    let mac = match obj.get("mac") {
        None | Some(Value::Null) => return Err(EntryError::MissingMac { index }),
        Some(Value::String(s)) => {
            let invalid = || EntryError::InvalidMac {
                index,
                mac: format!("{s:?}"),
            };
            // The unset sentinel never matches, in either mode
            let mac = MacAddress::parse(s).map_err(|_| invalid())?;
            if mac.is_unset() {
                return Err(invalid());
            }
            mac
        }
        Some(other) => {
            return Err(EntryError::InvalidMac {
                index,
                mac: other.to_string(),
            })
        }
    };

    Ok(WhitelistEntry {
        mac,
        description: string_field(obj, "desc").to_string(),
        device_type: DeviceType::from(string_field(obj, "type")),
    })
}

/// Optional string field; absent or non-string values read as empty.
fn string_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a str {
    obj.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Encode a whitelist to its canonical wire form.
pub fn encode(whitelist: &Whitelist) -> Vec<u8> {
    let entries: Vec<Value> = whitelist
        .iter()
        .map(|e| {
            json!({
                "desc": e.description,
                "mac": e.mac.to_string(),
                "type": e.device_type.as_str(),
            })
        })
        .collect();

    json!({ "ble": { "wl": entries } })
        .to_string()
        .into_bytes()
}
