//! Whitelist data model types.
//!
//! These types represent the state the scanning pipeline filters on:
//! - WhitelistEntry: one allowed device
//! - Whitelist: the full authoritative set, unique by MAC
//! - LegacySlots: the fixed three-slot fallback representation

use std::collections::HashMap;
use std::fmt;

use crate::mac::MacAddress;

/// Classifier the scanning pipeline uses to pick a decode strategy.
///
/// Known kinds are recognized by their exact wire string; anything else is
/// kept verbatim so it survives a decode/encode cycle unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeviceType {
    /// BTHome v2 advertisements (`"bthome"`).
    BtHome,
    /// BTHome payloads carried over ESP-NOW (`"beethowen"`).
    Beethowen,
    /// Free-text classifier.
    Other(String),
}

impl DeviceType {
    /// The wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::BtHome => "bthome",
            DeviceType::Beethowen => "beethowen",
            DeviceType::Other(s) => s,
        }
    }
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Other(String::new())
    }
}

impl From<&str> for DeviceType {
    fn from(s: &str) -> Self {
        match s {
            "bthome" => DeviceType::BtHome,
            "beethowen" => DeviceType::Beethowen,
            other => DeviceType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One allowed device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistEntry {
    /// Uniqueness key within a whitelist.
    pub mac: MacAddress,
    /// Informational label.
    pub description: String,
    pub device_type: DeviceType,
}

impl WhitelistEntry {
    pub fn new(mac: MacAddress, description: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            mac,
            description: description.into(),
            device_type,
        }
    }
}

impl fmt::Display for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.mac, self.device_type, self.description)
    }
}

/// The full authoritative set of allowed devices.
///
/// Entries keep insertion order and are unique by MAC. A whitelist is built in
/// one go from an entry sequence and is never mutated afterwards; updates
/// replace the whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    entries: Vec<WhitelistEntry>,
}

impl Whitelist {
    /// An empty whitelist.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a whitelist from entries.
    ///
    /// When two entries share a MAC the later one wins; it takes the position
    /// of the first occurrence.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = WhitelistEntry>,
    {
        let mut index: HashMap<MacAddress, usize> = HashMap::new();
        let mut out: Vec<WhitelistEntry> = Vec::new();

        for entry in entries {
            match index.get(&entry.mac) {
                Some(&pos) => out[pos] = entry,
                None => {
                    index.insert(entry.mac, out.len());
                    out.push(entry);
                }
            }
        }

        Self { entries: out }
    }

    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WhitelistEntry> {
        self.entries.iter()
    }

    /// Look up the entry for a MAC.
    pub fn get(&self, mac: &MacAddress) -> Option<&WhitelistEntry> {
        self.entries.iter().find(|e| e.mac == *mac)
    }

    pub fn contains(&self, mac: &MacAddress) -> bool {
        self.get(mac).is_some()
    }
}

impl FromIterator<WhitelistEntry> for Whitelist {
    fn from_iter<T: IntoIterator<Item = WhitelistEntry>>(iter: T) -> Self {
        Self::from_entries(iter)
    }
}

impl<'a> IntoIterator for &'a Whitelist {
    type Item = &'a WhitelistEntry;
    type IntoIter = std::slice::Iter<'a, WhitelistEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// One of the three legacy MAC cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    One,
    Two,
    Three,
}

impl Slot {
    /// All slots in index order.
    pub const ALL: [Slot; 3] = [Slot::One, Slot::Two, Slot::Three];

    /// 1-based index.
    pub fn index(self) -> u8 {
        match self {
            Slot::One => 1,
            Slot::Two => 2,
            Slot::Three => 3,
        }
    }

    /// Slot for a 1-based index, if in range.
    pub fn from_index(index: u8) -> Option<Slot> {
        match index {
            1 => Some(Slot::One),
            2 => Some(Slot::Two),
            3 => Some(Slot::Three),
            _ => None,
        }
    }

    /// Storage key of this slot (`mac_address_1` ..= `mac_address_3`).
    pub fn key(self) -> &'static str {
        match self {
            Slot::One => "mac_address_1",
            Slot::Two => "mac_address_2",
            Slot::Three => "mac_address_3",
        }
    }

    fn position(self) -> usize {
        usize::from(self.index() - 1)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot {}", self.index())
    }
}

/// Fixed three-slot MAC representation used by constrained deployments.
///
/// Unset slots hold [`MacAddress::UNSET`] and never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacySlots {
    macs: [MacAddress; 3],
}

impl LegacySlots {
    /// All slots unset.
    pub fn new() -> Self {
        Self {
            macs: [MacAddress::UNSET; 3],
        }
    }

    /// Build from the three slot values in index order.
    pub fn from_array(macs: [MacAddress; 3]) -> Self {
        Self { macs }
    }

    pub fn get(&self, slot: Slot) -> MacAddress {
        self.macs[slot.position()]
    }

    pub fn with(mut self, slot: Slot, mac: MacAddress) -> Self {
        self.macs[slot.position()] = mac;
        self
    }

    /// True if any set slot holds `mac`. The sentinel never matches.
    pub fn contains(&self, mac: &MacAddress) -> bool {
        !mac.is_unset() && self.macs.contains(mac)
    }

    /// Iterate `(slot, mac)` pairs in index order, including unset slots.
    pub fn iter(&self) -> impl Iterator<Item = (Slot, MacAddress)> + '_ {
        Slot::ALL.into_iter().map(move |slot| (slot, self.get(slot)))
    }

    /// Whitelist view of the set slots.
    ///
    /// Slot deployments run the BTHome receiver, so every entry is typed
    /// [`DeviceType::BtHome`].
    pub fn to_whitelist(&self) -> Whitelist {
        self.iter()
            .filter(|(_, mac)| !mac.is_unset())
            .map(|(slot, mac)| WhitelistEntry::new(mac, slot.to_string(), DeviceType::BtHome))
            .collect()
    }
}

impl Default for LegacySlots {
    fn default() -> Self {
        Self::new()
    }
}
