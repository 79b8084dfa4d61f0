//! MAC address parsing and canonical formatting.
//!
//! Whitelist entries are keyed by MAC address. Remote publishers are not
//! always consistent about case or separators, so every address is parsed
//! into a 6-byte value and rendered back in one canonical form:
//! lowercase, colon separated (`aa:bb:cc:dd:ee:01`).

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

/// Accepted input forms: `aa:bb:..`, `aa-bb-..` (no mixing) or 12 bare hex digits.
static MAC_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[0-9A-Fa-f]{2}(?::[0-9A-Fa-f]{2}){5}|[0-9A-Fa-f]{2}(?:-[0-9A-Fa-f]{2}){5}|[0-9A-Fa-f]{12})$",
    )
    .expect("MAC pattern is a valid regex")
});

/// Error returned when a string is not a recognizable MAC address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid MAC address: {input:?}")]
pub struct MacParseError {
    /// The rejected input, verbatim.
    pub input: String,
}

/// A 48-bit hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Sentinel meaning "unset / never match" (`ff:ff:ff:ff:ff:ff`).
    pub const UNSET: MacAddress = MacAddress([0xff; 6]);

    /// Create an address from its raw octets.
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets, most significant first.
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// True for the `ff:ff:ff:ff:ff:ff` sentinel.
    pub fn is_unset(&self) -> bool {
        *self == Self::UNSET
    }

    /// Parse any accepted textual form.
    pub fn parse(input: &str) -> Result<Self, MacParseError> {
        let trimmed = input.trim();
        if !MAC_PATTERN.is_match(trimmed) {
            return Err(MacParseError {
                input: input.to_string(),
            });
        }

        let digits: Vec<u8> = trimmed
            .bytes()
            .filter(|b| b.is_ascii_hexdigit())
            .collect();

        let mut octets = [0u8; 6];
        for (octet, pair) in octets.iter_mut().zip(digits.chunks_exact(2)) {
            *octet = (hex_value(pair[0]) << 4) | hex_value(pair[1]);
        }
        Ok(Self(octets))
    }
}

fn hex_value(digit: u8) -> u8 {
    match digit {
        b'0'..=b'9' => digit - b'0',
        b'a'..=b'f' => digit - b'a' + 10,
        b'A'..=b'F' => digit - b'A' + 10,
        _ => 0,
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = MacParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Default for MacAddress {
    fn default() -> Self {
        Self::UNSET
    }
}
