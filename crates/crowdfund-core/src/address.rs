use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const ADDRESS_LEN: usize = 20;

/// 20-byte account or contract address.
///
/// Parsing accepts any letter case, so two spellings of the same address
/// compare equal. Rendering is always lowercase `0x`-prefixed hex.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LEN]);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address {input:?}: {reason}")]
pub struct AddressParseError {
    pub input: String,
    pub reason: &'static str,
}

impl Address {
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| AddressParseError {
            input: s.to_string(),
            reason,
        };
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| invalid("missing 0x prefix"))?;
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(invalid("expected 40 hex digits"));
        }
        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| invalid("not hexadecimal"))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_case_and_renders_lowercase() {
        let mixed: Address = "0xf34DCAe7f0230d9377EfacF8F98eA7d73d65FA40".parse().unwrap();
        let lower: Address = "0xf34dcae7f0230d9377efacf8f98ea7d73d65fa40".parse().unwrap();
        assert_eq!(mixed, lower);
        assert_eq!(mixed.to_string(), "0xf34dcae7f0230d9377efacf8f98ea7d73d65fa40");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for input in [
            "",
            "f34dcae7f0230d9377efacf8f98ea7d73d65fa40",
            "0xf34dcae7f0230d9377efacf8f98ea7d73d65fa4",
            "0xf34dcae7f0230d9377efacf8f98ea7d73d65fa400",
            "0xg34dcae7f0230d9377efacf8f98ea7d73d65fa40",
        ] {
            assert!(input.parse::<Address>().is_err(), "{input} should be rejected");
        }
    }

    #[test]
    fn serializes_as_hex_string() {
        let addr = Address::new([0xab; 20]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{addr}\""));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
