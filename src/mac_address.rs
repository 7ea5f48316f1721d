//! Compact MAC address type for MiJia sensors.
//!
//! Configured addresses are written in the usual human order
//! (`A4:C1:38:01:02:03`), while the sensor embeds its own address in the
//! advertisement with the octets reversed. Both sides are normalized into
//! a single [`MacAddress`] so registry lookups compare like with like.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth MAC address stored in human (most significant octet first) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Build an address from the reversed-octet form carried inside a frame.
    pub fn from_reversed(mut octets: [u8; 6]) -> Self {
        octets.reverse();
        Self(octets)
    }

    /// The reversed-octet form, as it appears on the air.
    pub fn reversed(&self) -> [u8; 6] {
        let mut octets = self.0;
        octets.reverse();
        octets
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Errors returned when parsing a MAC address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseMacError {
    #[error("invalid MAC address: expected 6 parts, got {0}")]
    InvalidLength(usize),
    #[error("invalid MAC address: part {0} has wrong length")]
    InvalidPartLength(usize),
    #[error("invalid MAC address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for MacAddress {
    type Err = ParseMacError;

    /// Accepts colon separated (`AA:BB:CC:DD:EE:FF`) or bare (`aabbccddeeff`) notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parts: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else {
            if s.len() != 12 || !s.is_ascii() {
                return Err(ParseMacError::InvalidLength(s.len().div_ceil(2)));
            }
            (0..6).map(|i| &s[i * 2..i * 2 + 2]).collect()
        };

        if parts.len() != 6 {
            return Err(ParseMacError::InvalidLength(parts.len()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(ParseMacError::InvalidPartLength(i));
            }
            bytes[i] = u8::from_str_radix(part, 16)
                .map_err(|_| ParseMacError::InvalidHex(part.to_string()))?;
        }

        Ok(MacAddress(bytes))
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for MacAddress {
    fn from(addr: bluer::Address) -> Self {
        Self(addr.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let addr = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(format!("{}", addr), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_from_str_colons() {
        let addr: MacAddress = "A4:C1:38:0a:0b:0c".parse().unwrap();
        assert_eq!(addr.0, [0xA4, 0xC1, 0x38, 0x0A, 0x0B, 0x0C]);
    }

    #[test]
    fn test_from_str_bare() {
        let addr: MacAddress = "aabbccddeeff".parse().unwrap();
        assert_eq!(addr.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(matches!(
            "AA:BB:CC".parse::<MacAddress>(),
            Err(ParseMacError::InvalidLength(3))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EE:GG".parse::<MacAddress>(),
            Err(ParseMacError::InvalidHex(_))
        ));
        assert!(matches!(
            "AA:BB:CC:DD:EEE:F".parse::<MacAddress>(),
            Err(ParseMacError::InvalidPartLength(4))
        ));
        assert!("aabbcc".parse::<MacAddress>().is_err());
        assert!("zzbbccddeeff".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_reversed_octets() {
        let on_air = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        let mac = MacAddress::from_reversed(on_air);
        assert_eq!(hex::encode(mac.0), "ffeeddccbbaa");
        assert_eq!(mac.reversed(), on_air);
    }

    #[test]
    fn test_normalization_is_involution() {
        let mac: MacAddress = "A4:C1:38:11:22:33".parse().unwrap();
        assert_eq!(MacAddress::from_reversed(mac.reversed()), mac);
    }
}
