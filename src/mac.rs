//! Hardware address type

use std::fmt;
use std::str::FromStr;

use crate::codec::crc32;

/// MAC address (6 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    pub const ZERO: MacAddr = MacAddr([0, 0, 0, 0, 0, 0]);

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    pub fn is_local(&self) -> bool {
        self.0[0] & 0x02 != 0
    }

    /// Locally administered unicast address derived from an interface's id
    /// and name. Stable across calls for the same inputs.
    pub fn generate(id: u32, name: &str) -> Self {
        let id_bytes = id.to_be_bytes();
        let mut seed = name.as_bytes().to_vec();
        seed.extend_from_slice(&id_bytes);
        let hash = crc32(&seed).to_be_bytes();
        MacAddr([
            0x02,
            id_bytes.iter().fold(0, |acc, b| acc ^ b),
            hash[0],
            hash[1],
            hash[2],
            hash[3],
        ])
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Why a MAC address string was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMacAddrError {
    /// Not six groups
    GroupCount,
    /// A group is not exactly two characters
    GroupWidth,
    /// A character is not a hex digit
    Hex,
}

impl fmt::Display for ParseMacAddrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMacAddrError::GroupCount => write!(f, "expected six hex groups"),
            ParseMacAddrError::GroupWidth => write!(f, "each hex group must be two digits"),
            ParseMacAddrError::Hex => write!(f, "invalid hex digit"),
        }
    }
}

impl std::error::Error for ParseMacAddrError {}

impl FromStr for MacAddr {
    type Err = ParseMacAddrError;

    /// Parse a MAC address from string
    ///
    /// Supported formats:
    /// - Colon-separated: "00:11:22:33:44:55"
    /// - Hyphen-separated: "00-11-22-33-44-55"
    /// - No separator: "001122334455"
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let groups: Vec<&str> = if s.contains(':') {
            s.split(':').collect()
        } else if s.contains('-') {
            s.split('-').collect()
        } else if s.len() == 12 && s.is_ascii() {
            (0..6).map(|i| &s[i * 2..i * 2 + 2]).collect()
        } else {
            return Err(ParseMacAddrError::GroupCount);
        };

        if groups.len() != 6 {
            return Err(ParseMacAddrError::GroupCount);
        }

        let mut result = [0u8; 6];
        for (i, group) in groups.iter().enumerate() {
            if group.len() != 2 {
                return Err(ParseMacAddrError::GroupWidth);
            }
            if !group.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ParseMacAddrError::Hex);
            }
            result[i] = u8::from_str_radix(group, 16).map_err(|_| ParseMacAddrError::Hex)?;
        }

        Ok(MacAddr(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mac_addr_parse_colon() {
        let mac: MacAddr = "ec:f1:f8:d5:47:6b".parse().unwrap();
        assert_eq!(mac.0, [0xec, 0xf1, 0xf8, 0xd5, 0x47, 0x6b]);
        assert_eq!(mac.to_string(), "ec:f1:f8:d5:47:6b");
    }

    #[test]
    fn test_mac_addr_parse_hyphen_and_bare() {
        let a: MacAddr = "00-11-22-33-44-55".parse().unwrap();
        let b: MacAddr = "001122334455".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mac_addr_parse_errors() {
        assert_eq!(
            "00:11:22:33:44".parse::<MacAddr>(),
            Err(ParseMacAddrError::GroupCount)
        );
        assert_eq!(
            "0:11:22:33:44:55".parse::<MacAddr>(),
            Err(ParseMacAddrError::GroupWidth)
        );
        assert_eq!(
            "zz:11:22:33:44:55".parse::<MacAddr>(),
            Err(ParseMacAddrError::Hex)
        );
        assert_eq!(
            "+1:11:22:33:44:55".parse::<MacAddr>(),
            Err(ParseMacAddrError::Hex)
        );
        assert_eq!("".parse::<MacAddr>(), Err(ParseMacAddrError::GroupCount));
    }

    #[test]
    fn test_mac_addr_multicast() {
        assert!(MacAddr::BROADCAST.is_multicast());
        let mac = MacAddr([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);
        assert!(mac.is_multicast());
        assert!(!mac.is_unicast());
    }

    #[test]
    fn test_generate_is_local_unicast_and_stable() {
        let mac = MacAddr::generate(1, "viface0");
        assert!(mac.is_local());
        assert!(mac.is_unicast());
        assert!(!mac.is_zero());
        assert_eq!(mac, MacAddr::generate(1, "viface0"));
        assert_ne!(mac, MacAddr::generate(2, "viface0"));
        assert_ne!(mac, MacAddr::generate(1, "viface1"));
    }

    #[test]
    fn test_generate_uses_whole_id() {
        assert_ne!(MacAddr::generate(1, "viface0"), MacAddr::generate(257, "viface0"));
        assert_ne!(
            MacAddr::generate(0x0100_0000, "viface0"),
            MacAddr::generate(0, "viface0")
        );
    }
}
