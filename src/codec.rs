//! Stateless codecs: checksum, hex dump and count-prefixed lists.

use std::fmt::Write as _;
use std::net::Ipv6Addr;

use crate::config::{Field, ValidationError};
use crate::{Error, Result};

/// Nibble table for the reflected CRC-32 polynomial, pre-conditioned so a
/// zero initial value and no final inversion give the standard result.
const CRC_TABLE: [u32; 16] = [
    0x4DBD_F21C,
    0x500A_E278,
    0x76D3_D2D4,
    0x6B64_C2B0,
    0x3B61_B38C,
    0x26D6_A3E8,
    0x000F_9344,
    0x1DB8_8320,
    0xA005_713C,
    0xBDB2_6158,
    0x9B6B_51F4,
    0x86DC_4190,
    0xD6D9_30AC,
    0xCB6E_20C8,
    0xEDB7_1064,
    0xF000_0000,
];

/// Standard CRC-32 (IEEE 802.3) of `bytes`.
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0u32;
    for &b in bytes {
        crc = (crc >> 4) ^ CRC_TABLE[((crc ^ b as u32) & 0x0F) as usize];
        crc = (crc >> 4) ^ CRC_TABLE[((crc ^ (b >> 4) as u32) & 0x0F) as usize];
    }
    crc
}

const BYTES_PER_LINE: usize = 16;

/// Fixed-width hex/ASCII rendering, one line per 16 bytes.
///
/// ```text
/// 0000  ff ff ff ff ff ff 00 00 00 00 00 00 08 00 45 00  ..............E.
/// ```
///
/// Offsets are decimal. The last line pads missing bytes with three spaces
/// and lists only the bytes present.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::with_capacity((bytes.len() / BYTES_PER_LINE + 1) * 72);

    for (line, chunk) in bytes.chunks(BYTES_PER_LINE).enumerate() {
        let _ = write!(out, "{:04}  ", line * BYTES_PER_LINE);

        for i in 0..BYTES_PER_LINE {
            match chunk.get(i) {
                Some(b) => {
                    let _ = write!(out, "{:02x} ", b);
                }
                None => out.push_str("   "),
            }
        }
        out.push(' ');

        for &b in chunk {
            if b.is_ascii_graphic() || b == b' ' {
                out.push(b as char);
            } else {
                out.push('.');
            }
        }
        out.push('\n');
    }

    out
}

/// Count-prefixed sequence of strings: `[count][item; count]`.
///
/// The count is the decimal string of the number of items that follow.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CountedList {
    items: Vec<String>,
}

impl CountedList {
    pub fn new<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            items: items.into_iter().map(Into::into).collect(),
        }
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn into_items(self) -> Vec<String> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn encode(&self) -> Vec<String> {
        let mut wire = Vec::with_capacity(self.items.len() + 1);
        wire.push(self.items.len().to_string());
        wire.extend(self.items.iter().cloned());
        wire
    }

    /// Decodes a wire sequence, checking the declared count against the
    /// elements actually present.
    pub fn decode<S: AsRef<str>>(wire: &[S]) -> Result<Self> {
        let (head, rest) = wire
            .split_first()
            .ok_or_else(|| Error::BadCount(String::new()))?;
        let head = head.as_ref();

        if head.is_empty() || !head.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::BadCount(head.to_string()));
        }
        let declared: usize = head
            .parse()
            .map_err(|_| Error::BadCount(head.to_string()))?;

        if declared != rest.len() {
            return Err(Error::CountMismatch {
                declared,
                actual: rest.len(),
            });
        }

        Ok(Self::new(rest.iter().map(|s| s.as_ref().to_string())))
    }
}

pub fn encode_ipv6_list(addrs: &[Ipv6Addr]) -> Vec<String> {
    CountedList::new(addrs.iter().map(|a| a.to_string())).encode()
}

pub fn decode_ipv6_list<S: AsRef<str>>(wire: &[S]) -> Result<Vec<Ipv6Addr>> {
    CountedList::decode(wire)?
        .into_items()
        .into_iter()
        .map(|s| {
            s.parse::<Ipv6Addr>()
                .map_err(|_| Error::from(ValidationError::ipv6_syntax(Field::Ipv6, &s)))
        })
        .collect()
}
