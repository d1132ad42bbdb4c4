//! Binary trace record shared by every tool in the crate.
//!
//! Each record is 24 bytes, little-endian:
//!
//! ```text
//! 0..8    insn_count
//! 8       cpu
//! 9       store (1 = store, 0 = load)
//! 10      size  (log2 of the access width in bytes)
//! 11..16  padding
//! 16..24  address
//! ```

use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// On-disk layout. Byte arrays keep the alignment at 1 so a batch buffer
/// can be cast directly.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct RawRecord {
    insn_count: [u8; 8],
    cpu: u8,
    store: u8,
    size: u8,
    padding: [u8; 5],
    address: [u8; 8],
}

/// One traced memory access.
#[derive(Clone, Copy, Default, Serialize)]
pub struct LogRecord {
    pub insn_count: u64,
    pub cpu: u8,
    pub store: u8,
    pub size: u8,
    pub address: u64,
}

impl LogRecord {
    /// Encoded size in bytes.
    pub const SIZE: usize = std::mem::size_of::<RawRecord>();

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        Self::from_raw(bytemuck::from_bytes(bytes))
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        bytemuck::cast(self.to_raw())
    }

    pub(crate) fn from_raw(raw: &RawRecord) -> Self {
        Self {
            insn_count: u64::from_le_bytes(raw.insn_count),
            cpu: raw.cpu,
            store: raw.store,
            size: raw.size,
            address: u64::from_le_bytes(raw.address),
        }
    }

    fn to_raw(self) -> RawRecord {
        RawRecord {
            insn_count: self.insn_count.to_le_bytes(),
            cpu: self.cpu,
            store: self.store,
            size: self.size,
            padding: [0; 5],
            address: self.address.to_le_bytes(),
        }
    }

    pub fn is_store(&self) -> bool {
        self.store == 1
    }

    /// Width of the access in bytes, or `None` when `size` is too large to
    /// be a log2 width.
    pub fn access_bytes(&self) -> Option<u64> {
        1u64.checked_shl(u32::from(self.size))
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},0x{:016x}",
            self.insn_count, self.cpu, self.store, self.size, self.address
        )
    }
}

impl fmt::Debug for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogRecord {{ insn_count: {}, cpu: {}, store: {}, size: {}, address: 0x{:016x} }}",
            self.insn_count, self.cpu, self.store, self.size, self.address
        )
    }
}

pub(crate) fn parse_field<T: FromStr>(field: &'static str, value: &str) -> Result<T, ParseError> {
    value.trim().parse().map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}

pub(crate) fn parse_hex(field: &'static str, value: &str) -> Result<u64, ParseError> {
    let digits = value.trim();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(digits);
    u64::from_str_radix(digits, 16).map_err(|_| ParseError::InvalidField {
        field,
        value: value.to_string(),
    })
}

pub(crate) fn split_fields(s: &str, expected: usize) -> Result<Vec<&str>, ParseError> {
    let parts: Vec<&str> = s.trim().split(',').collect();
    if parts.len() != expected {
        return Err(ParseError::FieldCount {
            expected,
            found: parts.len(),
        });
    }
    Ok(parts)
}

impl FromStr for LogRecord {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = split_fields(s, 5)?;
        Ok(LogRecord {
            insn_count: parse_field("insn_count", parts[0])?,
            cpu: parse_field("cpu", parts[1])?,
            store: parse_field("store", parts[2])?,
            size: parse_field("size", parts[3])?,
            address: parse_hex("address", parts[4])?,
        })
    }
}

// Ordering is by instruction count alone so records can sit on a heap.
impl PartialEq for LogRecord {
    fn eq(&self, other: &Self) -> bool {
        self.insn_count == other.insn_count
    }
}

impl Eq for LogRecord {}

impl PartialOrd for LogRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.insn_count.cmp(&other.insn_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LogRecord {
        LogRecord {
            insn_count: 0x0102_0304_0506_0708,
            cpu: 3,
            store: 1,
            size: 2,
            address: 0xdead_beef,
        }
    }

    #[test]
    fn layout_is_24_bytes_little_endian() {
        assert_eq!(LogRecord::SIZE, 24);
        let bytes = sample().to_bytes();
        assert_eq!(&bytes[0..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(bytes[8], 3);
        assert_eq!(bytes[9], 1);
        assert_eq!(bytes[10], 2);
        assert_eq!(&bytes[11..16], &[0; 5]);
        assert_eq!(&bytes[16..24], &0xdead_beefu64.to_le_bytes());
    }

    #[test]
    fn padding_is_ignored_on_read() {
        let mut bytes = sample().to_bytes();
        bytes[11..16].copy_from_slice(&[0xff; 5]);
        let rec = LogRecord::from_bytes(&bytes);
        assert_eq!(rec.address, 0xdead_beef);
        assert_eq!(rec.size, 2);
    }

    #[test]
    fn text_form() {
        let rec = sample();
        let text = rec.to_string();
        assert_eq!(text, "72623859790382856,3,1,2,0x00000000deadbeef");
        let parsed: LogRecord = text.parse().unwrap();
        assert_eq!(format!("{parsed:?}"), format!("{rec:?}"));
    }

    #[test]
    fn text_form_errors() {
        assert_eq!(
            "1,2,3".parse::<LogRecord>().unwrap_err(),
            ParseError::FieldCount { expected: 5, found: 3 }
        );
        assert!(matches!(
            "1,2,0,0,0xzz".parse::<LogRecord>(),
            Err(ParseError::InvalidField { field: "address", .. })
        ));
        assert!("x,2,0,0,0x10".parse::<LogRecord>().is_err());
    }

    #[test]
    fn access_width() {
        let mut rec = sample();
        assert_eq!(rec.access_bytes(), Some(4));
        rec.size = 0;
        assert_eq!(rec.access_bytes(), Some(1));
        rec.size = 63;
        assert_eq!(rec.access_bytes(), Some(1 << 63));
        for corrupt in [64, 65, 200, u8::MAX] {
            rec.size = corrupt;
            assert_eq!(rec.access_bytes(), None);
        }
        assert!(!LogRecord { store: 0, ..rec }.is_store());
    }
}
