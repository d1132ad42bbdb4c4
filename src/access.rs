//! Text form of the post-processed access trace.
//!
//! ```text
//! insn,0,store,cpu,0xaddress     regular load/store
//! insn,1,0,0xfrom,0xto           detected rowclone
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::record::{parse_field, parse_hex, split_fields, LogRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryAccess {
    Regular(MemRecord),
    Rowclone(RowcloneRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemRecord {
    pub insn_count: u64,
    pub address: u64,
    pub store: bool,
    pub cpu: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowcloneRecord {
    pub insn_count: u64,
    pub from: u64,
    pub to: u64,
}

impl From<&LogRecord> for MemRecord {
    fn from(r: &LogRecord) -> Self {
        Self {
            insn_count: r.insn_count,
            address: r.address,
            store: r.is_store(),
            cpu: r.cpu as usize,
        }
    }
}

impl fmt::Display for MemRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},0,{},{},0x{:016x}",
            self.insn_count,
            u8::from(self.store),
            self.cpu,
            self.address
        )
    }
}

impl fmt::Display for RowcloneRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},1,0,0x{:016x},0x{:016x}",
            self.insn_count, self.from, self.to
        )
    }
}

impl fmt::Display for MemoryAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryAccess::Regular(rec) => rec.fmt(f),
            MemoryAccess::Rowclone(rec) => rec.fmt(f),
        }
    }
}

impl FromStr for MemoryAccess {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = split_fields(s, 5)?;
        let insn_count = parse_field("insn_count", parts[0])?;
        if parts[1].trim() == "1" {
            Ok(MemoryAccess::Rowclone(RowcloneRecord {
                insn_count,
                from: parse_hex("from", parts[3])?,
                to: parse_hex("to", parts[4])?,
            }))
        } else {
            Ok(MemoryAccess::Regular(MemRecord {
                insn_count,
                address: parse_hex("address", parts[4])?,
                store: parts[2].trim() == "1",
                cpu: parse_field("cpu", parts[3])?,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_line() {
        let line = "42,0,1,3,0x00000000000000ff";
        let acc: MemoryAccess = line.parse().unwrap();
        assert_eq!(
            acc,
            MemoryAccess::Regular(MemRecord {
                insn_count: 42,
                address: 0xff,
                store: true,
                cpu: 3,
            })
        );
        assert_eq!(acc.to_string(), line);
    }

    #[test]
    fn rowclone_line() {
        let line = "7,1,0,0x0000000000001000,0x0000000000002000";
        let acc: MemoryAccess = line.parse().unwrap();
        assert_eq!(
            acc,
            MemoryAccess::Rowclone(RowcloneRecord {
                insn_count: 7,
                from: 0x1000,
                to: 0x2000,
            })
        );
        assert_eq!(acc.to_string(), line);
    }

    #[test]
    fn bad_hex_is_an_error() {
        assert!("1,0,0,0,0xnothex".parse::<MemoryAccess>().is_err());
        assert!("1,1,0,0xgg,0x10".parse::<MemoryAccess>().is_err());
        assert!("1,0,0,0".parse::<MemoryAccess>().is_err());
    }
}
