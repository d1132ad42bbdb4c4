#![allow(dead_code)]

use memtrace::{LogRecord, LogWriter};
use std::path::Path;

pub fn record(insn_count: u64, cpu: u8) -> LogRecord {
    LogRecord {
        insn_count,
        cpu,
        store: (insn_count % 2) as u8,
        size: 3,
        address: 0x1000 + insn_count * 8,
    }
}

pub fn write_log(path: &Path, counts: &[u64], cpu: u8) {
    let mut w = LogWriter::create(path).unwrap();
    for &c in counts {
        w.write(&record(c, cpu)).unwrap();
    }
    w.finish().unwrap();
}

pub fn encode(counts: &[u64]) -> Vec<u8> {
    counts
        .iter()
        .flat_map(|&c| record(c, 0).to_bytes())
        .collect()
}
