//! Set-associative LRU cache simulator and the miss filter built on it.

use serde::Serialize;
use std::collections::VecDeque;
use std::io::{BufRead, Write};

use crate::access::MemoryAccess;
use crate::config::CacheConfig;
use crate::error::TraceError;

#[derive(Debug)]
struct CacheSet {
    lines: Vec<Option<u64>>,
    // Occupied line indices, least recently used first.
    lru: VecDeque<usize>,
}

impl CacheSet {
    fn new(associativity: usize) -> Self {
        Self {
            lines: vec![None; associativity],
            lru: VecDeque::with_capacity(associativity),
        }
    }

    /// Returns true on a hit. A miss installs `tag`, evicting the least
    /// recently used line when the set is full.
    fn access(&mut self, tag: u64) -> bool {
        if let Some(pos) = self.lines.iter().position(|&l| l == Some(tag)) {
            self.lru.retain(|&i| i != pos);
            self.lru.push_back(pos);
            return true;
        }
        let slot = match self.lines.iter().position(Option::is_none) {
            Some(free) => free,
            // A full set always has an LRU entry.
            None => self.lru.pop_front().unwrap_or(0),
        };
        self.lines[slot] = Some(tag);
        self.lru.push_back(slot);
        false
    }
}

#[derive(Debug)]
pub struct Cache {
    block_size: u64,
    sets: Vec<CacheSet>,
}

impl Cache {
    /// Build a cache of `size` bytes split into `block_size` lines grouped
    /// `associativity` ways per set.
    pub fn new(size: usize, block_size: usize, associativity: usize) -> Result<Self, TraceError> {
        if block_size == 0 || associativity == 0 {
            return Err(TraceError::Config(
                "block size and associativity must be non-zero".into(),
            ));
        }
        let num_sets = size / block_size / associativity;
        if num_sets == 0 {
            return Err(TraceError::Config(format!(
                "cache of {size} bytes cannot hold one {associativity}-way set of {block_size}-byte lines"
            )));
        }
        Ok(Self {
            block_size: block_size as u64,
            sets: (0..num_sets).map(|_| CacheSet::new(associativity)).collect(),
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self, TraceError> {
        Self::new(config.size, config.block_size, config.associativity)
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    /// Simulate an access. Returns true on a hit.
    pub fn access(&mut self, address: u64) -> bool {
        let block = address / self.block_size;
        let set = (block % self.sets.len() as u64) as usize;
        self.sets[set].access(block)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheReport {
    pub accesses: u64,
    pub hits: u64,
    pub misses: u64,
    pub rowclones: u64,
    pub skipped: u64,
}

/// Run a text access trace through `cache`, writing misses and rowclone
/// records to `out`. Hits are dropped.
pub fn filter_misses<R: BufRead, W: Write>(
    input: R,
    cache: &mut Cache,
    out: &mut W,
) -> Result<CacheReport, TraceError> {
    let mut report = CacheReport::default();
    for (lineno, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<MemoryAccess>() {
            Ok(MemoryAccess::Regular(mem)) => {
                report.accesses += 1;
                if cache.access(mem.address) {
                    report.hits += 1;
                } else {
                    report.misses += 1;
                    writeln!(out, "{mem}")?;
                }
            }
            Ok(rowclone @ MemoryAccess::Rowclone(_)) => {
                report.rowclones += 1;
                writeln!(out, "{rowclone}")?;
            }
            Err(e) => {
                report.skipped += 1;
                tracing::warn!(line = lineno + 1, error = %e, "skipping unparseable access");
            }
        }
    }
    out.flush()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry() {
        let cache = Cache::new(256 * 1024, 64, 8).unwrap();
        assert_eq!(cache.num_sets(), 512);
        assert!(Cache::new(64, 64, 8).is_err());
        assert!(Cache::new(1024, 0, 8).is_err());
        assert!(Cache::new(1024, 64, 0).is_err());
    }

    #[test]
    fn same_block_hits() {
        let mut cache = Cache::new(1024, 64, 2).unwrap();
        assert!(!cache.access(0x1000));
        assert!(cache.access(0x1000));
        assert!(cache.access(0x103f));
        assert!(!cache.access(0x1040));
    }

    #[test]
    fn evicts_least_recently_used() {
        // One set, two ways.
        let mut cache = Cache::new(128, 64, 2).unwrap();
        assert!(!cache.access(0x000));
        assert!(!cache.access(0x040));
        assert!(cache.access(0x000));
        // 0x040 is now LRU.
        assert!(!cache.access(0x080));
        assert!(cache.access(0x000));
        assert!(!cache.access(0x040));
        assert!(!cache.access(0x080));
    }

    #[test]
    fn filter_keeps_misses_and_rowclones() {
        let input = "\
1,0,0,0,0x0000000000001000
2,0,1,0,0x0000000000001008
3,1,0,0x0000000000002000,0x0000000000003000
garbage
4,0,0,1,0x0000000000005000
";
        let mut cache = Cache::new(1024, 64, 8).unwrap();
        let mut out = Vec::new();
        let report = filter_misses(input.as_bytes(), &mut cache, &mut out).unwrap();
        assert_eq!(report.accesses, 3);
        assert_eq!(report.hits, 1);
        assert_eq!(report.misses, 2);
        assert_eq!(report.rowclones, 1);
        assert_eq!(report.skipped, 1);
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            [
                "1,0,0,0,0x0000000000001000",
                "3,1,0,0x0000000000002000,0x0000000000003000",
                "4,0,0,1,0x0000000000005000",
            ]
        );
    }
}
