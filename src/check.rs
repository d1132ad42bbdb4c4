//! Instruction count monotonicity check.
//!
//! A record is out of order when its instruction count is strictly lower
//! than that of the record immediately before it. Equal counts are allowed.

use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::config::ReaderConfig;
use crate::error::TraceError;
use crate::reader::LogReader;
use crate::record::LogRecord;

/// A record whose instruction count went backwards.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Violation {
    /// Zero based position of the offending record in the log.
    pub index: u64,
    /// Instruction count of the preceding record.
    pub prev_count: u64,
    pub record: LogRecord,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "out of order at record {}", self.index)?;
        writeln!(f, "prev count: {}", self.prev_count)?;
        write!(f, "{}", self.record)
    }
}

#[derive(Debug, Default)]
pub struct MonotonicityChecker {
    prev: u64,
    index: u64,
}

impl MonotonicityChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next record. The previous count always advances, so a single
    /// low record produces one violation rather than one per follower.
    pub fn observe(&mut self, record: &LogRecord) -> Option<Violation> {
        let violation = (record.insn_count < self.prev).then(|| Violation {
            index: self.index,
            prev_count: self.prev,
            record: *record,
        });
        self.prev = record.insn_count;
        self.index += 1;
        violation
    }

    /// Records observed so far.
    pub fn observed(&self) -> u64 {
        self.index
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Stop scanning once this many violations have been found.
    /// Must be at least 1 when set.
    pub max_violations: Option<u64>,
}

impl CheckOptions {
    pub fn validate(&self) -> Result<(), TraceError> {
        if self.max_violations == Some(0) {
            return Err(TraceError::Config(
                "violation limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CheckReport {
    pub records: u64,
    pub violations: u64,
    pub first_violation: Option<Violation>,
    /// True when the scan ended early because of `max_violations`.
    pub stopped_early: bool,
}

impl CheckReport {
    pub fn is_monotonic(&self) -> bool {
        self.violations == 0
    }
}

/// Run the checker over a record stream, handing each violation to `sink`.
pub fn check_records<I, F>(
    records: I,
    options: &CheckOptions,
    mut sink: F,
) -> Result<CheckReport, TraceError>
where
    I: IntoIterator<Item = Result<LogRecord, TraceError>>,
    F: FnMut(&Violation),
{
    options.validate()?;
    let mut checker = MonotonicityChecker::new();
    let mut report = CheckReport::default();

    for record in records {
        let record = record?;
        if let Some(v) = checker.observe(&record) {
            report.violations += 1;
            report.first_violation.get_or_insert(v);
            sink(&v);
            if options
                .max_violations
                .is_some_and(|max| report.violations >= max)
            {
                report.stopped_early = true;
                break;
            }
        }
    }

    report.records = checker.observed();
    Ok(report)
}

/// Check a log file on disk.
pub fn check_file<P, F>(
    path: P,
    reader_config: &ReaderConfig,
    options: &CheckOptions,
    sink: F,
) -> Result<CheckReport, TraceError>
where
    P: AsRef<Path>,
    F: FnMut(&Violation),
{
    let reader = LogReader::open_with(path, reader_config)?;
    check_records(reader, options, sink)
}
