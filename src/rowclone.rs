//! Correlate kernel copy events with the memory-access trace.
//!
//! The kernel log names each user/kernel copy (`copy_to_user` style) with its
//! addresses and length. A load hitting the source address of a windowed
//! kernel copy opens a candidate. Further loads and stores that walk the
//! source and destination in step advance it. Once enough bytes have moved
//! on both sides the candidate is accepted, a single rowclone record is
//! emitted for it, and its remaining accesses are swallowed. Everything
//! else is passed through as a regular access.

use regex::Regex;
use serde::Serialize;
use std::io::{self, Write};
use std::sync::LazyLock;

use crate::access::{MemRecord, MemoryAccess, RowcloneRecord};
use crate::config::RowcloneConfig;
use crate::error::TraceError;
use crate::record::{parse_field, parse_hex, LogRecord};

static KERNEL_LOG_PATTERN: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"N=([^,]+),([rw]),(\d+),(\d+),(?:0x[0-9a-fA-F]+),(0x[0-9a-fA-F]+),(?:0x[0-9a-fA-F]+),(0x[0-9a-fA-F]+)",
    )
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// `r`: kernel memory copied out to user memory.
    KernelToUser,
    /// `w`: user memory copied into kernel memory.
    UserToKernel,
}

#[derive(Debug, Clone)]
pub struct KernelCopy {
    pub id: u64,
    pub command: String,
    pub cpu: u32,
    pub size: u64,
    pub direction: CopyDirection,
    pub kernel_address: u64,
    pub user_address: u64,
    stale: usize,
}

impl KernelCopy {
    pub fn source(&self) -> u64 {
        match self.direction {
            CopyDirection::KernelToUser => self.kernel_address,
            CopyDirection::UserToKernel => self.user_address,
        }
    }

    pub fn destination(&self) -> u64 {
        match self.direction {
            CopyDirection::KernelToUser => self.user_address,
            CopyDirection::UserToKernel => self.kernel_address,
        }
    }
}

/// Parse one kernel log line. Returns `Ok(None)` for lines without a copy
/// event.
pub fn parse_kernel_line(line: &str, id: u64) -> Result<Option<KernelCopy>, TraceError> {
    let pattern = KERNEL_LOG_PATTERN
        .as_ref()
        .map_err(|e| TraceError::KernelLog(format!("bad line pattern: {e}")))?;
    let Some(caps) = pattern.captures(line) else {
        return Ok(None);
    };
    let direction = match &caps[2] {
        "r" => CopyDirection::KernelToUser,
        _ => CopyDirection::UserToKernel,
    };
    Ok(Some(KernelCopy {
        id,
        command: caps[1].to_string(),
        cpu: parse_field("cpu", &caps[3])?,
        size: parse_field("size", &caps[4])?,
        direction,
        kernel_address: parse_hex("kernel_address", &caps[5])?,
        user_address: parse_hex("user_address", &caps[6])?,
        stale: 0,
    }))
}

/// Sequential reader of kernel copy events. Lines that carry no event are
/// skipped.
struct KernelLog<K> {
    lines: K,
    next_id: u64,
    line_no: u64,
}

impl<K: Iterator<Item = io::Result<String>>> KernelLog<K> {
    fn next_copy(&mut self) -> Result<Option<KernelCopy>, TraceError> {
        for line in self.lines.by_ref() {
            let line = line?;
            self.line_no += 1;
            match parse_kernel_line(&line, self.next_id) {
                Ok(Some(copy)) => {
                    self.next_id += 1;
                    return Ok(Some(copy));
                }
                Ok(None) => {
                    tracing::warn!(line = self.line_no, "no copy event in kernel log line");
                }
                Err(TraceError::Parse(e)) => {
                    tracing::warn!(line = self.line_no, error = %e, "malformed kernel log line");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }
}

/// Byte cursors of a copy being followed through the trace.
#[derive(Debug, Clone)]
struct CopyProgress {
    kernel_id: u64,
    insn_count: u64,
    from: u64,
    to: u64,
    size: u64,
    cur_from: u64,
    cur_to: u64,
}

impl CopyProgress {
    fn matches(&self, access: &LogRecord) -> bool {
        if access.is_store() {
            self.cur_to == access.address
        } else {
            self.cur_from == access.address
        }
    }

    /// Advance the matching cursor. Returns true once every destination byte
    /// has been stored.
    fn advance(&mut self, access: &LogRecord, step: u64) -> bool {
        if access.is_store() {
            self.cur_to = self.cur_to.wrapping_add(step);
        } else {
            self.cur_from = self.cur_from.wrapping_add(step);
        }
        self.is_done()
    }

    fn is_done(&self) -> bool {
        self.cur_to >= self.to.saturating_add(self.size)
    }

    fn is_confident(&self, threshold: u64) -> bool {
        self.cur_to.saturating_sub(self.to) > threshold
            && self.cur_from.saturating_sub(self.from) > threshold
    }

    fn has_stores(&self) -> bool {
        self.cur_to != self.to
    }

    fn record(&self) -> RowcloneRecord {
        RowcloneRecord {
            insn_count: self.insn_count,
            from: self.from,
            to: self.to,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RowcloneReport {
    pub accesses: u64,
    pub regular: u64,
    pub rowclones: u64,
    pub potential_left: usize,
    pub ongoing_left: usize,
    pub unmatched_kernel: usize,
    pub stale_dropped: u64,
    /// Accesses whose size byte is not a valid log2 width. They are written
    /// out as regular accesses and never matched.
    pub invalid_size: u64,
}

pub struct RowcloneMatcher<K> {
    config: RowcloneConfig,
    kernel: KernelLog<K>,
    window: Vec<KernelCopy>,
    potential: Vec<CopyProgress>,
    ongoing: Vec<CopyProgress>,
    report: RowcloneReport,
}

impl<K: Iterator<Item = io::Result<String>>> RowcloneMatcher<K> {
    pub fn new(kernel_lines: K, config: RowcloneConfig) -> Result<Self, TraceError> {
        config.validate()?;
        let mut matcher = Self {
            config,
            kernel: KernelLog {
                lines: kernel_lines,
                next_id: 0,
                line_no: 0,
            },
            window: Vec::new(),
            potential: Vec::new(),
            ongoing: Vec::new(),
            report: RowcloneReport::default(),
        };
        matcher.refill_window()?;
        Ok(matcher)
    }

    fn refill_window(&mut self) -> Result<(), TraceError> {
        while self.window.len() < self.config.window {
            match self.kernel.next_copy()? {
                Some(copy) => self.window.push(copy),
                None => break,
            }
        }
        Ok(())
    }

    /// Retire `kernel_id` from the window and age every older entry.
    fn retire(&mut self, kernel_id: u64) -> Result<(), TraceError> {
        self.window.retain(|c| c.id != kernel_id);
        for copy in &mut self.window {
            if copy.id < kernel_id {
                copy.stale += 1;
            }
        }
        let before = self.window.len();
        let threshold = self.config.stale_threshold;
        self.window.retain(|c| c.stale <= threshold);
        self.report.stale_dropped += (before - self.window.len()) as u64;
        self.refill_window()
    }

    fn continue_ongoing(&mut self, access: &LogRecord, step: u64) -> bool {
        let Some(idx) = self.ongoing.iter().position(|c| c.matches(access)) else {
            return false;
        };
        if self.ongoing[idx].advance(access, step) {
            self.ongoing.remove(idx);
        }
        true
    }

    fn continue_potential(
        &mut self,
        access: &LogRecord,
        step: u64,
        out: &mut Vec<MemoryAccess>,
    ) -> Result<bool, TraceError> {
        let matched: Vec<usize> = self
            .potential
            .iter()
            .enumerate()
            .filter(|(_, c)| c.matches(access))
            .map(|(i, _)| i)
            .collect();

        for &idx in matched.iter().rev() {
            let done = self.potential[idx].advance(access, step);
            if !done && !self.potential[idx].is_confident(self.config.confidence_bytes) {
                continue;
            }
            let copy = self.potential.remove(idx);
            tracing::debug!(
                insn_count = copy.insn_count,
                from = copy.from,
                to = copy.to,
                size = copy.size,
                "rowclone detected"
            );
            self.report.rowclones += 1;
            out.push(MemoryAccess::Rowclone(copy.record()));
            self.retire(copy.kernel_id)?;
            if !done {
                self.ongoing.push(copy);
            }
        }
        Ok(!matched.is_empty())
    }

    fn start_potential(&mut self, access: &LogRecord, step: u64) -> bool {
        if access.is_store() {
            return false;
        }
        let mut started = false;
        for copy in self.window.iter().filter(|c| c.source() == access.address) {
            match self.potential.iter_mut().find(|p| p.kernel_id == copy.id) {
                Some(existing) => {
                    // Restart a candidate that never saw its first store.
                    if !existing.has_stores() {
                        existing.insn_count = access.insn_count;
                        started = true;
                    }
                }
                None => {
                    let to = copy.destination();
                    self.potential.push(CopyProgress {
                        kernel_id: copy.id,
                        insn_count: access.insn_count,
                        from: access.address,
                        to,
                        size: copy.size,
                        cur_from: access.address.wrapping_add(step),
                        cur_to: to,
                    });
                    started = true;
                }
            }
        }
        started
    }

    /// Feed one access. Anything to be written out is appended to `out`.
    pub fn process(
        &mut self,
        access: &LogRecord,
        out: &mut Vec<MemoryAccess>,
    ) -> Result<(), TraceError> {
        self.report.accesses += 1;
        match access.access_bytes() {
            Some(step) => {
                if self.continue_ongoing(access, step)
                    || self.continue_potential(access, step, out)?
                    || self.start_potential(access, step)
                {
                    return Ok(());
                }
            }
            None => {
                tracing::warn!(
                    insn_count = access.insn_count,
                    size = access.size,
                    "access size out of range, not matched against copies"
                );
                self.report.invalid_size += 1;
            }
        }
        self.report.regular += 1;
        out.push(MemoryAccess::Regular(MemRecord::from(access)));
        Ok(())
    }

    pub fn finish(mut self) -> RowcloneReport {
        self.report.potential_left = self.potential.len();
        self.report.ongoing_left = self.ongoing.len();
        self.report.unmatched_kernel = self.window.len();
        self.report
    }
}

/// Rewrite `records` as a text access trace with detected copies collapsed
/// into rowclone records.
pub fn add_rowclone_info<I, K, W>(
    records: I,
    kernel_lines: K,
    config: RowcloneConfig,
    out: &mut W,
) -> Result<RowcloneReport, TraceError>
where
    I: IntoIterator<Item = Result<LogRecord, TraceError>>,
    K: Iterator<Item = io::Result<String>>,
    W: Write,
{
    let mut matcher = RowcloneMatcher::new(kernel_lines, config)?;
    let mut pending = Vec::new();
    for record in records {
        matcher.process(&record?, &mut pending)?;
        for access in pending.drain(..) {
            writeln!(out, "{access}")?;
        }
    }
    out.flush()?;

    let report = matcher.finish();
    tracing::info!(
        rowclones = report.rowclones,
        potential = report.potential_left,
        unfinished = report.ongoing_left,
        unmatched = report.unmatched_kernel,
        "rowclone matching complete"
    );
    Ok(report)
}
