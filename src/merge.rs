//! K-way merge of per-CPU logs into one log ordered by instruction count.

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io::{Read, Write};

use crate::check::MonotonicityChecker;
use crate::error::TraceError;
use crate::reader::LogReader;
use crate::record::LogRecord;
use crate::writer::LogWriter;

#[derive(Debug, Clone, Default, Serialize)]
pub struct MergeReport {
    pub inputs: usize,
    pub records: u64,
    /// Merged records that went backwards; only possible when an input was
    /// itself unsorted.
    pub out_of_order: u64,
}

type Heap = BinaryHeap<Reverse<(LogRecord, usize)>>;

fn push_next<R: Read>(
    heap: &mut Heap,
    reader: &mut LogReader<R>,
    source: usize,
) -> Result<(), TraceError> {
    if let Some(record) = reader.next().transpose()? {
        heap.push(Reverse((record, source)));
    }
    Ok(())
}

/// Merge `inputs` into `output`. Equal instruction counts are emitted in
/// input order.
pub fn merge_logs<R: Read, W: Write>(
    mut inputs: Vec<LogReader<R>>,
    output: &mut LogWriter<W>,
) -> Result<MergeReport, TraceError> {
    let mut heap = Heap::with_capacity(inputs.len());
    for (source, reader) in inputs.iter_mut().enumerate() {
        push_next(&mut heap, reader, source)?;
    }

    let mut checker = MonotonicityChecker::new();
    let mut report = MergeReport {
        inputs: inputs.len(),
        ..MergeReport::default()
    };

    while let Some(Reverse((record, source))) = heap.pop() {
        if let Some(v) = checker.observe(&record) {
            report.out_of_order += 1;
            tracing::warn!(
                index = v.index,
                prev_count = v.prev_count,
                insn_count = record.insn_count,
                source,
                "instruction count out of order in merged output"
            );
        }
        output.write(&record)?;
        report.records += 1;
        push_next(&mut heap, &mut inputs[source], source)?;
    }

    tracing::info!(
        inputs = report.inputs,
        records = report.records,
        out_of_order = report.out_of_order,
        "merge complete"
    );
    Ok(report)
}

/// Expand a `{cpu}` placeholder into one path per CPU.
pub fn cpu_paths(pattern: &str, cpus: usize) -> Result<Vec<String>, TraceError> {
    if !pattern.contains("{cpu}") {
        return Err(TraceError::Config(format!(
            "pattern '{pattern}' has no {{cpu}} placeholder"
        )));
    }
    Ok((0..cpus)
        .map(|c| pattern.replace("{cpu}", &c.to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn log(entries: &[(u64, u8)]) -> LogReader<Cursor<Vec<u8>>> {
        let mut w = LogWriter::new(Vec::new());
        for &(insn_count, cpu) in entries {
            w.write(&LogRecord {
                insn_count,
                cpu,
                ..LogRecord::default()
            })
            .unwrap();
        }
        LogReader::new(Cursor::new(w.finish().unwrap()))
    }

    fn merged(out: LogWriter<Vec<u8>>) -> Vec<(u64, u8)> {
        LogReader::new(Cursor::new(out.finish().unwrap()))
            .map(|r| r.unwrap())
            .map(|r| (r.insn_count, r.cpu))
            .collect()
    }

    #[test]
    fn interleaves_by_count() {
        let inputs = vec![
            log(&[(1, 0), (4, 0), (9, 0)]),
            log(&[(2, 1), (3, 1)]),
            log(&[]),
            log(&[(5, 3)]),
        ];
        let mut out = LogWriter::new(Vec::new());
        let report = merge_logs(inputs, &mut out).unwrap();
        assert_eq!(report.inputs, 4);
        assert_eq!(report.records, 6);
        assert_eq!(report.out_of_order, 0);
        assert_eq!(
            merged(out),
            [(1, 0), (2, 1), (3, 1), (4, 0), (5, 3), (9, 0)]
        );
    }

    #[test]
    fn ties_follow_input_order() {
        let inputs = vec![log(&[(7, 0)]), log(&[(7, 1)]), log(&[(7, 2)])];
        let mut out = LogWriter::new(Vec::new());
        merge_logs(inputs, &mut out).unwrap();
        assert_eq!(merged(out), [(7, 0), (7, 1), (7, 2)]);
    }

    #[test]
    fn unsorted_input_is_counted() {
        let inputs = vec![log(&[(5, 0), (2, 0)]), log(&[(6, 1)])];
        let mut out = LogWriter::new(Vec::new());
        let report = merge_logs(inputs, &mut out).unwrap();
        assert_eq!(report.out_of_order, 1);
    }

    #[test]
    fn truncated_input_aborts() {
        let mut bytes = LogRecord::default().to_bytes().to_vec();
        bytes.truncate(10);
        let inputs = vec![log(&[(1, 0)]), LogReader::new(Cursor::new(bytes))];
        let mut out = LogWriter::new(Vec::new());
        assert!(matches!(
            merge_logs(inputs, &mut out),
            Err(TraceError::Truncated { .. })
        ));
    }

    #[test]
    fn expands_cpu_pattern() {
        assert_eq!(
            cpu_paths("logs/exec.log.{cpu}", 3).unwrap(),
            ["logs/exec.log.0", "logs/exec.log.1", "logs/exec.log.2"]
        );
        assert!(cpu_paths("logs/exec.log", 3).is_err());
    }
}
