mod common;

use memtrace::{
    check_records, merge_logs, CheckOptions, LogReader, LogRecord, LogWriter, MemoryAccess,
    ReaderConfig,
};
use proptest::prelude::*;
use quickcheck::quickcheck;
use std::io::Cursor;

proptest! {
    #[test]
    fn checker_flags_exactly_the_decreasing_pairs(
        counts in prop::collection::vec(0u64..1_000, 0..200),
        batch in 1usize..32,
    ) {
        let config = ReaderConfig { batch_size: batch };
        let reader = LogReader::with_config(Cursor::new(common::encode(&counts)), &config).unwrap();

        let mut flagged = Vec::new();
        let report = check_records(reader, &CheckOptions::default(), |v| flagged.push(v.index)).unwrap();

        let mut expected = Vec::new();
        let mut prev = 0u64;
        for (i, &c) in counts.iter().enumerate() {
            if c < prev {
                expected.push(i as u64);
            }
            prev = c;
        }
        prop_assert_eq!(report.records, counts.len() as u64);
        prop_assert_eq!(report.violations, expected.len() as u64);
        prop_assert_eq!(flagged, expected);
    }

    #[test]
    fn merge_output_is_a_sorted_permutation(
        logs in prop::collection::vec(prop::collection::vec(0u64..500, 0..40), 1..8),
    ) {
        let readers = logs
            .iter()
            .map(|counts| {
                let mut sorted = counts.clone();
                sorted.sort_unstable();
                LogReader::new(Cursor::new(common::encode(&sorted)))
            })
            .collect();
        let mut out = LogWriter::new(Vec::new());
        let report = merge_logs(readers, &mut out).unwrap();
        prop_assert_eq!(report.out_of_order, 0);

        let merged: Vec<u64> = LogReader::new(Cursor::new(out.finish().unwrap()))
            .map(|r| r.unwrap().insn_count)
            .collect();
        let mut all: Vec<u64> = logs.concat();
        all.sort_unstable();
        prop_assert_eq!(merged, all);
    }

    #[test]
    fn arbitrary_bytes_never_panic_the_reader(data in prop::collection::vec(any::<u8>(), 0..300)) {
        let whole = data.len() / LogRecord::SIZE;
        let trailing = data.len() % LogRecord::SIZE;
        let results: Vec<_> = LogReader::new(Cursor::new(data)).collect();
        let ok = results.iter().filter(|r| r.is_ok()).count();
        prop_assert_eq!(ok, whole);
        prop_assert_eq!(results.len(), whole + usize::from(trailing > 0));
    }
}

quickcheck! {
    fn text_parsing_never_panics(line: String) -> bool {
        let _ = line.parse::<LogRecord>();
        let _ = line.parse::<MemoryAccess>();
        true
    }

    fn access_text_reparses(insn: u64, address: u64, store: bool, cpu: u8) -> bool {
        let acc = MemoryAccess::Regular(memtrace::MemRecord {
            insn_count: insn,
            address,
            store,
            cpu: cpu as usize,
        });
        acc.to_string().parse::<MemoryAccess>() == Ok(acc)
    }
}
