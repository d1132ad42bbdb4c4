use honggfuzz::fuzz;
use memtrace::{check_records, CheckOptions, LogReader};
use std::io::Cursor;

fn main() {
    loop {
        fuzz!(|data: &[u8]| {
            let reader = LogReader::new(Cursor::new(data.to_vec()));
            let _ = check_records(reader, &CheckOptions::default(), |_| {});
        });
    }
}
