use std::io::Write;

use crate::error::TraceError;
use crate::record::LogRecord;

/// Write records as headerless CSV rows in the `insn,cpu,store,size,0xaddr`
/// text form. Returns the number of rows written.
pub fn dump_log<I, W>(
    records: I,
    out: &mut csv::Writer<W>,
    limit: Option<u64>,
) -> Result<u64, TraceError>
where
    I: IntoIterator<Item = Result<LogRecord, TraceError>>,
    W: Write,
{
    let mut rows = 0u64;
    for record in records {
        if limit.is_some_and(|l| rows >= l) {
            break;
        }
        let r = record?;
        out.write_record([
            r.insn_count.to_string(),
            r.cpu.to_string(),
            r.store.to_string(),
            r.size.to_string(),
            format!("0x{:016x}", r.address),
        ])
        .map_err(csv_error)?;
        rows += 1;
    }
    out.flush()?;
    Ok(rows)
}

/// Headerless CSV writer for dumps.
pub fn dump_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().has_headers(false).from_writer(inner)
}

fn csv_error(err: csv::Error) -> TraceError {
    match err.into_kind() {
        csv::ErrorKind::Io(e) => TraceError::Io(e),
        other => TraceError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("{other:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<Result<LogRecord, TraceError>> {
        (1..=3)
            .map(|c| {
                Ok(LogRecord {
                    insn_count: c,
                    cpu: 2,
                    store: (c % 2) as u8,
                    size: 3,
                    address: 0x1000 * c,
                })
            })
            .collect()
    }

    #[test]
    fn rows_match_text_form() {
        let mut buf = Vec::new();
        let rows = dump_log(records(), &mut dump_writer(&mut buf), None).unwrap();
        assert_eq!(rows, 3);
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "1,2,1,3,0x0000000000001000");
        assert_eq!(lines[2], "3,2,1,3,0x0000000000003000");
        for line in lines {
            assert!(line.parse::<LogRecord>().is_ok());
        }
    }

    #[test]
    fn limit_caps_rows() {
        let mut buf = Vec::new();
        let rows = dump_log(records(), &mut dump_writer(&mut buf), Some(2)).unwrap();
        assert_eq!(rows, 2);
        assert_eq!(String::from_utf8(buf).unwrap().lines().count(), 2);
    }
}
