use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::TraceError;
use crate::record::LogRecord;

/// Buffered binary log writer.
pub struct LogWriter<W: Write> {
    inner: BufWriter<W>,
    records_written: u64,
}

impl LogWriter<File> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> LogWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner: BufWriter::new(inner),
            records_written: 0,
        }
    }

    pub fn write(&mut self, record: &LogRecord) -> Result<(), TraceError> {
        self.inner.write_all(&record.to_bytes())?;
        self.records_written += 1;
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Flush buffered records and hand back the underlying writer.
    pub fn finish(self) -> Result<W, TraceError> {
        self.inner
            .into_inner()
            .map_err(|e| TraceError::Io(e.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::LogReader;
    use std::io::Cursor;

    #[test]
    fn written_log_reads_back() {
        let mut writer = LogWriter::new(Vec::new());
        for c in [10u64, 20, 30] {
            writer
                .write(&LogRecord {
                    insn_count: c,
                    cpu: 1,
                    ..LogRecord::default()
                })
                .unwrap();
        }
        assert_eq!(writer.records_written(), 3);
        let bytes = writer.finish().unwrap();
        assert_eq!(bytes.len(), 3 * LogRecord::SIZE);
        let counts: Vec<u64> = LogReader::new(Cursor::new(bytes))
            .map(|r| r.unwrap().insn_count)
            .collect();
        assert_eq!(counts, [10, 20, 30]);
    }
}
