use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::config::ReaderConfig;
use crate::error::TraceError;
use crate::record::{LogRecord, RawRecord};

/// Streams [`LogRecord`]s from a binary log, `batch_size` records per fill.
///
/// Iteration stops at a clean end of file. A log that ends inside a record
/// yields a single [`TraceError::Truncated`] and then stops.
pub struct LogReader<R> {
    inner: R,
    buf: Vec<u8>,
    filled: usize,
    pos: usize,
    eof: bool,
    done: bool,
    records_read: u64,
    bytes_read: u64,
}

impl LogReader<File> {
    /// Open a log file for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        Self::open_with(path, &ReaderConfig::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, config: &ReaderConfig) -> Result<Self, TraceError> {
        let len = config.buffer_len()?;
        let file = File::open(path)?;
        Ok(Self::build(file, len))
    }
}

impl<R: Read> LogReader<R> {
    pub fn new(inner: R) -> Self {
        Self::build(inner, ReaderConfig::default().batch_size * LogRecord::SIZE)
    }

    pub fn with_config(inner: R, config: &ReaderConfig) -> Result<Self, TraceError> {
        let len = config.buffer_len()?;
        Ok(Self::build(inner, len))
    }

    fn build(inner: R, buf_len: usize) -> Self {
        Self {
            inner,
            buf: vec![0u8; buf_len],
            filled: 0,
            pos: 0,
            eof: false,
            done: false,
            records_read: 0,
            bytes_read: 0,
        }
    }

    /// Records handed out so far.
    pub fn records_read(&self) -> u64 {
        self.records_read
    }

    /// Bytes pulled from the underlying reader so far.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Move any partial record to the front of the buffer and read until the
    /// buffer is full or the source is exhausted.
    fn refill(&mut self) -> io::Result<()> {
        let leftover = self.filled - self.pos;
        self.buf.copy_within(self.pos..self.filled, 0);
        self.filled = leftover;
        self.pos = 0;
        while self.filled < self.buf.len() {
            match self.inner.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    self.eof = true;
                    break;
                }
                Ok(n) => {
                    self.filled += n;
                    self.bytes_read += n as u64;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

impl<R: Read + Seek> LogReader<R> {
    /// Restart from the beginning of the log.
    pub fn rewind(&mut self) -> Result<(), TraceError> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.filled = 0;
        self.pos = 0;
        self.eof = false;
        self.done = false;
        self.records_read = 0;
        self.bytes_read = 0;
        Ok(())
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<LogRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.pos + LogRecord::SIZE <= self.filled {
                let end = self.pos + LogRecord::SIZE;
                let raw: &RawRecord = bytemuck::from_bytes(&self.buf[self.pos..end]);
                self.pos = end;
                self.records_read += 1;
                return Some(Ok(LogRecord::from_raw(raw)));
            }
            if self.eof {
                self.done = true;
                let trailing = self.filled - self.pos;
                if trailing == 0 {
                    return None;
                }
                return Some(Err(TraceError::Truncated {
                    offset: self.records_read * LogRecord::SIZE as u64,
                    trailing,
                }));
            }
            if let Err(e) = self.refill() {
                self.done = true;
                return Some(Err(e.into()));
            }
        }
    }
}
