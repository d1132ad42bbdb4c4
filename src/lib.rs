//! Post-processing for emulator memory-access trace logs.
//!
//! Traces are flat files of fixed 24-byte [`LogRecord`]s, one file per CPU.
//! The tools here check instruction count ordering, merge per-CPU logs,
//! dump logs as text, filter accesses through a cache model, and collapse
//! kernel copies into rowclone records.

pub mod access;
pub mod cache;
pub mod check;
pub mod config;
pub mod dump;
mod error;
pub mod io_utils;
pub mod merge;
pub mod reader;
pub mod record;
pub mod rowclone;
pub mod writer;

pub use access::{MemRecord, MemoryAccess, RowcloneRecord};
pub use cache::{filter_misses, Cache, CacheReport};
pub use check::{
    check_file, check_records, CheckOptions, CheckReport, MonotonicityChecker, Violation,
};
pub use config::{CacheConfig, ReaderConfig, RowcloneConfig};
pub use dump::{dump_log, dump_writer};
pub use error::{ParseError, TraceError};
pub use merge::{cpu_paths, merge_logs, MergeReport};
pub use reader::LogReader;
pub use record::LogRecord;
pub use rowclone::{add_rowclone_info, RowcloneMatcher, RowcloneReport};
pub use writer::LogWriter;
