use std::fmt;
use std::io;
use std::path::Path;

use crate::error::TraceError;

/// Error surfaced to the command line user.
#[derive(Debug)]
pub struct CliError {
    pub msg: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.msg.fmt(f)
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// What to look at when a trace file cannot be read or written.
fn io_suggestion(err: &io::Error) -> &'static str {
    use io::ErrorKind::*;
    // ENOSPC surfaces as `Other` on older toolchains.
    if err.raw_os_error() == Some(28) {
        return "The output device is full. Merged logs and access traces are large; write them elsewhere.";
    }
    match err.kind() {
        NotFound => "No trace log at that path. Per-CPU logs come from expanding `{cpu}` in --pattern.",
        PermissionDenied => "The trace file or its directory is not accessible to this user.",
        UnexpectedEof => "The trace ends early. The tracer may still be writing it.",
        WriteZero => "The output stopped accepting data. The device may be full.",
        _ => "Check the trace file and the directory that holds it.",
    }
}

/// Path-aware message for an I/O failure on a trace file.
pub fn format_io_error(operation: &str, path: &Path, err: &io::Error) -> String {
    format!(
        "Error {} '{}': {}. {}",
        operation,
        path.display(),
        err,
        io_suggestion(err)
    )
}

/// Convert an I/O error into a CLI error with context.
pub fn io_cli_error(operation: &str, path: &Path, err: io::Error) -> CliError {
    CliError {
        msg: format_io_error(operation, path, &err),
        source: Some(Box::new(err)),
    }
}

pub fn simple_cli_error(msg: &str) -> CliError {
    CliError {
        msg: msg.to_string(),
        source: None,
    }
}

/// Wrap a library error, routing plain I/O failures through the path aware
/// formatter.
pub fn trace_cli_error(operation: &str, path: &Path, err: TraceError) -> CliError {
    match err {
        TraceError::Io(io) => io_cli_error(operation, path, io),
        other => CliError {
            msg: format!("Error {} '{}': {}", operation, path.display(), cli_hint(&other)),
            source: Some(Box::new(other)),
        },
    }
}

/// Return an actionable hint for an error variant.
pub fn cli_hint(err: &TraceError) -> String {
    match err {
        TraceError::Io(io) => format!("{io}"),
        TraceError::Truncated { offset, trailing } => format!(
            "{trailing} stray bytes at offset {offset}. The log was cut short or is not a trace log."
        ),
        TraceError::Parse(e) => format!("{e}. Check that the input is a text access trace."),
        TraceError::Config(msg) => format!("{msg}. Invalid configuration."),
        TraceError::KernelLog(msg) => format!("{msg}. Check the kernel copy log."),
    }
}
