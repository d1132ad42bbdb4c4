use thiserror::Error;

/// Failure to parse the text form of a trace record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Wrong number of comma separated fields.
    #[error("expected {expected} fields, found {found}")]
    FieldCount { expected: usize, found: usize },

    /// A decimal or hex field did not parse.
    #[error("invalid {field} '{value}'")]
    InvalidField { field: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum TraceError {
    /// Propagated I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The log ended inside a record.
    #[error("log truncated at byte {offset}: {trailing} trailing bytes do not form a record")]
    Truncated { offset: u64, trailing: usize },

    /// Malformed text record.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Invalid tool configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Kernel copy log could not be used.
    #[error("kernel log error: {0}")]
    KernelLog(String),
}
