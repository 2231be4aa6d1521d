//! Crate error type.

use std::fmt;
use std::io;

/// Category of an [`AggregationError`], without the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Empty or malformed identifiers and values.
    InvalidArgument,
    /// The sample references a table that is not configured.
    NotFound,
    /// Malformed wire-format input.
    Parse,
    /// Unexpected internal condition.
    Runtime,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotFound => "not found",
            ErrorKind::Parse => "parse error",
            ErrorKind::Runtime => "runtime error",
        };
        f.write_str(name)
    }
}

/// Errors returned by the aggregation core.
#[derive(Debug)]
pub enum AggregationError {
    /// An identifier or value was empty or malformed.
    InvalidArgument(String),
    /// No table is configured for the referenced metric.
    NotFound(String),
    /// A wire-format record could not be decoded.
    Parse(String),
    /// An unexpected internal failure, e.g. a regex or thread spawn failure.
    Runtime(String),
}

impl AggregationError {
    /// Returns the category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AggregationError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            AggregationError::NotFound(_) => ErrorKind::NotFound,
            AggregationError::Parse(_) => ErrorKind::Parse,
            AggregationError::Runtime(_) => ErrorKind::Runtime,
        }
    }

    /// Returns the message without the category prefix.
    pub fn message(&self) -> &str {
        match self {
            AggregationError::InvalidArgument(msg)
            | AggregationError::NotFound(msg)
            | AggregationError::Parse(msg)
            | AggregationError::Runtime(msg) => msg,
        }
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AggregationError::InvalidArgument(msg.into())
    }

    pub(crate) fn parse(msg: impl Into<String>) -> Self {
        AggregationError::Parse(msg.into())
    }
}

impl fmt::Display for AggregationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for AggregationError {}

impl From<regex::Error> for AggregationError {
    fn from(err: regex::Error) -> Self {
        AggregationError::Runtime(format!("regex error: {err}"))
    }
}

impl From<io::Error> for AggregationError {
    fn from(err: io::Error) -> Self {
        AggregationError::Runtime(format!("I/O error: {err}"))
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = AggregationError> = std::result::Result<T, E>;
