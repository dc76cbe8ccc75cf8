//! Error types.
//!
//! Every failure maps onto one [`ErrorKind`]; [`Error`] carries the values
//! that caused it. Tree walks wrap errors with the offending path via
//! [`Error::at`], and [`Error::kind`] sees through that wrapper.

use thiserror::Error;

/// Classification of an [`Error`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A sibling with the same name already exists
    DuplicateName,
    /// A sample index was written out of sequence
    OutOfOrder,
    /// A sample time disagrees with the property's time sampling
    TimeMismatch,
    /// An index (sample, child, cursor, table entry) is out of range
    IndexOutOfRange,
    /// A header does not match the requested schema
    SchemaMismatch,
    /// An argument is malformed
    InvalidValue,
    /// The container bytes are malformed or truncated
    CorruptContainer,
    /// Operating system I/O failure
    Io,
    /// A named child or property does not exist
    NotFound,
    /// The target archive, object or property is already closed
    Closed,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("duplicate name '{name}' under {parent}")]
    DuplicateName { name: String, parent: String },

    #[error("sample {index} written out of order (expected {expected})")]
    OutOfOrder { index: usize, expected: usize },

    #[error("sample {index} at time {time} does not match time sampling (expected {expected})")]
    TimeMismatch { index: usize, time: f64, expected: f64 },

    #[error("index {index} out of range (count: {count})")]
    IndexOutOfRange { index: usize, count: usize },

    #[error("schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("corrupt container: {0}")]
    CorruptContainer(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0} is closed")]
    Closed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another error annotated with the path of the node that raised it.
    #[error("{path}: {source}")]
    At {
        path: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// The kind of this error, looking through path annotations.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateName { .. } => ErrorKind::DuplicateName,
            Self::OutOfOrder { .. } => ErrorKind::OutOfOrder,
            Self::TimeMismatch { .. } => ErrorKind::TimeMismatch,
            Self::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Self::SchemaMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::InvalidValue(_) => ErrorKind::InvalidValue,
            Self::CorruptContainer(_) => ErrorKind::CorruptContainer,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Closed(_) => ErrorKind::Closed,
            Self::Io(_) => ErrorKind::Io,
            Self::At { source, .. } => source.kind(),
        }
    }

    /// Annotate with the path of the node the error occurred at.
    ///
    /// An error that already carries a path keeps the innermost one.
    pub fn at(self, path: impl Into<String>) -> Self {
        match self {
            Self::At { .. } => self,
            other => Self::At { path: path.into(), source: Box::new(other) },
        }
    }

    /// Path annotation, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            Self::At { path, .. } => Some(path),
            _ => None,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidValue(msg.into())
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptContainer(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    #[inline]
    pub fn out_of_range(index: usize, count: usize) -> Self {
        Self::IndexOutOfRange { index, count }
    }

    /// Map a short read while decoding container bytes.
    ///
    /// Running off the end of a block means the block is malformed, so
    /// `UnexpectedEof` becomes [`ErrorKind::CorruptContainer`].
    pub fn from_decode(err: std::io::Error, what: &str) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Self::CorruptContainer(format!("truncated {what}"))
        } else {
            Self::Io(err)
        }
    }
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;
