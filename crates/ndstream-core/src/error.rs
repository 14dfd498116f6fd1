//! Error types for the NDJSON codec.

use thiserror::Error;

/// Boxed error produced by a value codec or a fallible record source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for codec operations.
pub type NdjsonResult<T> = Result<T, NdjsonError>;

/// Errors that can occur while writing or reading an NDJSON stream.
///
/// Configuration errors are raised before any I/O happens. Encode and
/// decode errors are terminal for the stream they occur in, but never
/// invalidate lines that were already flushed or records already yielded.
#[derive(Debug, Error)]
pub enum NdjsonError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("unsupported charset: {0}")]
    UnsupportedCharset(String),

    #[error("no acceptable NDJSON media type in: {0}")]
    NotAcceptable(String),

    #[error("invalid codec configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid status code: {0}")]
    InvalidStatus(u16),

    #[error("failed to encode record: {0}")]
    Encode(#[source] BoxError),

    #[error("encoded record contains a raw newline")]
    EmbeddedNewline,

    #[error("failed to decode line {line}: {source}")]
    Decode {
        line: u64,
        #[source]
        source: BoxError,
    },

    #[error("line {line} exceeds the maximum length of {limit} bytes")]
    LineTooLong { line: u64, limit: usize },

    #[error("record source failed: {0}")]
    Source(#[source] BoxError),

    #[error("stream cancelled after {written} records")]
    Cancelled { written: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NdjsonError {
    /// Whether this is a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether this error was raised by a precondition check, before any I/O.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMediaType(_)
                | Self::UnsupportedCharset(_)
                | Self::NotAcceptable(_)
                | Self::InvalidConfig(_)
                | Self::InvalidStatus(_)
        )
    }

    /// Whether the peer sent a line that could not be turned into a record.
    pub fn is_decode(&self) -> bool {
        matches!(self, Self::Decode { .. } | Self::LineTooLong { .. })
    }
}
