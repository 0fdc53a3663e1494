//! Error types for blocksync

use thiserror::Error;

/// Result type alias for blocksync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for blocksync
///
/// Every variant is fatal: an error aborts the current operation and
/// propagates to the caller. Nothing is retried or downgraded.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors (reading or writing one of the caller's streams)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Structurally invalid signature data (bad magic, truncation,
    /// impossible block lengths, non-contiguous sequences)
    #[error("malformed signature: {reason}")]
    MalformedSignature { reason: String },

    /// Structurally invalid delta data (unknown tag, truncation,
    /// zero-length operations, broken output tiling)
    #[error("malformed delta: {reason}")]
    MalformedDelta { reason: String },

    /// A copy operation referenced a block the reference stream does not
    /// have. Usually means sender and receiver disagree on the block size
    /// or the reference changed underneath the rebuild.
    #[error("block sequence {sequence} out of range (reference has {block_count} blocks)")]
    SequenceOutOfRange { sequence: u32, block_count: u64 },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a malformed-signature error
    pub fn malformed_signature(reason: impl Into<String>) -> Self {
        Self::MalformedSignature {
            reason: reason.into(),
        }
    }

    /// Create a malformed-delta error
    pub fn malformed_delta(reason: impl Into<String>) -> Self {
        Self::MalformedDelta {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}
