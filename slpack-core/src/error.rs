//! Error types for slpack operations.
//!
//! Byte-level stream operations do not return these errors directly: they
//! follow the EOF-plus-error-flag convention (`None`/`false` return values
//! with `has_error()` for disambiguation). The `Result`-returning surface is
//! open/close/seek and the chunk protocol.

use std::io;
use thiserror::Error;

/// The main error type for slpack operations.
#[derive(Debug, Error)]
pub enum PackError {
    /// I/O error from the underlying file or sink.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stream content does not match the requested open mode.
    #[error("invalid magic number: expected {expected:#010x}, found {found:#010x}")]
    InvalidMagic {
        /// Expected (masked) magic value.
        expected: u32,
        /// Value actually read from the stream.
        found: u32,
    },

    /// The stream ended before a complete header or framing record.
    #[error("unexpected end of stream: expected {expected} more bytes")]
    UnexpectedEof {
        /// Number of bytes that were expected but not available.
        expected: usize,
    },

    /// Operation not valid for this handle in its current mode or nesting.
    #[error("invalid stream state: {message}")]
    InvalidState {
        /// Description of the violated mode/nesting requirement.
        message: String,
    },

    /// Caller violated a documented constraint.
    #[error("precondition violated: {message}")]
    Precondition {
        /// Description of the violated constraint.
        message: String,
    },
}

/// Result type alias for slpack operations.
pub type Result<T> = std::result::Result<T, PackError>;

impl PackError {
    /// Create an invalid magic error.
    pub fn invalid_magic(expected: u32, found: u32) -> Self {
        Self::InvalidMagic { expected, found }
    }

    /// Create an unexpected EOF error.
    pub fn unexpected_eof(expected: usize) -> Self {
        Self::UnexpectedEof { expected }
    }

    /// Create an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create a precondition error.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }
}
