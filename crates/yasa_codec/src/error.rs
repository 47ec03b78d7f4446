//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode a value to a frame.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// The frame is not a well-formed encoded value.
    #[error("decoding failed: {message}")]
    DecodingFailed {
        /// Description of the decoding error.
        message: String,
    },

    /// The frame decoded, but its shape is not what the caller expected.
    #[error("invalid frame structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A line terminator was found inside a single frame.
    #[error("frame contains an embedded line terminator")]
    EmbeddedNewline,

    /// The frame exceeds the maximum accepted length.
    #[error("frame too long: {len} bytes (max {max})")]
    FrameTooLong {
        /// Length of the offending frame.
        len: usize,
        /// Maximum accepted length.
        max: usize,
    },
}

impl CodecError {
    /// Create an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Create a decoding failed error.
    pub fn decoding_failed(message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
