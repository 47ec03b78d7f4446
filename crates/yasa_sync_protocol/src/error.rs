//! Error types for protocol message handling.

use thiserror::Error;
use yasa_codec::CodecError;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while mapping frames to typed messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame itself could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A required key is absent from the message.
    #[error("missing field {0}")]
    MissingField(&'static str),

    /// A key is present but holds an unusable value.
    #[error("invalid value for {field}: {value}")]
    InvalidField {
        /// Name of the field.
        field: &'static str,
        /// Rendering of the offending value.
        value: String,
    },

    /// The message is not part of the protocol vocabulary.
    #[error("unknown message: {0}")]
    UnknownMessage(String),

    /// The server answered with an error frame.
    #[error("server error: {0}")]
    ServerError(String),

    /// A raw transfer header is malformed.
    #[error("invalid transfer header: {0}")]
    InvalidHeader(String),
}

impl ProtocolError {
    pub(crate) fn invalid_field(field: &'static str, value: impl std::fmt::Debug) -> Self {
        Self::InvalidField {
            field,
            value: format!("{value:?}"),
        }
    }
}
