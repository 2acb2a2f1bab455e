//! Error types for parameter decoding and encoding

use thiserror::Error;
use velocan_core::FrameError;

use crate::types::ParameterGroup;

/// Result type for decoding
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Result type for encoding
pub type EncodeResult<T> = Result<T, EncodeError>;

/// Errors that can occur while decoding a payload.
///
/// Decoding never panics on short or garbled input; it reports one of these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload truncated or otherwise not in the expected layout
    #[error("malformed {group} payload: {detail}")]
    Malformed {
        group: ParameterGroup,
        detail: String,
    },

    /// Descriptor has no decoder (write-only command)
    #[error("{0} is not readable")]
    NotReadable(ParameterGroup),
}

impl DecodeError {
    pub(crate) fn too_short(group: ParameterGroup, expected: usize, actual: usize) -> Self {
        DecodeError::Malformed {
            group,
            detail: format!("expected {} bytes, got {}", expected, actual),
        }
    }
}

/// Errors that can occur while encoding a value for writing
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EncodeError {
    /// Descriptor has no encoder (read-only parameter)
    #[error("{0} is not writable")]
    NotWritable(ParameterGroup),

    /// Value variant does not belong to the descriptor's group
    #[error("value of kind {found} cannot be written as {group}")]
    TypeMismatch {
        group: ParameterGroup,
        found: &'static str,
    },

    /// Physical value outside the encodable range
    #[error("{field}: value {value} not in [{min}, {max}]")]
    ValueOutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Text contains characters the device cannot store
    #[error("text must be printable ASCII: {0:?}")]
    InvalidText(String),

    /// Payload cannot be framed
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
}
