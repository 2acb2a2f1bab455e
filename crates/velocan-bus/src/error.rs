//! Bus errors

use serde::Serialize;
use thiserror::Error;
use velocan_conv::{EncodeError, ParameterGroup};
use velocan_core::DeviceTarget;

use crate::transport::TransportError;

/// Top-level error for the consumer-facing API
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors from starting or awaiting a session
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    /// A bulk operation is already running on this device
    #[error("{0}: an operation is already in progress")]
    AlreadyInProgress(DeviceTarget),

    /// The operation was abandoned before it finished
    #[error("operation cancelled")]
    Cancelled,

    #[error("{group} is not writable on {target}")]
    NotWritable {
        target: DeviceTarget,
        group: ParameterGroup,
    },

    #[error("{target} has no parameter {group}")]
    UnknownParameter {
        target: DeviceTarget,
        group: ParameterGroup,
    },
}

/// Why a single request within a session failed
#[derive(Debug, Error, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RequestFailure {
    /// No reply after all attempts
    #[error("no response after {attempts} attempts")]
    Timeout { attempts: u32 },

    /// Device answered with an error acknowledgement
    #[error("negative acknowledgement")]
    NegativeAcknowledge,

    /// Transport kept failing until the retry bound was reached
    #[error("transport error: {0}")]
    Transport(String),

    /// Value could not be encoded for writing
    #[error("encode error: {0}")]
    Encode(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
