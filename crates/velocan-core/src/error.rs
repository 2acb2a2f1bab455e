//! Error types for frame construction and parsing

use thiserror::Error;

/// Result type for frame operations
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors that can occur while building or parsing frames
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// More than 8 data bytes in a single CAN frame
    #[error("frame data too long: {0} bytes (max 8)")]
    DataTooLong(usize),

    /// Packet payload does not fit the multi-frame length byte
    #[error("packet payload too long: {0} bytes (max 255)")]
    PayloadTooLong(usize),

    /// Node id not known on this bus
    #[error("unknown node id: 0x{0:02X}")]
    UnknownNode(u8),

    /// Operation code outside 0..=7
    #[error("unknown operation code: {0}")]
    UnknownOperation(u8),

    /// Identifier does not fit in 29 bits
    #[error("identifier 0x{0:08X} exceeds 29 bits")]
    InvalidIdentifier(u32),

    /// Device name could not be parsed
    #[error("unknown device: {0}")]
    UnknownDevice(String),
}
