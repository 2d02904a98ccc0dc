//! Error types for the HID transport

use thiserror::Error;

/// Transport errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Output report size outside `(7, 64]`
    #[error("invalid HID report size: {0}")]
    InvalidReportSize(usize),

    /// Payload does not fit into one init packet and 128 continuations
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Malformed packet
    #[error("invalid packet")]
    InvalidPacket,

    /// Continuation packet for another channel
    #[error("packet for channel {actual:#010x}, expected {expected:#010x}")]
    InvalidChannel { expected: u32, actual: u32 },

    /// Continuation packet out of order
    #[error("unexpected sequence number {actual}, expected {expected}")]
    InvalidSequence { expected: u8, actual: u8 },

    /// Continuation packet after the message was already complete
    #[error("message already complete")]
    MessageComplete,

    /// Underlying device I/O failed
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;
