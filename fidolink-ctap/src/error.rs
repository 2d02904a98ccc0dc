//! Error types for message construction

use thiserror::Error;

/// Errors raised while building CTAP1 messages
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// APDU payloads are limited to 65535 bytes
    #[error("APDU payload too large: {0} bytes")]
    ApduTooLarge(usize),

    /// U2F key handles carry a one-byte length prefix
    #[error("key handle too long: {0} bytes")]
    KeyHandleTooLong(usize),
}

/// Result type alias for message construction
pub type Result<T> = std::result::Result<T, Error>;
