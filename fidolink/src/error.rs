//! Error types for the client

use fidolink_ctap::StatusCode;
use thiserror::Error;

/// Client errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Transport setup or I/O failed
    #[error("transport error: {0}")]
    Transport(#[from] fidolink_transport::Error),

    /// The authenticator answered with a CTAP2 error status
    #[error("authenticator returned {0}")]
    Ctap(StatusCode),

    /// A task is waiting for a response but the device has nothing in flight
    #[error("task stalled with no transaction in flight")]
    Stalled,

    /// A request the ceremony cannot run
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),

    /// No FIDO device is connected
    #[error("no FIDO devices found")]
    NoDevices,
}

impl From<StatusCode> for Error {
    fn from(status: StatusCode) -> Self {
        Error::Ctap(status)
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;
