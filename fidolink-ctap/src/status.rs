//! CTAP2 status codes
//!
//! Every response from a CTAP2 authenticator starts with one status byte.
//! Every device operation reports one of these codes.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#error-responses>

use thiserror::Error;

/// CTAP2 response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[repr(u8)]
pub enum StatusCode {
    #[error("success")]
    Success = 0x00,
    #[error("invalid command")]
    InvalidCommand = 0x01,
    #[error("invalid parameter")]
    InvalidParameter = 0x02,
    #[error("invalid length")]
    InvalidLength = 0x03,
    #[error("invalid message sequencing")]
    InvalidSeq = 0x04,
    #[error("message timed out")]
    Timeout = 0x05,
    #[error("channel busy")]
    ChannelBusy = 0x06,
    #[error("command requires channel lock")]
    LockRequired = 0x0A,
    #[error("invalid channel")]
    InvalidChannel = 0x0B,
    #[error("unexpected CBOR type")]
    CborUnexpectedType = 0x11,
    #[error("invalid CBOR")]
    InvalidCbor = 0x12,
    #[error("missing parameter")]
    MissingParameter = 0x14,
    #[error("limit exceeded")]
    LimitExceeded = 0x15,
    #[error("unsupported extension")]
    UnsupportedExtension = 0x16,
    #[error("credential excluded")]
    CredentialExcluded = 0x19,
    #[error("processing")]
    Processing = 0x21,
    #[error("invalid credential")]
    InvalidCredential = 0x22,
    #[error("user action pending")]
    UserActionPending = 0x23,
    #[error("operation pending")]
    OperationPending = 0x24,
    #[error("no operations")]
    NoOperations = 0x25,
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm = 0x26,
    #[error("operation denied")]
    OperationDenied = 0x27,
    #[error("key store full")]
    KeyStoreFull = 0x28,
    #[error("no operation pending")]
    NoOperationPending = 0x2A,
    #[error("unsupported option")]
    UnsupportedOption = 0x2B,
    #[error("invalid option")]
    InvalidOption = 0x2C,
    #[error("cancelled by keep-alive cancel")]
    KeepAliveCancel = 0x2D,
    #[error("no credentials")]
    NoCredentials = 0x2E,
    #[error("user action timeout")]
    UserActionTimeout = 0x2F,
    #[error("not allowed")]
    NotAllowed = 0x30,
    #[error("PIN invalid")]
    PinInvalid = 0x31,
    #[error("PIN blocked")]
    PinBlocked = 0x32,
    #[error("PIN auth invalid")]
    PinAuthInvalid = 0x33,
    #[error("PIN auth blocked")]
    PinAuthBlocked = 0x34,
    #[error("PIN not set")]
    PinNotSet = 0x35,
    #[error("PIN required")]
    PinRequired = 0x36,
    #[error("PIN policy violation")]
    PinPolicyViolation = 0x37,
    #[error("PIN token expired")]
    PinTokenExpired = 0x38,
    #[error("request too large")]
    RequestTooLarge = 0x39,
    #[error("action timeout")]
    ActionTimeout = 0x3A,
    #[error("user presence required")]
    UpRequired = 0x3B,
    #[error("user verification blocked")]
    UvBlocked = 0x3C,
    #[error("unspecified error")]
    Other = 0x7F,
}

impl StatusCode {
    /// Map a raw status byte. Unknown values yield `None`.
    pub fn from_u8(value: u8) -> Option<Self> {
        use StatusCode::*;

        let code = match value {
            0x00 => Success,
            0x01 => InvalidCommand,
            0x02 => InvalidParameter,
            0x03 => InvalidLength,
            0x04 => InvalidSeq,
            0x05 => Timeout,
            0x06 => ChannelBusy,
            0x0A => LockRequired,
            0x0B => InvalidChannel,
            0x11 => CborUnexpectedType,
            0x12 => InvalidCbor,
            0x14 => MissingParameter,
            0x15 => LimitExceeded,
            0x16 => UnsupportedExtension,
            0x19 => CredentialExcluded,
            0x21 => Processing,
            0x22 => InvalidCredential,
            0x23 => UserActionPending,
            0x24 => OperationPending,
            0x25 => NoOperations,
            0x26 => UnsupportedAlgorithm,
            0x27 => OperationDenied,
            0x28 => KeyStoreFull,
            0x2A => NoOperationPending,
            0x2B => UnsupportedOption,
            0x2C => InvalidOption,
            0x2D => KeepAliveCancel,
            0x2E => NoCredentials,
            0x2F => UserActionTimeout,
            0x30 => NotAllowed,
            0x31 => PinInvalid,
            0x32 => PinBlocked,
            0x33 => PinAuthInvalid,
            0x34 => PinAuthBlocked,
            0x35 => PinNotSet,
            0x36 => PinRequired,
            0x37 => PinPolicyViolation,
            0x38 => PinTokenExpired,
            0x39 => RequestTooLarge,
            0x3A => ActionTimeout,
            0x3B => UpRequired,
            0x3C => UvBlocked,
            0x7F => Other,
            _ => return None,
        };
        Some(code)
    }

    /// Status carried by the first byte of a device response.
    ///
    /// An empty buffer and an unrecognised status byte both read as
    /// `InvalidCbor`.
    pub fn from_response(response: &[u8]) -> Self {
        response
            .first()
            .and_then(|&b| Self::from_u8(b))
            .unwrap_or(StatusCode::InvalidCbor)
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> u8 {
        code.to_u8()
    }
}

/// Result type for CTAP message handling
pub type Result<T> = std::result::Result<T, StatusCode>;
