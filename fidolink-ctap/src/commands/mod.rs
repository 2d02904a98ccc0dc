//! CTAP2 authenticator commands
//!
//! Each submodule holds the request encoder and the response parser for one
//! command.

pub mod get_assertion;
pub mod get_info;
pub mod make_credential;

use ciborium::Value;

/// CTAP2 command codes, sent as the first byte of a CBOR request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CtapCommand {
    /// MakeCredential (0x01) - Create a new credential
    MakeCredential = 0x01,
    /// GetAssertion (0x02) - Generate an authentication assertion
    GetAssertion = 0x02,
    /// GetInfo (0x04) - Get authenticator information
    GetInfo = 0x04,
}

impl CtapCommand {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `None` if the byte doesn't correspond to a known command.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::MakeCredential),
            0x02 => Some(Self::GetAssertion),
            0x04 => Some(Self::GetInfo),
            _ => None,
        }
    }
}

impl From<CtapCommand> for u8 {
    fn from(cmd: CtapCommand) -> Self {
        cmd.as_u8()
    }
}

impl std::fmt::Display for CtapCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MakeCredential => write!(f, "MakeCredential(0x01)"),
            Self::GetAssertion => write!(f, "GetAssertion(0x02)"),
            Self::GetInfo => write!(f, "GetInfo(0x04)"),
        }
    }
}

/// A typed CTAP2 request.
///
/// Produces the command byte and the optional CBOR parameter map that make up
/// the request envelope.
pub trait CtapRequest {
    fn encode_as_cbor(&self) -> (CtapCommand, Option<Value>);
}
