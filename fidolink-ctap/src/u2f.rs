//! CTAP1/U2F raw messages
//!
//! Requests are extended-length ISO 7816-4 command APDUs; responses are the
//! response data followed by a two-byte status word.
//!
//! Spec: <https://fidoalliance.org/specs/fido-u2f-v1.2-ps-20170411/fido-u2f-raw-message-formats-v1.2-ps-20170411.html>

use sha2::{Digest, Sha256};

use crate::commands::get_assertion::AuthenticatorGetAssertionResponse;
use crate::error::{Error, Result};
use crate::types::PublicKeyCredentialDescriptor;

/// U2F_REGISTER instruction
pub const INS_REGISTER: u8 = 0x01;
/// U2F_AUTHENTICATE instruction
pub const INS_AUTHENTICATE: u8 = 0x02;

/// Authenticate control byte: enforce user presence and sign
pub const P1_ENFORCE_USER_PRESENCE: u8 = 0x03;

/// Header size of an extended APDU: CLA INS P1 P2 and three length bytes
const APDU_HEADER_SIZE: usize = 7;

/// Application parameter used for the throwaway registration
pub const BOGUS_APP_PARAM: [u8; 32] = [0x41; 32];
/// Challenge used for the throwaway registration
pub const BOGUS_CHALLENGE: [u8; 32] = [0x42; 32];

/// User-presence flag in authenticator data
const FLAG_USER_PRESENT: u8 = 0x01;

/// A CTAP1 command APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    pub ins: u8,
    pub p1: u8,
    pub data: Vec<u8>,
}

impl CommandApdu {
    pub fn new(ins: u8, p1: u8, data: Vec<u8>) -> Self {
        Self { ins, p1, data }
    }

    /// Serialize as an extended-length APDU with Ne = 65536.
    ///
    /// CLA and P2 are always zero. With no data, Lc is omitted and the
    /// three-byte Le closes the header.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if self.data.len() > 0xffff {
            return Err(Error::ApduTooLarge(self.data.len()));
        }

        let data_size = if self.data.is_empty() {
            0
        } else {
            2 + self.data.len()
        };
        let mut bytes = vec![0u8; APDU_HEADER_SIZE + data_size];
        bytes[1] = self.ins;
        bytes[2] = self.p1;
        if !self.data.is_empty() {
            bytes[5..7].copy_from_slice(&(self.data.len() as u16).to_be_bytes());
            bytes[7..7 + self.data.len()].copy_from_slice(&self.data);
        }
        Ok(bytes)
    }
}

/// Application parameter for a relying party id
pub fn application_parameter(rp_id: &str) -> [u8; 32] {
    Sha256::digest(rp_id.as_bytes()).into()
}

/// U2F_REGISTER: `challenge || application`
pub fn register_apdu(challenge: &[u8; 32], app_param: &[u8; 32]) -> CommandApdu {
    let mut data = Vec::with_capacity(64);
    data.extend_from_slice(challenge);
    data.extend_from_slice(app_param);
    CommandApdu::new(INS_REGISTER, 0, data)
}

/// Registration sent only to wait for a touch
pub fn bogus_register_apdu() -> CommandApdu {
    register_apdu(&BOGUS_CHALLENGE, &BOGUS_APP_PARAM)
}

/// U2F_AUTHENTICATE: `challenge || application || L || key handle`
pub fn sign_apdu(
    challenge: &[u8; 32],
    app_param: &[u8; 32],
    key_handle: &[u8],
) -> Result<CommandApdu> {
    let handle_len =
        u8::try_from(key_handle.len()).map_err(|_| Error::KeyHandleTooLong(key_handle.len()))?;

    let mut data = Vec::with_capacity(65 + key_handle.len());
    data.extend_from_slice(challenge);
    data.extend_from_slice(app_param);
    data.push(handle_len);
    data.extend_from_slice(key_handle);
    Ok(CommandApdu::new(INS_AUTHENTICATE, P1_ENFORCE_USER_PRESENCE, data))
}

/// ISO 7816 status words used by U2F
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWord {
    NoError,
    /// Test of user presence required
    ConditionsNotSatisfied,
    /// Bad key handle
    WrongData,
    WrongLength,
    ClaNotSupported,
    InsNotSupported,
    Other(u16),
}

impl From<u16> for StatusWord {
    fn from(sw: u16) -> Self {
        match sw {
            0x9000 => StatusWord::NoError,
            0x6985 => StatusWord::ConditionsNotSatisfied,
            0x6A80 => StatusWord::WrongData,
            0x6700 => StatusWord::WrongLength,
            0x6E00 => StatusWord::ClaNotSupported,
            0x6D00 => StatusWord::InsNotSupported,
            other => StatusWord::Other(other),
        }
    }
}

/// A CTAP1 response APDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApduResponse {
    pub data: Vec<u8>,
    pub status: StatusWord,
}

impl ApduResponse {
    /// `None` if the buffer cannot hold a status word
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let split = bytes.len().checked_sub(2)?;
        let (data, sw) = bytes.split_at(split);
        Some(Self {
            data: data.to_vec(),
            status: u16::from_be_bytes([sw[0], sw[1]]).into(),
        })
    }
}

/// Convert U2F authenticate response data (`presence || counter || signature`)
/// into a CTAP2-shaped assertion.
///
/// The resulting authenticator data is `app_param || flags || counter`.
pub fn sign_response_to_assertion(
    app_param: &[u8; 32],
    key_handle: &[u8],
    data: &[u8],
) -> Option<AuthenticatorGetAssertionResponse> {
    if data.len() < 6 {
        return None;
    }
    let (presence, rest) = data.split_at(1);
    let (counter, signature) = rest.split_at(4);

    let mut auth_data = Vec::with_capacity(37);
    auth_data.extend_from_slice(app_param);
    auth_data.push(presence[0] & FLAG_USER_PRESENT);
    auth_data.extend_from_slice(counter);

    Some(
        AuthenticatorGetAssertionResponse::new(auth_data, signature.to_vec())
            .with_credential(PublicKeyCredentialDescriptor::new(key_handle.to_vec())),
    )
}
