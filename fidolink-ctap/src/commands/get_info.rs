//! authenticatorGetInfo command
//!
//! Returns information about the authenticator including:
//! - Supported versions
//! - AAGUID
//! - Options (rk, up, uv, etc.)
//! - PIN/UV protocols
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#authenticatorGetInfo>

use std::collections::BTreeMap;

use ciborium::Value;

use super::{CtapCommand, CtapRequest};
use crate::cbor::{MapBuilder, MapParser};
use crate::types::ProtocolVersion;

/// GetInfo response keys
mod keys {
    pub const VERSIONS: i32 = 0x01;
    pub const EXTENSIONS: i32 = 0x02;
    pub const AAGUID: i32 = 0x03;
    pub const OPTIONS: i32 = 0x04;
    pub const MAX_MSG_SIZE: i32 = 0x05;
    pub const PIN_UV_AUTH_PROTOCOLS: i32 = 0x06;
}

/// authenticatorGetInfo takes no parameters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CtapGetInfoRequest;

impl CtapRequest for CtapGetInfoRequest {
    fn encode_as_cbor(&self) -> (CtapCommand, Option<Value>) {
        (CtapCommand::GetInfo, None)
    }
}

/// Authenticator capabilities reported by GetInfo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorGetInfoResponse {
    pub versions: Vec<String>,
    pub extensions: Vec<String>,
    pub aaguid: [u8; 16],
    pub options: BTreeMap<String, bool>,
    pub max_msg_size: Option<u64>,
    pub pin_uv_auth_protocols: Vec<u64>,
}

impl AuthenticatorGetInfoResponse {
    pub fn new(versions: Vec<String>, aaguid: [u8; 16]) -> Self {
        Self {
            versions,
            extensions: Vec::new(),
            aaguid,
            options: BTreeMap::new(),
            max_msg_size: None,
            pin_uv_auth_protocols: Vec::new(),
        }
    }

    /// Whether any advertised version string belongs to `protocol`
    pub fn supports(&self, protocol: ProtocolVersion) -> bool {
        self.versions
            .iter()
            .any(|v| ProtocolVersion::from_version_str(v) == protocol)
    }

    pub fn option(&self, name: &str) -> Option<bool> {
        self.options.get(name).copied()
    }

    pub fn to_cbor(&self) -> Value {
        let text_array =
            |items: &[String]| Value::Array(items.iter().map(|s| Value::Text(s.clone())).collect());

        let mut builder = MapBuilder::new().insert_value(keys::VERSIONS, text_array(&self.versions));
        if !self.extensions.is_empty() {
            builder = builder.insert_value(keys::EXTENSIONS, text_array(&self.extensions));
        }
        builder = builder.insert_bytes(keys::AAGUID, &self.aaguid);
        if !self.options.is_empty() {
            let options = self
                .options
                .iter()
                .map(|(k, v)| (Value::Text(k.clone()), Value::Bool(*v)))
                .collect();
            builder = builder.insert_value(keys::OPTIONS, Value::Map(options));
        }
        if let Some(size) = self.max_msg_size {
            builder = builder.insert_value(keys::MAX_MSG_SIZE, Value::Integer(size.into()));
        }
        if !self.pin_uv_auth_protocols.is_empty() {
            let protocols = self
                .pin_uv_auth_protocols
                .iter()
                .map(|&p| Value::Integer(p.into()))
                .collect();
            builder = builder.insert_value(keys::PIN_UV_AUTH_PROTOCOLS, Value::Array(protocols));
        }
        builder.build_value()
    }
}

/// Parse a GetInfo response body. Returns `None` on any shape violation.
pub fn read_ctap_get_info_response(value: Option<&Value>) -> Option<AuthenticatorGetInfoResponse> {
    let parser = MapParser::from_ref(value?).ok()?;

    let versions: Vec<String> = parser.get(keys::VERSIONS).ok()?;
    if versions.is_empty() {
        return None;
    }
    let aaguid: [u8; 16] = parser.get_bytes(keys::AAGUID).ok()?.try_into().ok()?;

    Some(AuthenticatorGetInfoResponse {
        versions,
        extensions: parser.get_opt(keys::EXTENSIONS).ok()?.unwrap_or_default(),
        aaguid,
        options: parser.get_opt(keys::OPTIONS).ok()?.unwrap_or_default(),
        max_msg_size: parser.get_opt(keys::MAX_MSG_SIZE).ok()?,
        pin_uv_auth_protocols: parser
            .get_opt(keys::PIN_UV_AUTH_PROTOCOLS)
            .ok()?
            .unwrap_or_default(),
    })
}
