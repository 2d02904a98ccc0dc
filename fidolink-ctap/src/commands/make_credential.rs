//! authenticatorMakeCredential command
//!
//! Creates a new credential. Clients also send a throwaway MakeCredential to
//! make an authenticator wait for a touch.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#authenticatorMakeCredential>

use ciborium::Value;

use super::{CtapCommand, CtapRequest};
use crate::cbor::{MapBuilder, MapParser};
use crate::types::{
    ClientDataHash, CoseAlgorithm, PublicKeyCredentialDescriptor, RelyingParty, User,
    UserVerificationRequirement,
};

/// MakeCredential request keys
mod keys {
    pub const CLIENT_DATA_HASH: i32 = 0x01;
    pub const RP: i32 = 0x02;
    pub const USER: i32 = 0x03;
    pub const PUB_KEY_CRED_PARAMS: i32 = 0x04;
    pub const EXCLUDE_LIST: i32 = 0x05;
    pub const OPTIONS: i32 = 0x07;
}

/// MakeCredential response keys
mod response_keys {
    pub const FMT: i32 = 0x01;
    pub const AUTH_DATA: i32 = 0x02;
    pub const ATT_STMT: i32 = 0x03;
}

/// Relying party id of the touch-collection request
pub const DUMMY_RP_ID: &str = ".dummy";

/// Request parameters for authenticatorMakeCredential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtapMakeCredentialRequest {
    client_data_hash: ClientDataHash,
    rp: RelyingParty,
    user: User,
    pub_key_cred_params: Vec<CoseAlgorithm>,
    exclude_list: Vec<PublicKeyCredentialDescriptor>,
    resident_key: bool,
    user_verification: UserVerificationRequirement,
}

impl CtapMakeCredentialRequest {
    /// Create a request for an ES256 credential
    pub fn new(client_data_hash: ClientDataHash, rp: RelyingParty, user: User) -> Self {
        Self {
            client_data_hash,
            rp,
            user,
            pub_key_cred_params: vec![CoseAlgorithm::ES256],
            exclude_list: Vec::new(),
            resident_key: false,
            user_verification: UserVerificationRequirement::Discouraged,
        }
    }

    /// A request whose only purpose is to block until the user touches the
    /// authenticator. Its result is always discarded.
    pub fn touch_request() -> Self {
        Self::new(
            ClientDataHash::default(),
            RelyingParty::new(DUMMY_RP_ID),
            User::new(vec![1]).with_name("dummy"),
        )
    }

    pub fn with_algorithms(mut self, algorithms: Vec<CoseAlgorithm>) -> Self {
        self.pub_key_cred_params = algorithms;
        self
    }

    pub fn with_exclude_list(mut self, exclude_list: Vec<PublicKeyCredentialDescriptor>) -> Self {
        self.exclude_list = exclude_list;
        self
    }

    pub fn with_resident_key(mut self, resident_key: bool) -> Self {
        self.resident_key = resident_key;
        self
    }

    pub fn with_user_verification(mut self, uv: UserVerificationRequirement) -> Self {
        self.user_verification = uv;
        self
    }

    pub fn client_data_hash(&self) -> &ClientDataHash {
        &self.client_data_hash
    }

    pub fn rp(&self) -> &RelyingParty {
        &self.rp
    }

    pub fn user(&self) -> &User {
        &self.user
    }
}

impl CtapRequest for CtapMakeCredentialRequest {
    fn encode_as_cbor(&self) -> (CtapCommand, Option<Value>) {
        let params = self.pub_key_cred_params.iter().map(|a| a.to_cbor()).collect();
        let mut builder = MapBuilder::new()
            .insert_bytes(keys::CLIENT_DATA_HASH, self.client_data_hash.as_ref())
            .insert_value(keys::RP, self.rp.to_cbor())
            .insert_value(keys::USER, self.user.to_cbor())
            .insert_value(keys::PUB_KEY_CRED_PARAMS, Value::Array(params));

        if !self.exclude_list.is_empty() {
            let list = self.exclude_list.iter().map(|d| d.to_cbor()).collect();
            builder = builder.insert_value(keys::EXCLUDE_LIST, Value::Array(list));
        }

        let mut options = Vec::new();
        if self.resident_key {
            options.push((Value::Text("rk".into()), Value::Bool(true)));
        }
        if self.user_verification == UserVerificationRequirement::Required {
            options.push((Value::Text("uv".into()), Value::Bool(true)));
        }
        if !options.is_empty() {
            builder = builder.insert_value(keys::OPTIONS, Value::Map(options));
        }

        (CtapCommand::MakeCredential, Some(builder.build_value()))
    }
}

/// Successful authenticatorMakeCredential response
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatorMakeCredentialResponse {
    pub fmt: String,
    pub auth_data: Vec<u8>,
    pub att_stmt: Value,
}

impl AuthenticatorMakeCredentialResponse {
    pub fn to_cbor(&self) -> Value {
        MapBuilder::new()
            .insert_value(response_keys::FMT, Value::Text(self.fmt.clone()))
            .insert_bytes(response_keys::AUTH_DATA, &self.auth_data)
            .insert_value(response_keys::ATT_STMT, self.att_stmt.clone())
            .build_value()
    }
}

/// Parse a MakeCredential response body. Returns `None` on any shape violation.
pub fn read_ctap_make_credential_response(
    value: Option<&Value>,
) -> Option<AuthenticatorMakeCredentialResponse> {
    let parser = MapParser::from_ref(value?).ok()?;

    let att_stmt = parser.get_raw(response_keys::ATT_STMT)?;
    if !matches!(att_stmt, Value::Map(_)) {
        return None;
    }

    Some(AuthenticatorMakeCredentialResponse {
        fmt: parser.get(response_keys::FMT).ok()?,
        auth_data: parser.get_bytes(response_keys::AUTH_DATA).ok()?,
        att_stmt: att_stmt.clone(),
    })
}
