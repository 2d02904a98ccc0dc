//! authenticatorGetAssertion command
//!
//! Authenticates a user with an existing credential.
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#authenticatorGetAssertion>

use ciborium::Value;

use super::{CtapCommand, CtapRequest};
use crate::cbor::{MapBuilder, MapParser};
use crate::types::{
    ClientDataHash, PublicKeyCredentialDescriptor, User, UserVerificationRequirement,
};

/// GetAssertion request keys
mod keys {
    pub const RP_ID: i32 = 0x01;
    pub const CLIENT_DATA_HASH: i32 = 0x02;
    pub const ALLOW_LIST: i32 = 0x03;
    pub const OPTIONS: i32 = 0x05;
}

/// GetAssertion response keys
mod response_keys {
    pub const CREDENTIAL: i32 = 0x01;
    pub const AUTH_DATA: i32 = 0x02;
    pub const SIGNATURE: i32 = 0x03;
    pub const USER: i32 = 0x04;
    pub const NUMBER_OF_CREDENTIALS: i32 = 0x05;
}

/// Request parameters for authenticatorGetAssertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CtapGetAssertionRequest {
    rp_id: String,
    client_data_hash: ClientDataHash,
    allow_list: Vec<PublicKeyCredentialDescriptor>,
    user_presence_required: bool,
    user_verification: UserVerificationRequirement,
    alternative_application_parameter: Option<[u8; 32]>,
}

impl CtapGetAssertionRequest {
    /// Create a request requiring user presence, with UV discouraged and an
    /// empty allow list
    pub fn new(rp_id: impl Into<String>, client_data_hash: ClientDataHash) -> Self {
        Self {
            rp_id: rp_id.into(),
            client_data_hash,
            allow_list: Vec::new(),
            user_presence_required: true,
            user_verification: UserVerificationRequirement::Discouraged,
            alternative_application_parameter: None,
        }
    }

    pub fn with_allow_list(mut self, allow_list: Vec<PublicKeyCredentialDescriptor>) -> Self {
        self.allow_list = allow_list;
        self
    }

    pub fn with_user_presence_required(mut self, required: bool) -> Self {
        self.user_presence_required = required;
        self
    }

    pub fn with_user_verification(mut self, uv: UserVerificationRequirement) -> Self {
        self.user_verification = uv;
        self
    }

    /// Application parameter to try when the U2F sign falls back to the
    /// `appid` extension
    pub fn with_alternative_application_parameter(mut self, app_param: [u8; 32]) -> Self {
        self.alternative_application_parameter = Some(app_param);
        self
    }

    pub fn rp_id(&self) -> &str {
        &self.rp_id
    }

    pub fn client_data_hash(&self) -> &ClientDataHash {
        &self.client_data_hash
    }

    pub fn allow_list(&self) -> &[PublicKeyCredentialDescriptor] {
        &self.allow_list
    }

    pub fn user_presence_required(&self) -> bool {
        self.user_presence_required
    }

    pub fn user_verification(&self) -> UserVerificationRequirement {
        self.user_verification
    }

    pub fn alternative_application_parameter(&self) -> Option<&[u8; 32]> {
        self.alternative_application_parameter.as_ref()
    }

    fn options(&self) -> Option<Value> {
        let mut options = Vec::new();
        if !self.user_presence_required {
            options.push((Value::Text("up".into()), Value::Bool(false)));
        }
        if self.user_verification == UserVerificationRequirement::Required {
            options.push((Value::Text("uv".into()), Value::Bool(true)));
        }
        if options.is_empty() {
            None
        } else {
            Some(Value::Map(options))
        }
    }
}

impl CtapRequest for CtapGetAssertionRequest {
    fn encode_as_cbor(&self) -> (CtapCommand, Option<Value>) {
        let mut builder = MapBuilder::new()
            .insert_value(keys::RP_ID, Value::Text(self.rp_id.clone()))
            .insert_bytes(keys::CLIENT_DATA_HASH, self.client_data_hash.as_ref());

        if !self.allow_list.is_empty() {
            let list = self.allow_list.iter().map(|d| d.to_cbor()).collect();
            builder = builder.insert_value(keys::ALLOW_LIST, Value::Array(list));
        }
        if let Some(options) = self.options() {
            builder = builder.insert_value(keys::OPTIONS, options);
        }

        (CtapCommand::GetAssertion, Some(builder.build_value()))
    }
}

/// Successful authenticatorGetAssertion response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorGetAssertionResponse {
    pub credential: Option<PublicKeyCredentialDescriptor>,
    pub auth_data: Vec<u8>,
    pub signature: Vec<u8>,
    pub user: Option<User>,
    pub number_of_credentials: Option<u64>,
}

impl AuthenticatorGetAssertionResponse {
    pub fn new(auth_data: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            credential: None,
            auth_data,
            signature,
            user: None,
            number_of_credentials: None,
        }
    }

    pub fn with_credential(mut self, credential: PublicKeyCredentialDescriptor) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn to_cbor(&self) -> Value {
        let mut builder = MapBuilder::new();
        if let Some(credential) = &self.credential {
            builder = builder.insert_value(response_keys::CREDENTIAL, credential.to_cbor());
        }
        builder = builder
            .insert_bytes(response_keys::AUTH_DATA, &self.auth_data)
            .insert_bytes(response_keys::SIGNATURE, &self.signature);
        if let Some(user) = &self.user {
            builder = builder.insert_value(response_keys::USER, user.to_cbor());
        }
        if let Some(n) = self.number_of_credentials {
            builder = builder.insert_value(response_keys::NUMBER_OF_CREDENTIALS, Value::Integer(n.into()));
        }
        builder.build_value()
    }
}

/// Parse a GetAssertion response body. Returns `None` on any shape violation.
pub fn read_ctap_get_assertion_response(
    value: Option<&Value>,
) -> Option<AuthenticatorGetAssertionResponse> {
    let parser = MapParser::from_ref(value?).ok()?;

    let credential = match parser.get_raw(response_keys::CREDENTIAL) {
        Some(v) => Some(PublicKeyCredentialDescriptor::from_cbor(v)?),
        None => None,
    };
    let user = match parser.get_raw(response_keys::USER) {
        Some(v) => Some(User::from_cbor(v)?),
        None => None,
    };

    Some(AuthenticatorGetAssertionResponse {
        credential,
        auth_data: parser.get_bytes(response_keys::AUTH_DATA).ok()?,
        signature: parser.get_bytes(response_keys::SIGNATURE).ok()?,
        user,
        number_of_credentials: parser.get_opt(response_keys::NUMBER_OF_CREDENTIALS).ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CtapGetAssertionRequest {
        CtapGetAssertionRequest::new("example.com", ClientDataHash::new([0x11; 32]))
    }

    #[test]
    fn test_minimal_request_encoding() {
        let (cmd, value) = request().encode_as_cbor();
        assert_eq!(cmd, CtapCommand::GetAssertion);

        let parser = MapParser::from_value(value.unwrap()).unwrap();
        let rp_id: String = parser.get(keys::RP_ID).unwrap();
        assert_eq!(rp_id, "example.com");
        assert_eq!(parser.get_bytes(keys::CLIENT_DATA_HASH).unwrap(), vec![0x11; 32]);
        assert!(!parser.contains_key(keys::ALLOW_LIST));
        assert!(!parser.contains_key(keys::OPTIONS));
    }

    #[test]
    fn test_silent_request_options() {
        let req = request()
            .with_allow_list(vec![PublicKeyCredentialDescriptor::new(vec![1])])
            .with_user_presence_required(false);
        let (_, value) = req.encode_as_cbor();
        let parser = MapParser::from_value(value.unwrap()).unwrap();

        let allow_list = parser.get_raw(keys::ALLOW_LIST).unwrap();
        assert!(matches!(allow_list, Value::Array(list) if list.len() == 1));

        let options = parser.get_raw(keys::OPTIONS).unwrap();
        assert_eq!(
            options,
            &Value::Map(vec![(Value::Text("up".into()), Value::Bool(false))])
        );
    }

    #[test]
    fn test_uv_required_option() {
        let req = request().with_user_verification(UserVerificationRequirement::Required);
        let (_, value) = req.encode_as_cbor();
        let parser = MapParser::from_value(value.unwrap()).unwrap();
        assert_eq!(
            parser.get_raw(keys::OPTIONS).unwrap(),
            &Value::Map(vec![(Value::Text("uv".into()), Value::Bool(true))])
        );
    }

    #[test]
    fn test_read_response() {
        let response = AuthenticatorGetAssertionResponse::new(vec![0xAA; 37], vec![0x30, 0x01])
            .with_credential(PublicKeyCredentialDescriptor::new(vec![9, 9]));
        let parsed = read_ctap_get_assertion_response(Some(&response.to_cbor())).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_read_response_rejects_bad_shape() {
        assert_eq!(read_ctap_get_assertion_response(None), None);

        // signature missing
        let value = MapBuilder::new()
            .insert_bytes(response_keys::AUTH_DATA, &[0; 37])
            .build_value();
        assert_eq!(read_ctap_get_assertion_response(Some(&value)), None);

        // authData as text
        let value = MapBuilder::new()
            .insert_value(response_keys::AUTH_DATA, Value::Text("x".into()))
            .insert_bytes(response_keys::SIGNATURE, &[1])
            .build_value();
        assert_eq!(read_ctap_get_assertion_response(Some(&value)), None);
    }
}
