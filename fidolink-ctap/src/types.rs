//! Common CTAP types shared by requests and responses

use ciborium::Value;

use crate::cbor::text_key;

/// Protocol family spoken by an authenticator
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Not yet discovered
    #[default]
    Unknown,
    /// CTAP2 (CBOR commands)
    Ctap2,
    /// CTAP1/U2F (ISO 7816 APDUs)
    U2f,
}

impl ProtocolVersion {
    /// Map a GetInfo version string to a protocol family
    pub fn from_version_str(version: &str) -> Self {
        match version {
            "U2F_V2" => ProtocolVersion::U2f,
            "FIDO_2_0" | "FIDO_2_1_PRE" | "FIDO_2_1" | "FIDO_2_2" => ProtocolVersion::Ctap2,
            _ => ProtocolVersion::Unknown,
        }
    }
}

/// A validated client data hash (always 32 bytes)
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ClientDataHash([u8; 32]);

impl ClientDataHash {
    pub fn new(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    /// Create a ClientDataHash from a slice, `None` unless it is 32 bytes long
    pub fn from_slice(slice: &[u8]) -> Option<Self> {
        let hash: [u8; 32] = slice.try_into().ok()?;
        Some(Self(hash))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for ClientDataHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for ClientDataHash {
    fn from(hash: [u8; 32]) -> Self {
        Self::new(hash)
    }
}

/// Type of credential
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialType {
    /// Public key credential (the only type currently defined in CTAP2)
    #[default]
    PublicKey,
}

impl CredentialType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::PublicKey => "public-key",
        }
    }
}

/// A credential descriptor identifying a specific credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyCredentialDescriptor {
    pub credential_type: CredentialType,
    pub id: Vec<u8>,
}

impl PublicKeyCredentialDescriptor {
    pub fn new(id: Vec<u8>) -> Self {
        Self {
            credential_type: CredentialType::PublicKey,
            id,
        }
    }

    pub fn to_cbor(&self) -> Value {
        Value::Map(vec![
            (
                Value::Text("type".into()),
                Value::Text(self.credential_type.as_str().into()),
            ),
            (Value::Text("id".into()), Value::Bytes(self.id.clone())),
        ])
    }

    /// Parse `{"type": "public-key", "id": bytes}`; other types are rejected.
    pub fn from_cbor(value: &Value) -> Option<Self> {
        match text_key(value, "type")? {
            Value::Text(t) if t == "public-key" => {}
            _ => return None,
        }
        match text_key(value, "id")? {
            Value::Bytes(id) => Some(Self::new(id.clone())),
            _ => None,
        }
    }
}

/// Relying party entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelyingParty {
    pub id: String,
    pub name: Option<String>,
}

impl RelyingParty {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }

    pub fn to_cbor(&self) -> Value {
        let mut map = vec![(Value::Text("id".into()), Value::Text(self.id.clone()))];
        if let Some(name) = &self.name {
            map.push((Value::Text("name".into()), Value::Text(name.clone())));
        }
        Value::Map(map)
    }
}

/// User entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Vec<u8>,
    pub name: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    pub fn new(id: Vec<u8>) -> Self {
        Self {
            id,
            name: None,
            display_name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn to_cbor(&self) -> Value {
        let mut map = vec![(Value::Text("id".into()), Value::Bytes(self.id.clone()))];
        if let Some(name) = &self.name {
            map.push((Value::Text("name".into()), Value::Text(name.clone())));
        }
        if let Some(display_name) = &self.display_name {
            map.push((
                Value::Text("displayName".into()),
                Value::Text(display_name.clone()),
            ));
        }
        Value::Map(map)
    }

    pub fn from_cbor(value: &Value) -> Option<Self> {
        let id = match text_key(value, "id")? {
            Value::Bytes(id) => id.clone(),
            _ => return None,
        };
        let text = |key: &str| -> Option<Option<String>> {
            match text_key(value, key) {
                None => Some(None),
                Some(Value::Text(t)) => Some(Some(t.clone())),
                Some(_) => None,
            }
        };
        Some(Self {
            id,
            name: text("name")?,
            display_name: text("displayName")?,
        })
    }
}

/// User verification requirement of a request.
///
/// CTAP2 only carries a boolean, so `Preferred` has to be resolved to
/// `Required` or `Discouraged` before a request is sent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum UserVerificationRequirement {
    Required,
    Preferred,
    #[default]
    Discouraged,
}

/// COSE algorithm identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum CoseAlgorithm {
    ES256 = -7,
    EdDSA = -8,
    RS256 = -257,
}

impl CoseAlgorithm {
    pub fn to_cbor(self) -> Value {
        Value::Map(vec![
            (Value::Text("type".into()), Value::Text("public-key".into())),
            (Value::Text("alg".into()), Value::Integer((self as i32).into())),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_version_strings() {
        assert_eq!(ProtocolVersion::from_version_str("U2F_V2"), ProtocolVersion::U2f);
        assert_eq!(
            ProtocolVersion::from_version_str("FIDO_2_0"),
            ProtocolVersion::Ctap2
        );
        assert_eq!(
            ProtocolVersion::from_version_str("FIDO_2_1"),
            ProtocolVersion::Ctap2
        );
        assert_eq!(
            ProtocolVersion::from_version_str("FIDO_3"),
            ProtocolVersion::Unknown
        );
    }

    #[test]
    fn test_client_data_hash_from_slice() {
        assert!(ClientDataHash::from_slice(&[0u8; 32]).is_some());
        assert!(ClientDataHash::from_slice(&[0u8; 31]).is_none());
    }

    #[test]
    fn test_descriptor_cbor() {
        let descriptor = PublicKeyCredentialDescriptor::new(vec![1, 2, 3]);
        let value = descriptor.to_cbor();
        assert_eq!(PublicKeyCredentialDescriptor::from_cbor(&value), Some(descriptor));

        let other = Value::Map(vec![
            (Value::Text("type".into()), Value::Text("password".into())),
            (Value::Text("id".into()), Value::Bytes(vec![1])),
        ]);
        assert_eq!(PublicKeyCredentialDescriptor::from_cbor(&other), None);
    }

    #[test]
    fn test_user_cbor() {
        let user = User::new(vec![7]).with_name("alice").with_display_name("Alice");
        assert_eq!(User::from_cbor(&user.to_cbor()), Some(user));

        let bad_name = Value::Map(vec![
            (Value::Text("id".into()), Value::Bytes(vec![7])),
            (Value::Text("name".into()), Value::Integer(3.into())),
        ]);
        assert_eq!(User::from_cbor(&bad_name), None);
    }
}
