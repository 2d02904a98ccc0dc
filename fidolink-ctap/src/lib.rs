//! CTAP message types for FIDO security key clients
//!
//! This crate provides the host side of the CTAP 2.x and CTAP1/U2F message
//! formats: request encoders, response parsers and status codes. It does no
//! I/O.
//!
//! Implements the FIDO2 specification:
//! <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html>

pub mod cbor;
pub mod commands;
pub mod error;
pub mod status;
pub mod types;
pub mod u2f;

// Re-export commonly used types
pub use commands::get_assertion::{
    read_ctap_get_assertion_response, AuthenticatorGetAssertionResponse, CtapGetAssertionRequest,
};
pub use commands::get_info::{
    read_ctap_get_info_response, AuthenticatorGetInfoResponse, CtapGetInfoRequest,
};
pub use commands::make_credential::{
    read_ctap_make_credential_response, AuthenticatorMakeCredentialResponse,
    CtapMakeCredentialRequest,
};
pub use commands::{CtapCommand, CtapRequest};
pub use error::{Error, Result};
pub use status::StatusCode;
pub use types::{
    ClientDataHash, CoseAlgorithm, CredentialType, ProtocolVersion, PublicKeyCredentialDescriptor,
    RelyingParty, User, UserVerificationRequirement,
};
