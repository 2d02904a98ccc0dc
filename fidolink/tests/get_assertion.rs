//! GetAssertion ceremonies against a virtual authenticator
//!
//! Every request goes through CTAPHID framing, the `HidDevice` state machine
//! and the blocking driver, so these tests cover the whole stack.

mod common;

use common::{plain_key, Recorded, VirtualAuthenticator, RP_ID};
use fidolink::ctap::u2f::application_parameter;
use fidolink::ctap::{
    ClientDataHash, CtapGetAssertionRequest, ProtocolVersion, PublicKeyCredentialDescriptor,
    StatusCode,
};
use fidolink::transport::{FidoDevice, State, VidPid};
use fidolink::{discover_protocol, get_assertion, Error, ForceU2fList};

const ALT_APP_PARAM: [u8; 32] = [0xA1; 32];

fn request(ids: &[&[u8]]) -> CtapGetAssertionRequest {
    CtapGetAssertionRequest::new(RP_ID, ClientDataHash::new([0x42; 32])).with_allow_list(
        ids.iter()
            .map(|id| PublicKeyCredentialDescriptor::new(id.to_vec()))
            .collect(),
    )
}

fn probe(id: &[u8]) -> Recorded {
    Recorded::GetAssertion {
        allow_list: vec![id.to_vec()],
        silent: true,
    }
}

fn real(id: &[u8]) -> Recorded {
    Recorded::GetAssertion {
        allow_list: vec![id.to_vec()],
        silent: false,
    }
}

fn dummy_touch() -> Recorded {
    Recorded::MakeCredential {
        rp_id: ".dummy".into(),
    }
}

#[test]
fn test_single_credential_direct() {
    common::init_logging();
    let mut driver = VirtualAuthenticator::ctap2(&[b"cred-1"]).into_driver(plain_key());

    let assertion = get_assertion(&mut driver, request(&[b"cred-1"]), ForceU2fList::default()).unwrap();
    assert_eq!(assertion.credential.unwrap().id, b"cred-1".to_vec());
    assert_eq!(assertion.auth_data[32] & 0x01, 0x01);
    assert_eq!(driver.device().supported_protocol(), ProtocolVersion::Ctap2);
    assert_eq!(
        driver.connection().requests,
        vec![Recorded::GetInfo, real(b"cred-1")]
    );
}

#[test]
fn test_silent_probe_finds_last_credential() {
    let mut driver = VirtualAuthenticator::ctap2(&[b"C"]).into_driver(plain_key());

    let assertion =
        get_assertion(&mut driver, request(&[b"A", b"B", b"C"]), ForceU2fList::default()).unwrap();
    assert_eq!(assertion.credential.unwrap().id, b"C".to_vec());
    assert_eq!(
        driver.connection().requests,
        vec![Recorded::GetInfo, probe(b"A"), probe(b"B"), probe(b"C"), real(b"C")]
    );
}

#[test]
fn test_no_match_without_fallback_collects_touch() {
    let mut driver = VirtualAuthenticator::ctap2(&[b"other"]).into_driver(plain_key());

    let result = get_assertion(&mut driver, request(&[b"A", b"B"]), ForceU2fList::default());
    assert_eq!(result, Err(Error::Ctap(StatusCode::NoCredentials)));
    assert_eq!(
        driver.connection().requests,
        vec![Recorded::GetInfo, probe(b"A"), probe(b"B"), dummy_touch()]
    );
}

#[test]
fn test_direct_invalid_credential_reports_no_credentials() {
    let mut authenticator = VirtualAuthenticator::ctap2(&[]);
    authenticator.invalid_credential_direct = true;
    let mut driver = authenticator.into_driver(plain_key());

    let result = get_assertion(&mut driver, request(&[b"A"]), ForceU2fList::default());
    assert_eq!(result, Err(Error::Ctap(StatusCode::NoCredentials)));
    assert_eq!(
        driver.connection().requests,
        vec![Recorded::GetInfo, real(b"A"), dummy_touch()]
    );
}

#[test]
fn test_fallback_to_u2f_with_alternative_app_param() {
    let mut authenticator = VirtualAuthenticator::ctap2(&[]);
    authenticator.versions = vec!["U2F_V2".into(), "FIDO_2_0".into()];
    authenticator.u2f_key_handles = vec![(b"legacy".to_vec(), ALT_APP_PARAM)];
    let mut driver = authenticator.into_driver(plain_key());

    let request = request(&[b"legacy"]).with_alternative_application_parameter(ALT_APP_PARAM);
    let assertion = get_assertion(&mut driver, request, ForceU2fList::default()).unwrap();

    assert_eq!(&assertion.auth_data[..32], &ALT_APP_PARAM);
    assert_eq!(assertion.signature, vec![0x30, 0x45, 0x02]);
    assert_eq!(driver.device().supported_protocol(), ProtocolVersion::U2f);
    assert_eq!(
        driver.connection().requests,
        vec![
            Recorded::GetInfo,
            probe(b"legacy"),
            Recorded::U2fSign {
                key_handle: b"legacy".to_vec(),
                app_param: application_parameter(RP_ID),
            },
            Recorded::U2fSign {
                key_handle: b"legacy".to_vec(),
                app_param: ALT_APP_PARAM,
            },
        ]
    );
}

#[test]
fn test_forced_u2f_device_skips_get_info() {
    let u2f_zero = VidPid::new(0x10c4, 0x8acf);
    let mut authenticator =
        VirtualAuthenticator::u2f_only(&[(b"kh", application_parameter(RP_ID))]);
    // it would claim CTAP2 if asked
    authenticator.versions = vec!["FIDO_2_0".into()];
    authenticator.presence_retries = 2;
    let mut driver = authenticator.into_driver(u2f_zero);

    let assertion = get_assertion(&mut driver, request(&[b"kh"]), ForceU2fList::default()).unwrap();
    assert_eq!(assertion.credential.unwrap().id, b"kh".to_vec());
    assert!(!driver.connection().requests.contains(&Recorded::GetInfo));
}

#[test]
fn test_u2f_device_without_match_registers() {
    let mut driver = VirtualAuthenticator::u2f_only(&[]).into_driver(plain_key());

    assert_eq!(
        discover_protocol(&mut driver, ForceU2fList::empty()).unwrap(),
        ProtocolVersion::U2f
    );
    let result = get_assertion(&mut driver, request(&[b"x", b"y"]), ForceU2fList::empty());
    assert_eq!(result, Err(Error::Ctap(StatusCode::NoCredentials)));
    assert_eq!(driver.connection().requests.last(), Some(&Recorded::U2fRegister));
}

#[test]
fn test_keepalives_and_foreign_traffic() {
    let mut authenticator = VirtualAuthenticator::ctap2(&[b"cred"]);
    authenticator.keepalives = 3;
    authenticator.foreign_traffic = true;
    authenticator.foreign_init_reply = true;
    let mut driver = authenticator.into_driver(plain_key());

    let assertion = get_assertion(&mut driver, request(&[b"cred"]), ForceU2fList::default()).unwrap();
    assert_eq!(assertion.credential.unwrap().id, b"cred".to_vec());
    assert_eq!(driver.device().channel_id(), Some(common::CHANNEL));
}

#[test]
fn test_long_credential_ids_span_packets() {
    let ids: Vec<Vec<u8>> = (0..3u8).map(|i| vec![i; 96]).collect();
    let id_refs: Vec<&[u8]> = ids.iter().map(|id| id.as_slice()).collect();
    let mut driver = VirtualAuthenticator::ctap2(&[&ids[1]]).into_driver(plain_key());

    let assertion = get_assertion(&mut driver, request(&id_refs), ForceU2fList::default()).unwrap();
    assert_eq!(assertion.credential.unwrap().id, ids[1]);
    assert_eq!(driver.connection().requests.len(), 4);
}

#[test]
fn test_undecodable_assertion_is_invalid_cbor() {
    let mut authenticator = VirtualAuthenticator::ctap2(&[b"cred"]);
    authenticator.assertion_override = Some(vec![0x00, 0xA1, 0x01]);
    let mut driver = authenticator.into_driver(plain_key());

    let result = get_assertion(&mut driver, request(&[b"cred"]), ForceU2fList::default());
    assert_eq!(result, Err(Error::Ctap(StatusCode::InvalidCbor)));
}

#[test]
fn test_hid_error_fails_device() {
    let mut authenticator = VirtualAuthenticator::ctap2(&[b"cred"]);
    // CHANNEL_BUSY
    authenticator.hid_error = Some(0x06);
    let mut driver = authenticator.into_driver(plain_key());

    let result = get_assertion(&mut driver, request(&[b"cred"]), ForceU2fList::default());
    assert_eq!(result, Err(Error::Ctap(StatusCode::Other)));
    assert_eq!(driver.device().state(), State::DeviceError);
}

#[test]
fn test_hid_message_error() {
    let mut authenticator = VirtualAuthenticator::ctap2(&[b"cred"]);
    // INVALID_LEN
    authenticator.hid_error = Some(0x03);
    let mut driver = authenticator.into_driver(plain_key());

    assert_eq!(
        discover_protocol(&mut driver, ForceU2fList::default()).unwrap(),
        ProtocolVersion::U2f
    );
    assert_eq!(driver.device().state(), State::MsgError);
}
