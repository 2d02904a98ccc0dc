//! A scripted CTAPHID authenticator behind the `HidConnection` interface

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use ciborium::Value;
use fidolink::ctap::cbor::{self, MapParser};
use fidolink::ctap::{
    AuthenticatorGetAssertionResponse, AuthenticatorGetInfoResponse,
    AuthenticatorMakeCredentialResponse, CtapCommand, PublicKeyCredentialDescriptor, StatusCode,
};
use fidolink::transport::ctaphid::{Capabilities, Cmd, InitReply, Message, BROADCAST_CID};
use fidolink::transport::{
    HidConnection, HidDevice, HidDeviceConfig, HidDeviceInfo, HidDriver, Result, VidPid,
};

pub const REPORT_SIZE: usize = 64;
pub const CHANNEL: u32 = 0x1234_5678;
pub const RP_ID: &str = "example.com";

/// A request as the authenticator saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    GetInfo,
    GetAssertion { allow_list: Vec<Vec<u8>>, silent: bool },
    MakeCredential { rp_id: String },
    U2fSign { key_handle: Vec<u8>, app_param: [u8; 32] },
    U2fRegister,
    Cancel,
}

#[derive(Default)]
pub struct VirtualAuthenticator {
    /// GetInfo versions; empty means GetInfo is not supported
    pub versions: Vec<String>,
    /// Credential ids known to the CTAP2 application
    pub credentials: Vec<Vec<u8>>,
    /// Key handles known to the U2F application, with their app parameter
    pub u2f_key_handles: Vec<(Vec<u8>, [u8; 32])>,
    /// Answer unknown credentials in a user-present request with
    /// INVALID_CREDENTIAL instead of NO_CREDENTIALS
    pub invalid_credential_direct: bool,
    /// Keep-alive frames sent before every CBOR response
    pub keepalives: usize,
    /// Emit an INIT reply meant for another client first
    pub foreign_init_reply: bool,
    /// Emit a packet on another channel before every response
    pub foreign_traffic: bool,
    /// Replace every successful GetAssertion response
    pub assertion_override: Option<Vec<u8>>,
    /// Answer every CBOR/MSG request with this HID error code
    pub hid_error: Option<u8>,
    /// U2F requests answered with 6985 before the device accepts
    pub presence_retries: usize,

    pub requests: Vec<Recorded>,
    outbox: VecDeque<Vec<u8>>,
    incoming: Option<Message>,
    retries_left: usize,
}

impl VirtualAuthenticator {
    pub fn ctap2(credentials: &[&[u8]]) -> Self {
        Self {
            versions: vec!["FIDO_2_0".into()],
            credentials: credentials.iter().map(|c| c.to_vec()).collect(),
            ..Default::default()
        }
    }

    pub fn u2f_only(key_handles: &[(&[u8], [u8; 32])]) -> Self {
        Self {
            versions: Vec::new(),
            u2f_key_handles: key_handles.iter().map(|(k, a)| (k.to_vec(), *a)).collect(),
            ..Default::default()
        }
    }

    pub fn into_driver(self, vid_pid: VidPid) -> HidDriver<Self> {
        let info = HidDeviceInfo::new("/dev/hidraw-virtual", vid_pid, REPORT_SIZE).unwrap();
        let config = HidDeviceConfig::builder()
            .timeout(Duration::from_millis(300))
            .build();
        HidDriver::new(HidDevice::with_config(info, config), self)
    }

    fn send(&mut self, channel: u32, cmd: Cmd, payload: &[u8]) {
        if self.foreign_traffic && channel != BROADCAST_CID {
            self.push(CHANNEL ^ 0xFF, cmd, &[0xEE; 20]);
        }
        self.push(channel, cmd, payload);
    }

    fn push(&mut self, channel: u32, cmd: Cmd, payload: &[u8]) {
        let mut message = Message::create(channel, cmd, REPORT_SIZE, payload).unwrap();
        while let Some(packet) = message.pop_next_packet() {
            self.outbox.push_back(packet.to_report(REPORT_SIZE));
        }
    }

    fn handle(&mut self, message: Message) {
        let payload = message.payload();
        match message.cmd() {
            Cmd::Init => {
                let reply = InitReply {
                    nonce: payload.as_slice().try_into().unwrap(),
                    channel_id: CHANNEL,
                    protocol_version: 2,
                    device_version: (1, 0, 0),
                    capabilities: Capabilities(Capabilities::CBOR | Capabilities::WINK),
                };
                if self.foreign_init_reply {
                    let mut other = reply.clone();
                    other.nonce[0] ^= 0xFF;
                    other.channel_id = 0x0BAD_0BAD;
                    self.push(BROADCAST_CID, Cmd::Init, &other.to_payload());
                }
                self.push(BROADCAST_CID, Cmd::Init, &reply.to_payload());
            }
            Cmd::Cancel => self.requests.push(Recorded::Cancel),
            Cmd::Cbor | Cmd::Msg if self.hid_error.is_some() => {
                let code = self.hid_error.unwrap_or_default();
                self.send(message.channel_id(), Cmd::Error, &[code]);
            }
            Cmd::Cbor => {
                for _ in 0..self.keepalives {
                    self.send(message.channel_id(), Cmd::Keepalive, &[0x02]);
                }
                let response = self.handle_cbor(&payload);
                self.send(message.channel_id(), Cmd::Cbor, &response);
            }
            Cmd::Msg => {
                let response = self.handle_apdu(&payload);
                self.send(message.channel_id(), Cmd::Msg, &response);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    fn handle_cbor(&mut self, request: &[u8]) -> Vec<u8> {
        match CtapCommand::from_u8(request[0]) {
            Some(CtapCommand::GetInfo) => {
                self.requests.push(Recorded::GetInfo);
                if self.versions.is_empty() {
                    return vec![StatusCode::InvalidCommand.to_u8()];
                }
                let info = AuthenticatorGetInfoResponse::new(self.versions.clone(), [0x77; 16]);
                success(&info.to_cbor())
            }
            Some(CtapCommand::GetAssertion) => self.get_assertion(&request[1..]),
            Some(CtapCommand::MakeCredential) => {
                let params = MapParser::from_bytes(&request[1..]).unwrap();
                let rp_id = match params.get_raw(2).and_then(|rp| cbor::text_key(rp, "id")) {
                    Some(Value::Text(id)) => id.clone(),
                    _ => String::new(),
                };
                self.requests.push(Recorded::MakeCredential { rp_id });
                let response = AuthenticatorMakeCredentialResponse {
                    fmt: "none".into(),
                    auth_data: vec![0; 37],
                    att_stmt: Value::Map(Vec::new()),
                };
                success(&response.to_cbor())
            }
            _ => vec![StatusCode::InvalidCommand.to_u8()],
        }
    }

    fn get_assertion(&mut self, params: &[u8]) -> Vec<u8> {
        let params = MapParser::from_bytes(params).unwrap();
        let allow_list: Vec<Vec<u8>> = match params.get_raw(3) {
            Some(Value::Array(list)) => list
                .iter()
                .filter_map(PublicKeyCredentialDescriptor::from_cbor)
                .map(|d| d.id)
                .collect(),
            _ => Vec::new(),
        };
        let silent = matches!(
            params.get_raw(5).and_then(|o| cbor::text_key(o, "up")),
            Some(Value::Bool(false))
        );
        self.requests.push(Recorded::GetAssertion {
            allow_list: allow_list.clone(),
            silent,
        });

        let Some(id) = allow_list.iter().find(|id| self.credentials.contains(id)) else {
            if !silent && self.invalid_credential_direct {
                return vec![StatusCode::InvalidCredential.to_u8()];
            }
            return vec![StatusCode::NoCredentials.to_u8()];
        };

        if let Some(response) = &self.assertion_override {
            return response.clone();
        }
        let mut auth_data = vec![0xAB; 32];
        auth_data.push(if silent { 0x00 } else { 0x01 });
        auth_data.extend_from_slice(&[0, 0, 0, 7]);
        let assertion = AuthenticatorGetAssertionResponse::new(auth_data, vec![0x30, 0x44, 0x02])
            .with_credential(PublicKeyCredentialDescriptor::new(id.clone()));
        success(&assertion.to_cbor())
    }

    fn handle_apdu(&mut self, apdu: &[u8]) -> Vec<u8> {
        let ins = apdu[1];
        let lc = u16::from_be_bytes([apdu[5], apdu[6]]) as usize;
        let data = &apdu[7..7 + lc];

        if self.retries_left > 0 {
            self.retries_left -= 1;
            return vec![0x69, 0x85];
        }

        match ins {
            0x01 => {
                self.requests.push(Recorded::U2fRegister);
                self.retries_left = self.presence_retries;
                let mut response = vec![0x05; 70];
                response.extend_from_slice(&[0x90, 0x00]);
                response
            }
            0x02 => {
                let app_param: [u8; 32] = data[32..64].try_into().unwrap();
                let len = data[64] as usize;
                let key_handle = data[65..65 + len].to_vec();
                self.requests.push(Recorded::U2fSign {
                    key_handle: key_handle.clone(),
                    app_param,
                });
                if !self.u2f_key_handles.contains(&(key_handle, app_param)) {
                    return vec![0x6A, 0x80];
                }
                self.retries_left = self.presence_retries;
                vec![0x01, 0x00, 0x00, 0x00, 0x2A, 0x30, 0x45, 0x02, 0x90, 0x00]
            }
            _ => vec![0x6D, 0x00],
        }
    }

    /// The next report the device sends, if any
    fn next_report(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop_front()
    }
}

impl HidConnection for VirtualAuthenticator {
    fn connect(&mut self) -> Result<()> {
        self.retries_left = self.presence_retries;
        Ok(())
    }

    fn write(&mut self, report_id: u8, report: &[u8]) -> Result<()> {
        assert_eq!(report_id, 0);
        assert_eq!(report.len(), REPORT_SIZE);

        let message = match self.incoming.take() {
            Some(mut message) => {
                message.add_continuation_packet(report).unwrap();
                message
            }
            None => Message::from_init_packet(report).unwrap(),
        };
        if message.is_complete() {
            self.handle(message);
        } else {
            self.incoming = Some(message);
        }
        Ok(())
    }

    fn read(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        if let Some(report) = self.next_report() {
            return Ok(Some(report));
        }
        std::thread::sleep(timeout.unwrap_or_default().min(Duration::from_millis(10)));
        Ok(None)
    }
}

fn success(body: &Value) -> Vec<u8> {
    let mut response = vec![StatusCode::Success.to_u8()];
    response.extend(cbor::encode(body).unwrap());
    response
}

/// USB identity of an ordinary (not force-U2F) key
pub fn plain_key() -> VidPid {
    VidPid::new(0x1050, 0x0407)
}

pub fn init_logging() {
    let _ = simple_logger::init_with_level(log::Level::Trace);
}
