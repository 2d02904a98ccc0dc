//! In-memory device for task tests

use fidolink_ctap::{AuthenticatorGetInfoResponse, ProtocolVersion};
use fidolink_transport::{CancelToken, FidoDevice, VidPid};

/// Records submitted commands; responses are fed back by the test
#[derive(Debug, Default)]
pub struct MockDevice {
    pub sent: Vec<(CancelToken, Vec<u8>)>,
    pub cancelled: Vec<CancelToken>,
    pub protocol: ProtocolVersion,
    pub info: Option<AuthenticatorGetInfoResponse>,
    pub vid_pid: Option<VidPid>,
    next_token: u64,
}

impl MockDevice {
    pub fn ctap2() -> Self {
        Self {
            protocol: ProtocolVersion::Ctap2,
            ..Default::default()
        }
    }

    pub fn u2f() -> Self {
        Self {
            protocol: ProtocolVersion::U2f,
            ..Default::default()
        }
    }

    /// Unprobed device with a USB identity
    pub fn with_vid_pid(vid_pid: VidPid) -> Self {
        Self {
            vid_pid: Some(vid_pid),
            ..Default::default()
        }
    }

    /// CTAP2 device whose GetInfo also lists U2F
    pub fn ctap2_with_u2f() -> Self {
        Self {
            info: Some(AuthenticatorGetInfoResponse::new(
                vec!["U2F_V2".into(), "FIDO_2_0".into()],
                [0; 16],
            )),
            ..Self::ctap2()
        }
    }

    pub fn command(&self, token: CancelToken) -> &[u8] {
        self.sent
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, c)| c.as_slice())
            .unwrap()
    }

    /// The most recent submission
    pub fn last(&self) -> (CancelToken, &[u8]) {
        let (token, command) = self.sent.last().unwrap();
        (*token, command)
    }
}

impl FidoDevice for MockDevice {
    fn transact(&mut self, command: Vec<u8>) -> CancelToken {
        let token = CancelToken(self.next_token);
        self.next_token += 1;
        self.sent.push((token, command));
        token
    }

    fn cancel(&mut self, token: CancelToken) {
        self.cancelled.push(token);
    }

    fn id(&self) -> String {
        "mock".into()
    }

    fn supported_protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    fn set_supported_protocol(&mut self, protocol: ProtocolVersion) {
        self.protocol = protocol;
    }

    fn device_info(&self) -> Option<&AuthenticatorGetInfoResponse> {
        self.info.as_ref()
    }

    fn set_device_info(&mut self, info: AuthenticatorGetInfoResponse) {
        self.info = Some(info);
    }

    fn vid_pid(&self) -> Option<VidPid> {
        self.vid_pid
    }
}
