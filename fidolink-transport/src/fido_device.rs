//! The device interface consumed by operations and tasks

use std::fmt;

use fidolink_ctap::{AuthenticatorGetInfoResponse, ProtocolVersion};

use crate::config::VidPid;

/// Identifies one submitted transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CancelToken(pub u64);

impl fmt::Display for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An authenticator that runs byte-level transactions one at a time.
///
/// `transact` only queues; the result arrives later as a completion for the
/// returned token. A `None` response means the transport failed.
pub trait FidoDevice {
    /// Queue `command` and return the token its completion will carry
    fn transact(&mut self, command: Vec<u8>) -> CancelToken;

    /// Best-effort cancellation of a queued or running transaction
    fn cancel(&mut self, token: CancelToken);

    fn id(&self) -> String;

    fn supported_protocol(&self) -> ProtocolVersion;

    fn set_supported_protocol(&mut self, protocol: ProtocolVersion);

    /// GetInfo response, once discovery has run against a CTAP2 device
    fn device_info(&self) -> Option<&AuthenticatorGetInfoResponse>;

    fn set_device_info(&mut self, info: AuthenticatorGetInfoResponse);

    /// USB identity, for transports that have one
    fn vid_pid(&self) -> Option<VidPid> {
        None
    }
}
