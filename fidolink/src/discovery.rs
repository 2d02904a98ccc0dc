//! Protocol discovery
//!
//! Decides whether a device speaks CTAP2 or only U2F by sending
//! authenticatorGetInfo. Some U2F-only keys misbehave when they receive a CBOR
//! command, so devices on the [`ForceU2fList`] are never probed.

use std::collections::BTreeSet;

use fidolink_ctap::{
    read_ctap_get_info_response, AuthenticatorGetInfoResponse, CtapGetInfoRequest, ProtocolVersion,
};
use fidolink_transport::{CancelToken, FidoDevice, VidPid};
use log::{debug, info};

use crate::operation::Ctap2DeviceOperation;
use crate::task::{FidoTask, TaskStatus};

/// Devices assumed to speak U2F without probing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceU2fList(BTreeSet<VidPid>);

impl Default for ForceU2fList {
    /// U2F Zero and Nitrokey FIDO U2F
    fn default() -> Self {
        Self::empty()
            .with(VidPid::new(0x10c4, 0x8acf))
            .with(VidPid::new(0x20a0, 0x4287))
    }
}

impl ForceU2fList {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn with(mut self, vid_pid: VidPid) -> Self {
        self.0.insert(vid_pid);
        self
    }

    pub fn contains(&self, vid_pid: VidPid) -> bool {
        self.0.contains(&vid_pid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VidPid> {
        self.0.iter()
    }
}

impl FromIterator<VidPid> for ForceU2fList {
    fn from_iter<I: IntoIterator<Item = VidPid>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Sets the device's protocol (and device info for CTAP2 devices)
pub struct ProtocolDiscovery {
    force_u2f: ForceU2fList,
    operation: Option<Ctap2DeviceOperation<CtapGetInfoRequest, AuthenticatorGetInfoResponse>>,
}

impl ProtocolDiscovery {
    pub fn new(force_u2f: ForceU2fList) -> Self {
        Self {
            force_u2f,
            operation: None,
        }
    }

    fn conclude(
        &mut self,
        device: &mut dyn FidoDevice,
        protocol: ProtocolVersion,
    ) -> TaskStatus<ProtocolVersion> {
        info!("{}: using {:?}", device.id(), protocol);
        self.operation = None;
        device.set_supported_protocol(protocol);
        TaskStatus::Complete(protocol)
    }
}

impl Default for ProtocolDiscovery {
    fn default() -> Self {
        Self::new(ForceU2fList::default())
    }
}

impl FidoTask for ProtocolDiscovery {
    type Output = ProtocolVersion;

    fn start(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<Self::Output> {
        if let Some(vid_pid) = device.vid_pid().filter(|v| self.force_u2f.contains(*v)) {
            debug!("{}: {} is forced to U2F", device.id(), vid_pid);
            return self.conclude(device, ProtocolVersion::U2f);
        }

        // GetInfo has to go out as a CBOR frame
        device.set_supported_protocol(ProtocolVersion::Ctap2);
        let mut operation =
            Ctap2DeviceOperation::new(CtapGetInfoRequest, read_ctap_get_info_response);
        match operation.start(device) {
            Ok(_) => {
                self.operation = Some(operation);
                TaskStatus::Pending
            }
            Err(_) => self.conclude(device, ProtocolVersion::U2f),
        }
    }

    fn on_response(
        &mut self,
        device: &mut dyn FidoDevice,
        token: CancelToken,
        response: Option<Vec<u8>>,
    ) -> TaskStatus<Self::Output> {
        let Some(operation) = self.operation.as_mut().filter(|op| op.owns(token)) else {
            return TaskStatus::Pending;
        };

        match operation.on_response(response) {
            (status, Some(info)) if status.is_success() && info.supports(ProtocolVersion::Ctap2) => {
                device.set_device_info(info);
                self.conclude(device, ProtocolVersion::Ctap2)
            }
            _ => self.conclude(device, ProtocolVersion::U2f),
        }
    }

    fn cancel(&mut self, device: &mut dyn FidoDevice) {
        if let Some(operation) = self.operation.as_mut() {
            operation.cancel(device);
        }
    }
}
