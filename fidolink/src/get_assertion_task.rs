//! The GetAssertion ceremony against one device
//!
//! Large allow lists are not sent in one request: each credential is probed
//! silently (no user presence, no UV) and only a recognised one is used for
//! the real request. Whenever the device turns out to hold none of the
//! credentials, a dummy MakeCredential still waits for a touch, so a user
//! cannot tell a missing credential apart from a declined one.

use fidolink_ctap::{
    read_ctap_get_assertion_response, read_ctap_make_credential_response,
    AuthenticatorGetAssertionResponse, AuthenticatorMakeCredentialResponse, CtapGetAssertionRequest,
    CtapMakeCredentialRequest, ProtocolVersion, StatusCode, UserVerificationRequirement,
};
use fidolink_transport::{CancelToken, FidoDevice};
use log::debug;

use crate::error::{Error, Result};
use crate::operation::Ctap2DeviceOperation;
use crate::task::{FidoTask, TaskStatus};
use crate::u2f_sign::U2fSignOperation;

type AssertionOperation =
    Ctap2DeviceOperation<CtapGetAssertionRequest, AuthenticatorGetAssertionResponse>;
type TouchOperation =
    Ctap2DeviceOperation<CtapMakeCredentialRequest, AuthenticatorMakeCredentialResponse>;

/// Final status and, on success, the assertion
pub type GetAssertionResult = (StatusCode, Option<AuthenticatorGetAssertionResponse>);

enum Stage {
    Idle,
    /// Probing `allow_list[index]` without user presence
    Silent {
        index: usize,
        operation: AssertionOperation,
    },
    Direct(AssertionOperation),
    DummyTouch(TouchOperation),
    U2f(U2fSignOperation),
    Done,
}

pub struct GetAssertionTask {
    request: CtapGetAssertionRequest,
    stage: Stage,
    cancelled: bool,
}

impl GetAssertionTask {
    /// The request must require user presence and carry a binary UV choice.
    pub fn new(request: CtapGetAssertionRequest) -> Result<Self> {
        if !request.user_presence_required() {
            return Err(Error::InvalidRequest("user presence must be required"));
        }
        if request.user_verification() == UserVerificationRequirement::Preferred {
            return Err(Error::InvalidRequest(
                "user verification must be resolved to required or discouraged",
            ));
        }
        Ok(Self {
            request,
            stage: Stage::Idle,
            cancelled: false,
        })
    }

    pub fn request(&self) -> &CtapGetAssertionRequest {
        &self.request
    }

    /// A CTAP2 device that also speaks U2F may know the credential under the
    /// alternative (AppID) application parameter
    fn may_fall_back_to_u2f(&self, device: &dyn FidoDevice) -> bool {
        self.request.alternative_application_parameter().is_some()
            && device
                .device_info()
                .map_or(false, |info| info.supports(ProtocolVersion::U2f))
    }

    fn for_credential(&self, index: usize) -> CtapGetAssertionRequest {
        let credential = self.request.allow_list()[index].clone();
        self.request.clone().with_allow_list(vec![credential])
    }

    fn finish(
        &mut self,
        status: StatusCode,
        response: Option<AuthenticatorGetAssertionResponse>,
    ) -> TaskStatus<GetAssertionResult> {
        self.stage = Stage::Done;
        TaskStatus::Complete((status, response))
    }

    fn get_assertion(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<GetAssertionResult> {
        let count = self.request.allow_list().len();
        if count > 1 || (count == 1 && self.may_fall_back_to_u2f(device)) {
            return self.probe(device, 0);
        }
        let request = self.request.clone();
        self.direct(device, request)
    }

    fn probe(
        &mut self,
        device: &mut dyn FidoDevice,
        index: usize,
    ) -> TaskStatus<GetAssertionResult> {
        let request = self
            .for_credential(index)
            .with_user_presence_required(false)
            .with_user_verification(UserVerificationRequirement::Discouraged);
        let mut operation = Ctap2DeviceOperation::new(request, read_ctap_get_assertion_response);
        match operation.start(device) {
            Ok(_) => {
                self.stage = Stage::Silent { index, operation };
                TaskStatus::Pending
            }
            Err(status) => self.finish(status, None),
        }
    }

    fn direct(
        &mut self,
        device: &mut dyn FidoDevice,
        request: CtapGetAssertionRequest,
    ) -> TaskStatus<GetAssertionResult> {
        let mut operation = Ctap2DeviceOperation::new(request, read_ctap_get_assertion_response);
        match operation.start(device) {
            Ok(_) => {
                self.stage = Stage::Direct(operation);
                TaskStatus::Pending
            }
            Err(status) => self.finish(status, None),
        }
    }

    fn dummy_touch(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<GetAssertionResult> {
        debug!("{}: collecting a touch before reporting no credentials", device.id());
        let mut operation = Ctap2DeviceOperation::new(
            CtapMakeCredentialRequest::touch_request(),
            read_ctap_make_credential_response,
        );
        match operation.start(device) {
            Ok(_) => {
                self.stage = Stage::DummyTouch(operation);
                TaskStatus::Pending
            }
            Err(_) => self.finish(StatusCode::NoCredentials, None),
        }
    }

    fn u2f_sign(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<GetAssertionResult> {
        let mut operation = U2fSignOperation::new(self.request.clone());
        let status = operation.start(device);
        self.stage = Stage::U2f(operation);
        self.settle(status)
    }

    /// Mark the task done if a sub-task completed
    fn settle(
        &mut self,
        status: TaskStatus<GetAssertionResult>,
    ) -> TaskStatus<GetAssertionResult> {
        if status.is_complete() {
            self.stage = Stage::Done;
        }
        status
    }

    fn on_silent_response(
        &mut self,
        device: &mut dyn FidoDevice,
        index: usize,
        status: StatusCode,
    ) -> TaskStatus<GetAssertionResult> {
        if self.cancelled {
            return self.finish(StatusCode::KeepAliveCancel, None);
        }
        if status.is_success() {
            // Recognised: ask again with presence and the caller's UV choice
            debug!("{}: credential {} recognised", device.id(), index);
            let request = self.for_credential(index);
            return self.direct(device, request);
        }

        if index + 1 < self.request.allow_list().len() {
            return self.probe(device, index + 1);
        }
        if self.may_fall_back_to_u2f(device) {
            debug!("{}: no CTAP2 credential matched, trying U2F", device.id());
            device.set_supported_protocol(ProtocolVersion::U2f);
            return self.u2f_sign(device);
        }
        self.dummy_touch(device)
    }

    fn on_direct_response(
        &mut self,
        device: &mut dyn FidoDevice,
        status: StatusCode,
        response: Option<AuthenticatorGetAssertionResponse>,
    ) -> TaskStatus<GetAssertionResult> {
        // Some authenticators reject unknown credentials before asking for a
        // touch
        if status == StatusCode::InvalidCredential && !self.cancelled {
            return self.dummy_touch(device);
        }
        self.finish(status, response)
    }
}

impl FidoTask for GetAssertionTask {
    type Output = GetAssertionResult;

    fn start(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<Self::Output> {
        if self.cancelled {
            return self.finish(StatusCode::KeepAliveCancel, None);
        }
        if device.supported_protocol() == ProtocolVersion::Ctap2 {
            self.get_assertion(device)
        } else {
            self.u2f_sign(device)
        }
    }

    fn on_response(
        &mut self,
        device: &mut dyn FidoDevice,
        token: CancelToken,
        response: Option<Vec<u8>>,
    ) -> TaskStatus<Self::Output> {
        match &mut self.stage {
            Stage::Silent { index, operation } if operation.owns(token) => {
                let index = *index;
                let (status, _) = operation.on_response(response);
                self.on_silent_response(device, index, status)
            }
            Stage::Direct(operation) if operation.owns(token) => {
                let (status, assertion) = operation.on_response(response);
                self.on_direct_response(device, status, assertion)
            }
            Stage::DummyTouch(operation) if operation.owns(token) => {
                // The touch is all that was wanted
                operation.on_response(response);
                self.finish(StatusCode::NoCredentials, None)
            }
            Stage::U2f(operation) => {
                let status = operation.on_response(device, token, response);
                self.settle(status)
            }
            _ => TaskStatus::Pending,
        }
    }

    fn resume(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<Self::Output> {
        match &mut self.stage {
            Stage::U2f(operation) => {
                let status = operation.resume(device);
                self.settle(status)
            }
            _ => TaskStatus::Pending,
        }
    }

    fn cancel(&mut self, device: &mut dyn FidoDevice) {
        self.cancelled = true;
        match &mut self.stage {
            Stage::Silent { operation, .. } | Stage::Direct(operation) => operation.cancel(device),
            Stage::DummyTouch(operation) => operation.cancel(device),
            Stage::U2f(operation) => operation.cancel(device),
            Stage::Idle | Stage::Done => {}
        }
    }
}
