//! Assertion over CTAP1/U2F
//!
//! Tries every key handle of the allow list with U2F_AUTHENTICATE, first
//! under the relying party's application parameter and then under the
//! alternative one if the request carries it. A device that wants a touch
//! answers `6985` and the same APDU is retried after a short delay. When no
//! key handle is recognised a throwaway registration collects a touch before
//! `NoCredentials` is reported.

use std::time::Duration;

use fidolink_ctap::u2f::{self, ApduResponse, CommandApdu, StatusWord};
use fidolink_ctap::{AuthenticatorGetAssertionResponse, CtapGetAssertionRequest, StatusCode};
use fidolink_transport::{CancelToken, FidoDevice};
use log::{debug, warn};

use crate::task::{FidoTask, TaskStatus};

/// Delay before re-sending an APDU the device refused for lack of presence
pub const PRESENCE_RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AppParam {
    Primary,
    Alternative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Sign { index: usize, app: AppParam },
    Register,
    Done,
}

type SignResult = (StatusCode, Option<AuthenticatorGetAssertionResponse>);

pub struct U2fSignOperation {
    request: CtapGetAssertionRequest,
    primary_app_param: [u8; 32],
    phase: Phase,
    token: Option<CancelToken>,
    cancelled: bool,
}

impl U2fSignOperation {
    pub fn new(request: CtapGetAssertionRequest) -> Self {
        let primary_app_param = u2f::application_parameter(request.rp_id());
        Self {
            request,
            primary_app_param,
            phase: Phase::Idle,
            token: None,
            cancelled: false,
        }
    }

    fn app_param(&self, app: AppParam) -> [u8; 32] {
        match (app, self.request.alternative_application_parameter()) {
            (AppParam::Alternative, Some(alternative)) => *alternative,
            _ => self.primary_app_param,
        }
    }

    fn finish(
        &mut self,
        status: StatusCode,
        response: Option<AuthenticatorGetAssertionResponse>,
    ) -> TaskStatus<SignResult> {
        self.phase = Phase::Done;
        self.token = None;
        TaskStatus::Complete((status, response))
    }

    fn transmit(
        &mut self,
        device: &mut dyn FidoDevice,
        apdu: &CommandApdu,
    ) -> TaskStatus<SignResult> {
        match apdu.serialize() {
            Ok(bytes) => {
                self.token = Some(device.transact(bytes));
                TaskStatus::Pending
            }
            Err(e) => {
                warn!("{}: cannot encode APDU: {}", device.id(), e);
                self.finish(StatusCode::Other, None)
            }
        }
    }

    /// Send the APDU for the current phase
    fn send(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<SignResult> {
        match self.phase {
            Phase::Sign { index, app } => {
                let challenge = *self.request.client_data_hash().as_bytes();
                let app_param = self.app_param(app);
                let key_handle = &self.request.allow_list()[index].id;
                match u2f::sign_apdu(&challenge, &app_param, key_handle) {
                    Ok(apdu) => self.transmit(device, &apdu),
                    Err(e) => {
                        warn!("{}: skipping key handle {}: {}", device.id(), index, e);
                        self.next_key_handle(device, index)
                    }
                }
            }
            Phase::Register => self.transmit(device, &u2f::bogus_register_apdu()),
            Phase::Idle | Phase::Done => TaskStatus::Pending,
        }
    }

    fn next_key_handle(
        &mut self,
        device: &mut dyn FidoDevice,
        index: usize,
    ) -> TaskStatus<SignResult> {
        self.phase = if index + 1 < self.request.allow_list().len() {
            Phase::Sign {
                index: index + 1,
                app: AppParam::Primary,
            }
        } else {
            debug!("{}: no key handle recognised, waiting for a touch", device.id());
            Phase::Register
        };
        self.send(device)
    }

    fn on_sign_response(
        &mut self,
        device: &mut dyn FidoDevice,
        index: usize,
        app: AppParam,
        response: ApduResponse,
    ) -> TaskStatus<SignResult> {
        match response.status {
            StatusWord::NoError => {
                let key_handle = &self.request.allow_list()[index].id;
                let app_param = self.app_param(app);
                match u2f::sign_response_to_assertion(&app_param, key_handle, &response.data) {
                    Some(assertion) => self.finish(StatusCode::Success, Some(assertion)),
                    None => {
                        warn!("{}: malformed U2F sign response", device.id());
                        self.finish(StatusCode::Other, None)
                    }
                }
            }
            StatusWord::ConditionsNotSatisfied => TaskStatus::Wait(PRESENCE_RETRY_DELAY),
            status => {
                debug!("{}: key handle {} rejected ({:?})", device.id(), index, status);
                let has_alternative = self.request.alternative_application_parameter().is_some();
                if app == AppParam::Primary && has_alternative {
                    self.phase = Phase::Sign {
                        index,
                        app: AppParam::Alternative,
                    };
                    self.send(device)
                } else {
                    self.next_key_handle(device, index)
                }
            }
        }
    }

    fn on_register_response(&mut self, response: ApduResponse) -> TaskStatus<SignResult> {
        match response.status {
            StatusWord::NoError => self.finish(StatusCode::NoCredentials, None),
            StatusWord::ConditionsNotSatisfied => TaskStatus::Wait(PRESENCE_RETRY_DELAY),
            _ => self.finish(StatusCode::Other, None),
        }
    }
}

impl FidoTask for U2fSignOperation {
    type Output = SignResult;

    fn start(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<Self::Output> {
        self.phase = if self.request.allow_list().is_empty() {
            Phase::Register
        } else {
            Phase::Sign {
                index: 0,
                app: AppParam::Primary,
            }
        };
        self.send(device)
    }

    fn on_response(
        &mut self,
        device: &mut dyn FidoDevice,
        token: CancelToken,
        response: Option<Vec<u8>>,
    ) -> TaskStatus<Self::Output> {
        if self.token != Some(token) {
            return TaskStatus::Pending;
        }
        self.token = None;

        if self.cancelled {
            return self.finish(StatusCode::KeepAliveCancel, None);
        }
        let Some(response) = response.as_deref().and_then(ApduResponse::parse) else {
            return self.finish(StatusCode::Other, None);
        };

        match self.phase {
            Phase::Sign { index, app } => self.on_sign_response(device, index, app, response),
            Phase::Register => self.on_register_response(response),
            Phase::Idle | Phase::Done => TaskStatus::Pending,
        }
    }

    fn resume(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<Self::Output> {
        if self.cancelled {
            return self.finish(StatusCode::KeepAliveCancel, None);
        }
        self.send(device)
    }

    fn cancel(&mut self, device: &mut dyn FidoDevice) {
        self.cancelled = true;
        if let Some(token) = self.token {
            device.cancel(token);
        }
    }
}
