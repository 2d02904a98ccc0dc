//! One CTAP2 request/response exchange
//!
//! Wraps a typed request into the `[command][CBOR map]` envelope, submits it
//! to a device and turns the raw reply into a status plus a parsed response.

use ciborium::Value;
use fidolink_ctap::{cbor, CtapRequest, StatusCode};
use fidolink_transport::{CancelToken, FidoDevice};
use log::{debug, error};

/// Turns a decoded response body (or its absence) into a typed response
pub type ResponseParser<R> = fn(Option<&Value>) -> Option<R>;

pub struct Ctap2DeviceOperation<Req, Resp> {
    request: Req,
    parser: ResponseParser<Resp>,
    token: Option<CancelToken>,
}

impl<Req: CtapRequest, Resp> Ctap2DeviceOperation<Req, Resp> {
    pub fn new(request: Req, parser: ResponseParser<Resp>) -> Self {
        Self {
            request,
            parser,
            token: None,
        }
    }

    pub fn request(&self) -> &Req {
        &self.request
    }

    /// Token of the transaction in flight
    pub fn token(&self) -> Option<CancelToken> {
        self.token
    }

    pub fn owns(&self, token: CancelToken) -> bool {
        self.token == Some(token)
    }

    /// Encode the request and submit it
    pub fn start(
        &mut self,
        device: &mut dyn FidoDevice,
    ) -> fidolink_ctap::status::Result<CancelToken> {
        let (command, params) = self.request.encode_as_cbor();

        let mut bytes = vec![command.as_u8()];
        match &params {
            Some(params) => {
                bytes.extend(cbor::encode(params)?);
                debug!("<- {:#04x} {:?}", command.as_u8(), params);
            }
            None => debug!("<- {:#04x}", command.as_u8()),
        }

        let token = device.transact(bytes);
        self.token = Some(token);
        Ok(token)
    }

    pub fn cancel(&mut self, device: &mut dyn FidoDevice) {
        if let Some(token) = self.token {
            device.cancel(token);
        }
    }

    /// Interpret the reply to the transaction started by [`start`](Self::start).
    ///
    /// A missing reply reads as `Other`. Undecodable CBOR and bodies the
    /// parser rejects both read as `InvalidCbor`.
    pub fn on_response(&mut self, response: Option<Vec<u8>>) -> (StatusCode, Option<Resp>) {
        self.token = None;

        let Some(response) = response else {
            debug!("-> (no response)");
            return (StatusCode::Other, None);
        };

        let status = StatusCode::from_response(&response);
        if !status.is_success() {
            debug!("-> (CTAP2 error code {:#04x})", status.to_u8());
            return (status, None);
        }

        let body = &response[1..];
        let parsed = if body.is_empty() {
            debug!("-> (empty)");
            (self.parser)(None)
        } else {
            match cbor::decode_value(body) {
                Ok(value) => {
                    debug!("-> {:?}", value);
                    (self.parser)(Some(&value))
                }
                Err(_) => {
                    error!("-> invalid CBOR: {}", hex::encode(body));
                    return (StatusCode::InvalidCbor, None);
                }
            }
        };

        match parsed {
            Some(parsed) => (StatusCode::Success, Some(parsed)),
            None => {
                error!("-> response rejected by parser");
                (StatusCode::InvalidCbor, None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDevice;
    use fidolink_ctap::{
        read_ctap_get_assertion_response, read_ctap_get_info_response,
        AuthenticatorGetAssertionResponse, AuthenticatorGetInfoResponse, ClientDataHash,
        CtapGetAssertionRequest, CtapGetInfoRequest, PublicKeyCredentialDescriptor,
    };

    fn get_info() -> Ctap2DeviceOperation<CtapGetInfoRequest, AuthenticatorGetInfoResponse> {
        Ctap2DeviceOperation::new(CtapGetInfoRequest, read_ctap_get_info_response)
    }

    fn success(body: &Value) -> Vec<u8> {
        let mut response = vec![0x00];
        response.extend(cbor::encode(body).unwrap());
        response
    }

    #[test]
    fn test_start_encodes_envelope() {
        let mut device = MockDevice::ctap2();
        let mut op = get_info();
        let token = op.start(&mut device).unwrap();
        assert!(op.owns(token));
        assert_eq!(device.sent, vec![(token, vec![0x04])]);

        let request = CtapGetAssertionRequest::new("example.com", ClientDataHash::new([7; 32]));
        let mut op = Ctap2DeviceOperation::new(request, read_ctap_get_assertion_response);
        let token = op.start(&mut device).unwrap();
        let sent = device.command(token);
        assert_eq!(sent[0], 0x02);
        let params = cbor::decode_value(&sent[1..]).unwrap();
        let parser = cbor::MapParser::from_value(params).unwrap();
        assert_eq!(parser.get::<String>(1).unwrap(), "example.com");
    }

    #[test]
    fn test_success_with_body() {
        let info = AuthenticatorGetInfoResponse::new(vec!["FIDO_2_0".into()], [3; 16]);
        let mut device = MockDevice::ctap2();
        let mut op = get_info();
        op.start(&mut device).unwrap();

        let (status, parsed) = op.on_response(Some(success(&info.to_cbor())));
        assert_eq!(status, StatusCode::Success);
        assert_eq!(parsed, Some(info));
        assert_eq!(op.token(), None);
    }

    #[test]
    fn test_error_status() {
        let mut op = get_info();
        assert_eq!(op.on_response(Some(vec![0x22])), (StatusCode::InvalidCredential, None));
        assert_eq!(op.on_response(Some(vec![0x2D, 0xFF])), (StatusCode::KeepAliveCancel, None));
    }

    #[test]
    fn test_missing_and_empty_response() {
        let mut op = get_info();
        assert_eq!(op.on_response(None), (StatusCode::Other, None));
        assert_eq!(op.on_response(Some(vec![])), (StatusCode::InvalidCbor, None));
        // unknown status byte
        assert_eq!(op.on_response(Some(vec![0x5A])), (StatusCode::InvalidCbor, None));
    }

    #[test]
    fn test_undecodable_body_is_invalid_cbor() {
        let mut op = get_info();
        // truncated map
        assert_eq!(op.on_response(Some(vec![0x00, 0xA2, 0x01])), (StatusCode::InvalidCbor, None));
        // trailing garbage after a valid item
        let mut response = success(&Value::Map(vec![]));
        response.push(0xFF);
        assert_eq!(op.on_response(Some(response)), (StatusCode::InvalidCbor, None));
    }

    #[test]
    fn test_rejected_shape_is_invalid_cbor() {
        let mut op = get_info();
        // well-formed CBOR, but not a GetInfo map
        let wrong = success(&Value::Array(vec![Value::Bool(true)]));
        assert_eq!(op.on_response(Some(wrong)), (StatusCode::InvalidCbor, None));
        // success with no body: the parser sees None
        assert_eq!(op.on_response(Some(vec![0x00])), (StatusCode::InvalidCbor, None));
    }

    #[test]
    fn test_cancel_forwards_token() {
        let mut device = MockDevice::ctap2();
        let response = AuthenticatorGetAssertionResponse::new(vec![0; 37], vec![1])
            .with_credential(PublicKeyCredentialDescriptor::new(vec![9]));
        let request = CtapGetAssertionRequest::new("a.example", ClientDataHash::default());
        let mut op = Ctap2DeviceOperation::new(request, read_ctap_get_assertion_response);

        // nothing in flight yet
        op.cancel(&mut device);
        assert!(device.cancelled.is_empty());

        let token = op.start(&mut device).unwrap();
        op.cancel(&mut device);
        assert_eq!(device.cancelled, vec![token]);

        let (status, parsed) = op.on_response(Some(success(&response.to_cbor())));
        assert_eq!(status, StatusCode::Success);
        assert_eq!(parsed, Some(response));
    }
}
