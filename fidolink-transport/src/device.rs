//! Transaction state machine for one CTAPHID device
//!
//! [`HidDevice`] owns the channel, the FIFO of pending transactions and the
//! timeout bookkeeping, but performs no I/O itself. Callers feed it [`Event`]s
//! (connect, write and read completions, timer expiry) and execute the
//! [`Action`]s it queues, which also carry transaction completions.
//!
//! ```text
//! Init -> Connecting -> Ready <-> Busy -> DeviceError | MsgError
//! ```
//!
//! While `Busy` the device moves through `Writing -> Waiting -> Reading`, or
//! `Writing -> WritingPendingCancel -> Reading` when a cancel arrives before
//! the request is fully written.

use std::collections::VecDeque;
use std::time::Duration;

use fidolink_ctap::{AuthenticatorGetInfoResponse, ProtocolVersion, StatusCode};
use log::{debug, error, trace, warn};

use crate::config::{HidDeviceConfig, HidDeviceInfo, VidPid};
use crate::ctaphid::{
    channel_of, parse_init_reply, Cmd, HidErrorCode, InitReply, Message, BROADCAST_CID,
    INIT_NONCE_SIZE,
};
use crate::fido_device::{CancelToken, FidoDevice};

/// Device state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Connecting,
    Ready,
    Busy,
    DeviceError,
    MsgError,
}

/// Progress of the current transaction while `Busy`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyState {
    Writing,
    WritingPendingCancel,
    Waiting,
    Reading,
}

/// Completion of an action the device asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Result of [`Action::Connect`]
    Connected(bool),
    /// Result of [`Action::Write`]
    WriteComplete(bool),
    /// Result of [`Action::Read`]; `None` if the read failed
    ReadComplete(Option<Vec<u8>>),
    /// The armed timeout expired
    Timeout,
}

/// Work the device wants done
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Open the connection, answer with [`Event::Connected`]
    Connect,
    /// Write one report, answer with [`Event::WriteComplete`]
    Write { report_id: u8, report: Vec<u8> },
    /// Write a CANCEL report. No completion is expected.
    SendCancel { report_id: u8, report: Vec<u8> },
    /// Read one report, answer with [`Event::ReadComplete`]
    Read,
    /// (Re)start the timer, answer with [`Event::Timeout`] on expiry
    ArmTimeout(Duration),
    /// Stop the timer
    CancelTimeout,
    /// A transaction finished. `None` signals a transport failure.
    Complete {
        token: CancelToken,
        response: Option<Vec<u8>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Io {
    Connect,
    Write,
    Read,
}

#[derive(Debug)]
struct PendingTransaction {
    command: Vec<u8>,
    token: CancelToken,
}

/// Sans-IO CTAPHID device
#[derive(Debug)]
pub struct HidDevice {
    info: HidDeviceInfo,
    config: HidDeviceConfig,
    state: State,
    busy_state: BusyState,
    channel_id: u32,
    nonce: [u8; INIT_NONCE_SIZE],
    init_reply: Option<InitReply>,
    supported_protocol: ProtocolVersion,
    device_info: Option<AuthenticatorGetInfoResponse>,
    pending: VecDeque<PendingTransaction>,
    current_token: Option<CancelToken>,
    next_token: u64,
    outgoing: Option<Message>,
    incoming: Option<Message>,
    awaiting: Option<Io>,
    timeout_armed: bool,
    actions: VecDeque<Action>,
}

impl HidDevice {
    pub fn new(info: HidDeviceInfo) -> Self {
        Self::with_config(info, HidDeviceConfig::default())
    }

    pub fn with_config(info: HidDeviceInfo, config: HidDeviceConfig) -> Self {
        Self {
            info,
            config,
            state: State::Init,
            busy_state: BusyState::Writing,
            channel_id: BROADCAST_CID,
            nonce: [0; INIT_NONCE_SIZE],
            init_reply: None,
            supported_protocol: ProtocolVersion::Unknown,
            device_info: None,
            pending: VecDeque::new(),
            current_token: None,
            next_token: 0,
            outgoing: None,
            incoming: None,
            awaiting: None,
            timeout_armed: false,
            actions: VecDeque::new(),
        }
    }

    pub fn info(&self) -> &HidDeviceInfo {
        &self.info
    }

    pub fn config(&self) -> &HidDeviceConfig {
        &self.config
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn busy_state(&self) -> Option<BusyState> {
        (self.state == State::Busy).then_some(self.busy_state)
    }

    /// Channel allocated by the INIT handshake
    pub fn channel_id(&self) -> Option<u32> {
        self.init_reply.as_ref().map(|r| r.channel_id)
    }

    pub fn init_reply(&self) -> Option<&InitReply> {
        self.init_reply.as_ref()
    }

    /// Number of transactions queued, including the one in flight
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Start the INIT handshake without waiting for the first transaction
    pub fn connect(&mut self) {
        if self.state == State::Init {
            self.transition();
        }
    }

    /// Next action to execute, in the order they were issued
    pub fn poll_action(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    /// Feed the result of a previously issued action
    pub fn handle_event(&mut self, event: Event) {
        if self.is_failed() {
            trace!("{}: ignoring {:?} in {:?}", self.info.id(), event, self.state);
            return;
        }

        match event {
            Event::Timeout => self.on_timeout(),
            Event::Connected(success) => {
                if self.take_awaiting(Io::Connect) {
                    self.on_connect(success);
                }
            }
            Event::WriteComplete(success) => {
                if self.take_awaiting(Io::Write) {
                    match self.state {
                        State::Connecting => self.on_init_write_complete(success),
                        State::Busy => self.on_packet_written(success),
                        _ => {}
                    }
                }
            }
            Event::ReadComplete(report) => {
                if self.take_awaiting(Io::Read) {
                    match self.state {
                        State::Connecting => self.on_potential_init_reply(report),
                        State::Busy => self.on_read(report),
                        _ => {}
                    }
                }
            }
        }
    }

    fn is_failed(&self) -> bool {
        matches!(self.state, State::DeviceError | State::MsgError)
    }

    fn report_size(&self) -> usize {
        self.info.max_output_report_size()
    }

    fn take_awaiting(&mut self, io: Io) -> bool {
        if self.awaiting == Some(io) {
            self.awaiting = None;
            true
        } else {
            warn!(
                "{}: unexpected {:?} completion (awaiting {:?})",
                self.info.id(),
                io,
                self.awaiting
            );
            false
        }
    }

    fn transition(&mut self) {
        match self.state {
            State::Init => {
                self.state = State::Connecting;
                self.arm_timeout();
                self.awaiting = Some(Io::Connect);
                self.actions.push_back(Action::Connect);
            }
            State::Ready => self.start_next_transaction(),
            State::Connecting | State::Busy => {}
            State::DeviceError | State::MsgError => self.drain(),
        }
    }

    fn start_next_transaction(&mut self) {
        let cmd = if self.supported_protocol == ProtocolVersion::Ctap2 {
            Cmd::Cbor
        } else {
            Cmd::Msg
        };

        while let Some(front) = self.pending.front_mut() {
            let token = front.token;
            let command = std::mem::take(&mut front.command);

            match Message::create(self.channel_id, cmd, self.report_size(), &command) {
                Ok(message) => {
                    debug!(
                        "{}: starting transaction {} ({} bytes, {:?})",
                        self.info.id(),
                        token,
                        command.len(),
                        cmd
                    );
                    self.state = State::Busy;
                    self.busy_state = BusyState::Writing;
                    self.current_token = Some(token);
                    self.arm_timeout();
                    self.outgoing = Some(message);
                    self.write_next_packet();
                    return;
                }
                Err(e) => {
                    error!("{}: cannot frame transaction {}: {}", self.info.id(), token, e);
                    self.pending.pop_front();
                    self.actions.push_back(Action::Complete {
                        token,
                        response: None,
                    });
                }
            }
        }
    }

    fn arm_timeout(&mut self) {
        self.timeout_armed = true;
        self.actions.push_back(Action::ArmTimeout(self.config.timeout));
    }

    fn cancel_timeout(&mut self) {
        if self.timeout_armed {
            self.timeout_armed = false;
            self.actions.push_back(Action::CancelTimeout);
        }
    }

    fn read(&mut self) {
        self.awaiting = Some(Io::Read);
        self.actions.push_back(Action::Read);
    }

    fn write_report(&mut self, report: Vec<u8>) {
        trace!("{}: -> {}", self.info.id(), hex::encode(&report));
        self.awaiting = Some(Io::Write);
        self.actions.push_back(Action::Write {
            report_id: self.config.report_id,
            report,
        });
    }

    fn write_next_packet(&mut self) {
        let report_size = self.report_size();
        let next = self.outgoing.as_mut().and_then(Message::pop_next_packet);
        if let Some(packet) = next {
            self.write_report(packet.to_report(report_size));
        }
    }

    /// Move to a failed state and fail every queued transaction in order
    fn fail(&mut self, state: State) {
        self.cancel_timeout();
        self.state = state;
        self.transition();
    }

    fn drain(&mut self) {
        self.awaiting = None;
        self.outgoing = None;
        self.incoming = None;
        self.current_token = None;
        while let Some(transaction) = self.pending.pop_front() {
            self.actions.push_back(Action::Complete {
                token: transaction.token,
                response: None,
            });
        }
    }

    fn on_timeout(&mut self) {
        if !self.timeout_armed {
            trace!("{}: stale timeout", self.info.id());
            return;
        }
        self.timeout_armed = false;
        warn!("{}: timed out in {:?}", self.info.id(), self.state);
        self.fail(State::DeviceError);
    }

    fn on_connect(&mut self, success: bool) {
        self.cancel_timeout();
        if !success {
            warn!("{}: connection failed", self.info.id());
            self.fail(State::DeviceError);
            return;
        }

        self.nonce = rand::random();
        self.arm_timeout();
        let init = Message::create(BROADCAST_CID, Cmd::Init, self.report_size(), &self.nonce)
            .ok()
            .and_then(|mut m| m.pop_next_packet());
        match init {
            Some(packet) => self.write_report(packet.to_report(self.report_size())),
            None => self.fail(State::DeviceError),
        }
    }

    fn on_init_write_complete(&mut self, success: bool) {
        if !success {
            warn!("{}: INIT write failed", self.info.id());
            self.fail(State::DeviceError);
            return;
        }
        self.read();
    }

    fn on_potential_init_reply(&mut self, report: Option<Vec<u8>>) {
        let Some(report) = report else {
            warn!("{}: INIT read failed", self.info.id());
            self.fail(State::DeviceError);
            return;
        };

        // Other clients of the same device see our traffic and we see theirs
        let Some(reply) = parse_init_reply(&self.nonce, &report) else {
            trace!("{}: ignoring unrelated report during INIT", self.info.id());
            self.read();
            return;
        };

        self.cancel_timeout();
        debug!(
            "{}: allocated channel {:#010x}, protocol {}, capabilities {:#04x}",
            self.info.id(),
            reply.channel_id,
            reply.protocol_version,
            reply.capabilities.0
        );
        self.channel_id = reply.channel_id;
        self.init_reply = Some(reply);
        self.state = State::Ready;
        self.transition();
    }

    fn on_packet_written(&mut self, success: bool) {
        if !success {
            warn!("{}: write failed", self.info.id());
            self.fail(State::DeviceError);
            return;
        }

        if self.outgoing.as_ref().map_or(false, |m| m.num_packets() > 0) {
            self.write_next_packet();
            return;
        }
        self.outgoing = None;

        match self.busy_state {
            BusyState::Writing => {
                self.busy_state = BusyState::Waiting;
                self.read();
            }
            BusyState::WritingPendingCancel => {
                self.busy_state = BusyState::Reading;
                self.write_cancel();
                self.read();
            }
            state => error!("{}: write completed in {:?}", self.info.id(), state),
        }
    }

    fn on_read(&mut self, report: Option<Vec<u8>>) {
        let Some(report) = report else {
            warn!("{}: read failed", self.info.id());
            self.fail(State::DeviceError);
            return;
        };
        trace!("{}: <- {}", self.info.id(), hex::encode(&report));

        match channel_of(&report) {
            Some(cid) if cid != self.channel_id => {
                trace!("{}: ignoring report for channel {:#010x}", self.info.id(), cid);
                self.read();
                return;
            }
            Some(_) => {}
            None => {
                error!("{}: short report ({} bytes)", self.info.id(), report.len());
                self.fail(State::DeviceError);
                return;
            }
        }

        if let Some(mut message) = self.incoming.take() {
            if let Err(e) = message.add_continuation_packet(&report) {
                error!("{}: bad continuation packet: {}", self.info.id(), e);
                self.fail(State::DeviceError);
                return;
            }
            self.continue_reading(message);
            return;
        }

        let Some(message) = Message::from_init_packet(&report) else {
            error!("{}: malformed response packet", self.info.id());
            self.fail(State::DeviceError);
            return;
        };

        if self.supported_protocol == ProtocolVersion::Ctap2 && message.cmd() == Cmd::Keepalive {
            trace!("{}: keep-alive", self.info.id());
            self.cancel_timeout();
            self.arm_timeout();
            self.read();
            return;
        }

        if self.busy_state == BusyState::Waiting {
            self.busy_state = BusyState::Reading;
        }
        self.continue_reading(message);
    }

    fn continue_reading(&mut self, message: Message) {
        if message.is_complete() {
            self.message_received(message);
        } else {
            self.incoming = Some(message);
            self.read();
        }
    }

    fn message_received(&mut self, message: Message) {
        self.cancel_timeout();

        let payload = message.payload();
        match message.cmd() {
            Cmd::Msg | Cmd::Cbor => {
                self.state = State::Ready;
                self.current_token = None;
                if let Some(transaction) = self.pending.pop_front() {
                    debug!(
                        "{}: transaction {} complete ({} bytes)",
                        self.info.id(),
                        transaction.token,
                        payload.len()
                    );
                    self.actions.push_back(Action::Complete {
                        token: transaction.token,
                        response: Some(payload),
                    });
                }
                self.transition();
            }
            cmd => {
                let state = self.classify_hid_error(cmd, &payload);
                self.fail(state);
            }
        }
    }

    fn classify_hid_error(&self, cmd: Cmd, payload: &[u8]) -> State {
        if cmd != Cmd::Error || payload.len() != 1 {
            error!(
                "{}: unknown HID message received: {:?} {}",
                self.info.id(),
                cmd,
                hex::encode(payload)
            );
            return State::DeviceError;
        }

        match HidErrorCode::from_u8(payload[0]) {
            Some(code) if code.is_message_error() => {
                warn!("{}: HID message error {:?}", self.info.id(), code);
                State::MsgError
            }
            _ => {
                error!("{}: HID error received: {:#04x}", self.info.id(), payload[0]);
                State::DeviceError
            }
        }
    }

    fn write_cancel(&mut self) {
        let report_size = self.report_size();
        let cancel = Message::create(self.channel_id, Cmd::Cancel, report_size, &[])
            .ok()
            .and_then(|mut m| m.pop_next_packet());
        if let Some(packet) = cancel {
            debug!("{}: sending CANCEL", self.info.id());
            self.actions.push_back(Action::SendCancel {
                report_id: self.config.report_id,
                report: packet.to_report(report_size),
            });
        }
    }
}

impl FidoDevice for HidDevice {
    fn transact(&mut self, command: Vec<u8>) -> CancelToken {
        let token = CancelToken(self.next_token);
        self.next_token += 1;
        self.pending.push_back(PendingTransaction { command, token });
        self.transition();
        token
    }

    fn cancel(&mut self, token: CancelToken) {
        if self.state == State::Busy && self.current_token == Some(token) {
            // U2F has no cancel message and its requests do not block
            if self.supported_protocol != ProtocolVersion::Ctap2 {
                return;
            }
            match self.busy_state {
                BusyState::Writing => self.busy_state = BusyState::WritingPendingCancel,
                BusyState::Waiting => {
                    self.busy_state = BusyState::Reading;
                    self.write_cancel();
                }
                BusyState::WritingPendingCancel | BusyState::Reading => {}
            }
            return;
        }

        if let Some(index) = self.pending.iter().position(|t| t.token == token) {
            self.pending.remove(index);
            debug!("{}: cancelled queued transaction {}", self.info.id(), token);
            self.actions.push_back(Action::Complete {
                token,
                response: Some(vec![StatusCode::KeepAliveCancel.to_u8()]),
            });
        }
    }

    fn id(&self) -> String {
        self.info.id()
    }

    fn supported_protocol(&self) -> ProtocolVersion {
        self.supported_protocol
    }

    fn set_supported_protocol(&mut self, protocol: ProtocolVersion) {
        self.supported_protocol = protocol;
    }

    fn device_info(&self) -> Option<&AuthenticatorGetInfoResponse> {
        self.device_info.as_ref()
    }

    fn set_device_info(&mut self, info: AuthenticatorGetInfoResponse) {
        self.device_info = Some(info);
    }

    fn vid_pid(&self) -> Option<VidPid> {
        Some(self.info.vid_pid())
    }
}
