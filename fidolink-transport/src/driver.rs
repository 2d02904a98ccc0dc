//! Blocking pump that executes [`HidDevice`] actions on a [`HidConnection`]

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::connection::HidConnection;
use crate::device::{Action, Event, HidDevice};
use crate::fido_device::{CancelToken, FidoDevice};

/// A finished transaction
pub type Completion = (CancelToken, Option<Vec<u8>>);

/// Drives one device over one connection on the calling thread.
///
/// The device timer is kept as a deadline and checked whenever the device
/// asks for I/O, so an expired timeout is reported instead of the next
/// write or read.
pub struct HidDriver<C> {
    device: HidDevice,
    connection: C,
    deadline: Option<Instant>,
    completions: VecDeque<Completion>,
}

impl<C: HidConnection> HidDriver<C> {
    pub fn new(device: HidDevice, connection: C) -> Self {
        Self {
            device,
            connection,
            deadline: None,
            completions: VecDeque::new(),
        }
    }

    pub fn device(&self) -> &HidDevice {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut HidDevice {
        &mut self.device
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    pub fn into_parts(self) -> (HidDevice, C) {
        (self.device, self.connection)
    }

    /// Run pending I/O until some transaction completes.
    ///
    /// Returns `None` once the device has nothing left to do.
    pub fn next_completion(&mut self) -> Option<Completion> {
        loop {
            if let Some(completion) = self.completions.pop_front() {
                return Some(completion);
            }
            let action = self.device.poll_action()?;
            self.execute(action);
        }
    }

    /// Submit `command` and block until its response arrives.
    ///
    /// Completions of other transactions seen meanwhile stay queued for
    /// [`next_completion`](Self::next_completion).
    pub fn transact_blocking(&mut self, command: Vec<u8>) -> Option<Vec<u8>> {
        let token = self.device.transact(command);
        let mut others = Vec::new();

        let response = loop {
            match self.next_completion() {
                Some((t, response)) if t == token => break response,
                Some(other) => others.push(other),
                None => break None,
            }
        };

        for other in others.into_iter().rev() {
            self.completions.push_front(other);
        }
        response
    }

    fn expired(&self) -> bool {
        self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    fn fire_timeout(&mut self) {
        self.deadline = None;
        self.device.handle_event(Event::Timeout);
    }

    fn execute(&mut self, action: Action) {
        match action {
            Action::Connect => {
                let connected = match self.connection.connect() {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("{}: connect failed: {}", self.device.id(), e);
                        false
                    }
                };
                self.device.handle_event(Event::Connected(connected));
            }
            Action::Write { report_id, report } => {
                if self.expired() {
                    self.fire_timeout();
                    return;
                }
                let written = match self.connection.write(report_id, &report) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("{}: write failed: {}", self.device.id(), e);
                        false
                    }
                };
                self.device.handle_event(Event::WriteComplete(written));
            }
            Action::SendCancel { report_id, report } => {
                if let Err(e) = self.connection.write(report_id, &report) {
                    debug!("{}: cancel write failed: {}", self.device.id(), e);
                }
            }
            Action::Read => self.read(),
            Action::ArmTimeout(timeout) => self.deadline = Some(Instant::now() + timeout),
            Action::CancelTimeout => self.deadline = None,
            Action::Complete { token, response } => self.completions.push_back((token, response)),
        }
    }

    fn read(&mut self) {
        loop {
            let remaining = self
                .deadline
                .map(|d| d.saturating_duration_since(Instant::now()));
            if remaining == Some(Duration::ZERO) {
                self.fire_timeout();
                return;
            }

            match self.connection.read(remaining) {
                Ok(Some(report)) => {
                    self.device.handle_event(Event::ReadComplete(Some(report)));
                    return;
                }
                // Loop until the deadline is reached
                Ok(None) if self.deadline.is_some() => continue,
                Ok(None) => {
                    warn!("{}: read returned nothing without a timeout", self.device.id());
                    self.device.handle_event(Event::ReadComplete(None));
                    return;
                }
                Err(e) => {
                    warn!("{}: read failed: {}", self.device.id(), e);
                    self.device.handle_event(Event::ReadComplete(None));
                    return;
                }
            }
        }
    }
}
