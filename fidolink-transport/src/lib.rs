//! CTAPHID transport
//!
//! This crate moves byte-level CTAP transactions over USB HID:
//! - CTAPHID message framing, fragmentation and reassembly ([`ctaphid`])
//! - a sans-IO device state machine with channel allocation, a FIFO of
//!   transactions, cancellation and keep-alive handling ([`HidDevice`])
//! - a blocking driver that pumps the state machine over a [`HidConnection`]
//! - a hidapi backend behind the `usb` feature
//!
//! Spec: <https://fidoalliance.org/specs/fido-v2.2-rd-20230321/fido-client-to-authenticator-protocol-v2.2-rd-20230321.html#usb>

pub mod config;
pub mod connection;
pub mod ctaphid;
pub mod device;
pub mod driver;
pub mod error;
pub mod fido_device;

#[cfg(feature = "usb")]
pub mod hid;

// Re-export commonly used types
pub use config::{HidDeviceConfig, HidDeviceConfigBuilder, HidDeviceInfo, VidPid};
pub use connection::HidConnection;
pub use ctaphid::{Cmd, InitReply, Message, Packet};
pub use device::{Action, BusyState, Event, HidDevice, State};
pub use driver::{Completion, HidDriver};
pub use error::{Error, Result};
pub use fido_device::{CancelToken, FidoDevice};

#[cfg(feature = "usb")]
pub use hid::{enumerate, HidApiConnection};
