//! FIDO2 / U2F security key client
//!
//! Device operations and the GetAssertion ceremony on top of the CTAPHID
//! transport:
//! - [`Ctap2DeviceOperation`]: one CTAP2 request/response exchange
//! - [`ProtocolDiscovery`]: GetInfo probe deciding between CTAP2 and U2F
//! - [`U2fSignOperation`]: assertion over CTAP1/U2F
//! - [`GetAssertionTask`]: silent credential probing, U2F fallback and the
//!   dummy touch on failure
//!
//! Tasks are sans-IO state machines implementing [`FidoTask`]; [`run_task`]
//! drives one to completion over a blocking [`HidDriver`].
//!
//! ```no_run
//! # #[cfg(feature = "usb")]
//! # fn main() -> fidolink::Result<()> {
//! use fidolink::{get_assertion, ForceU2fList};
//! use fidolink::ctap::{ClientDataHash, CtapGetAssertionRequest, PublicKeyCredentialDescriptor};
//! use fidolink::transport::HidDeviceConfig;
//!
//! let mut driver = fidolink::usb::open_first(HidDeviceConfig::default())?;
//! let request = CtapGetAssertionRequest::new("example.com", ClientDataHash::new([0; 32]))
//!     .with_allow_list(vec![PublicKeyCredentialDescriptor::new(vec![1, 2, 3])]);
//! let assertion = get_assertion(&mut driver, request, ForceU2fList::default())?;
//! println!("signature: {:02x?}", assertion.signature);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "usb"))]
//! # fn main() {}
//! ```

pub mod discovery;
pub mod error;
pub mod get_assertion_task;
pub mod operation;
pub mod runner;
pub mod task;
pub mod u2f_sign;

#[cfg(feature = "usb")]
pub mod usb;

#[cfg(test)]
mod testing;

pub use fidolink_ctap as ctap;
pub use fidolink_transport as transport;

// Re-export main types at root level for convenience
pub use discovery::{ForceU2fList, ProtocolDiscovery};
pub use error::{Error, Result};
pub use get_assertion_task::{GetAssertionResult, GetAssertionTask};
pub use operation::{Ctap2DeviceOperation, ResponseParser};
pub use runner::{discover_protocol, get_assertion, run_task};
pub use task::{FidoTask, TaskStatus};
pub use u2f_sign::U2fSignOperation;
