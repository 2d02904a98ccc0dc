//! Blocking execution of tasks on a driven device

use fidolink_ctap::{
    AuthenticatorGetAssertionResponse, CtapGetAssertionRequest, ProtocolVersion, StatusCode,
};
use fidolink_transport::{FidoDevice, HidConnection, HidDriver};
use log::trace;

use crate::discovery::{ForceU2fList, ProtocolDiscovery};
use crate::error::{Error, Result};
use crate::get_assertion_task::GetAssertionTask;
use crate::task::{FidoTask, TaskStatus};

/// Run `task` until it completes, blocking on device I/O and retry delays
pub fn run_task<C, T>(driver: &mut HidDriver<C>, task: &mut T) -> Result<T::Output>
where
    C: HidConnection,
    T: FidoTask + ?Sized,
{
    let mut status = task.start(driver.device_mut());
    loop {
        status = match status {
            TaskStatus::Complete(output) => return Ok(output),
            TaskStatus::Wait(delay) => {
                trace!("waiting {:?}", delay);
                std::thread::sleep(delay);
                task.resume(driver.device_mut())
            }
            TaskStatus::Pending => {
                let Some((token, response)) = driver.next_completion() else {
                    return Err(Error::Stalled);
                };
                task.on_response(driver.device_mut(), token, response)
            }
        };
    }
}

/// Find out which protocol the device speaks
pub fn discover_protocol<C: HidConnection>(
    driver: &mut HidDriver<C>,
    force_u2f: ForceU2fList,
) -> Result<ProtocolVersion> {
    run_task(driver, &mut ProtocolDiscovery::new(force_u2f))
}

/// Run a full GetAssertion ceremony.
///
/// Discovers the protocol first if that has not happened yet. Any status
/// other than success is returned as [`Error::Ctap`].
pub fn get_assertion<C: HidConnection>(
    driver: &mut HidDriver<C>,
    request: CtapGetAssertionRequest,
    force_u2f: ForceU2fList,
) -> Result<AuthenticatorGetAssertionResponse> {
    let mut task = GetAssertionTask::new(request)?;
    if driver.device().supported_protocol() == ProtocolVersion::Unknown {
        discover_protocol(driver, force_u2f)?;
    }

    match run_task(driver, &mut task)? {
        (status, Some(assertion)) if status.is_success() => Ok(assertion),
        (status, _) if status.is_success() => Err(Error::Ctap(StatusCode::Other)),
        (status, _) => Err(Error::Ctap(status)),
    }
}
