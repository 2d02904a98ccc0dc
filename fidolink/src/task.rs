//! Multi-step work against one device

use std::time::Duration;

use fidolink_transport::{CancelToken, FidoDevice};

/// Progress reported by a task after each step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus<T> {
    /// Waiting for a transaction to complete
    Pending,
    /// Call [`FidoTask::resume`] after the delay
    Wait(Duration),
    /// Finished with a result
    Complete(T),
}

impl<T> TaskStatus<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, TaskStatus::Complete(_))
    }
}

/// A state machine that issues transactions on a device and reacts to their
/// completions.
///
/// Completions for tokens the task did not issue must be ignored.
pub trait FidoTask {
    type Output;

    fn start(&mut self, device: &mut dyn FidoDevice) -> TaskStatus<Self::Output>;

    fn on_response(
        &mut self,
        device: &mut dyn FidoDevice,
        token: CancelToken,
        response: Option<Vec<u8>>,
    ) -> TaskStatus<Self::Output>;

    /// Continue after a [`TaskStatus::Wait`]
    fn resume(&mut self, _device: &mut dyn FidoDevice) -> TaskStatus<Self::Output> {
        TaskStatus::Pending
    }

    /// Ask the active sub-operation to stop
    fn cancel(&mut self, device: &mut dyn FidoDevice);
}
