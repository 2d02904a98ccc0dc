//! Raw report I/O underneath a [`HidDevice`](crate::HidDevice)

use std::time::Duration;

use crate::error::Result;

/// A HID endpoint that can exchange fixed-size reports.
///
/// Implemented by the hidapi backend and by test doubles.
pub trait HidConnection {
    /// Open the endpoint
    fn connect(&mut self) -> Result<()>;

    /// Write one output report. `report` excludes the report ID.
    fn write(&mut self, report_id: u8, report: &[u8]) -> Result<()>;

    /// Read one input report.
    ///
    /// Returns `Ok(None)` if nothing arrived within `timeout`. `None` blocks
    /// until a report arrives.
    fn read(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>>;
}

impl<C: HidConnection + ?Sized> HidConnection for Box<C> {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn write(&mut self, report_id: u8, report: &[u8]) -> Result<()> {
        (**self).write(report_id, report)
    }

    fn read(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        (**self).read(timeout)
    }
}
