//! USB HID backend (hidapi)

use std::ffi::CString;
use std::time::Duration;

use hidapi::HidApi;
use log::{debug, info};

use crate::config::{HidDeviceInfo, VidPid};
use crate::connection::HidConnection;
use crate::ctaphid::HID_MAX_PACKET_SIZE;
use crate::error::{Error, Result};

/// FIDO alliance HID usage page
pub const FIDO_USAGE_PAGE: u16 = 0xF1D0;

/// CTAPHID usage within the FIDO page
pub const FIDO_USAGE_CTAPHID: u16 = 0x01;

fn io_error(e: hidapi::HidError) -> Error {
    Error::Io(e.to_string())
}

/// List connected FIDO security keys
pub fn enumerate() -> Result<Vec<HidDeviceInfo>> {
    let api = HidApi::new().map_err(io_error)?;

    let mut devices = Vec::new();
    for device in api.device_list() {
        if device.usage_page() != FIDO_USAGE_PAGE || device.usage() != FIDO_USAGE_CTAPHID {
            continue;
        }
        let path = device.path().to_string_lossy().into_owned();
        let vid_pid = VidPid::new(device.vendor_id(), device.product_id());
        debug!("found FIDO device {} at {}", vid_pid, path);
        devices.push(HidDeviceInfo::new(path, vid_pid, HID_MAX_PACKET_SIZE)?);
    }

    info!("{} FIDO device(s) found", devices.len());
    Ok(devices)
}

/// hidapi handle for one device path, opened on connect
pub struct HidApiConnection {
    path: CString,
    device: Option<hidapi::HidDevice>,
}

impl HidApiConnection {
    pub fn new(info: &HidDeviceInfo) -> Result<Self> {
        let path = CString::new(info.path()).map_err(|e| Error::Io(e.to_string()))?;
        Ok(Self { path, device: None })
    }

    fn device(&self) -> Result<&hidapi::HidDevice> {
        self.device
            .as_ref()
            .ok_or_else(|| Error::Io("device not open".into()))
    }
}

impl HidConnection for HidApiConnection {
    fn connect(&mut self) -> Result<()> {
        if self.device.is_some() {
            return Ok(());
        }
        let api = HidApi::new_without_enumerate().map_err(io_error)?;
        let device = api.open_path(&self.path).map_err(io_error)?;
        debug!("opened {}", self.path.to_string_lossy());
        self.device = Some(device);
        Ok(())
    }

    fn write(&mut self, report_id: u8, report: &[u8]) -> Result<()> {
        let mut buf = Vec::with_capacity(report.len() + 1);
        buf.push(report_id);
        buf.extend_from_slice(report);
        self.device()?.write(&buf).map_err(io_error)?;
        Ok(())
    }

    fn read(&mut self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        let timeout_ms = match timeout {
            Some(t) => i32::try_from(t.as_millis()).unwrap_or(i32::MAX),
            None => -1,
        };
        let mut buf = [0u8; HID_MAX_PACKET_SIZE];
        let len = self
            .device()?
            .read_timeout(&mut buf, timeout_ms)
            .map_err(io_error)?;
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(buf[..len].to_vec()))
    }
}
