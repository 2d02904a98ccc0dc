//! Device identity and transport configuration

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::ctaphid::{validate_report_size, INIT_HEADER_SIZE, INIT_REPLY_SIZE};
use crate::error::{Error, Result};

/// Timeout armed for every connect, write and read of a transaction
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// HID report ID used for CTAPHID reports
pub const DEFAULT_REPORT_ID: u8 = 0x00;

/// Smallest report that holds a complete INIT reply
pub const MIN_DEVICE_REPORT_SIZE: usize = INIT_HEADER_SIZE + INIT_REPLY_SIZE;

/// USB vendor and product id, formatted like `lsusb` does (`10c4:8acf`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VidPid {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl VidPid {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for VidPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

impl FromStr for VidPid {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (vid, pid) = s.split_once(':').unwrap_or((s, ""));
        Ok(Self::new(
            u16::from_str_radix(vid, 16)?,
            u16::from_str_radix(pid, 16)?,
        ))
    }
}

/// Identity of one physical HID endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidDeviceInfo {
    path: String,
    vid_pid: VidPid,
    max_output_report_size: usize,
}

impl HidDeviceInfo {
    /// Fails if the report size exceeds 64 bytes or cannot carry the INIT
    /// handshake in one packet. The handshake is never fragmented, so a
    /// device needs room for the 17-byte reply after the init header.
    pub fn new(
        path: impl Into<String>,
        vid_pid: VidPid,
        max_output_report_size: usize,
    ) -> Result<Self> {
        validate_report_size(max_output_report_size)?;
        if max_output_report_size < MIN_DEVICE_REPORT_SIZE {
            return Err(Error::InvalidReportSize(max_output_report_size));
        }
        Ok(Self {
            path: path.into(),
            vid_pid,
            max_output_report_size,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn vid_pid(&self) -> VidPid {
        self.vid_pid
    }

    pub fn max_output_report_size(&self) -> usize {
        self.max_output_report_size
    }

    /// Stable identifier: `hid:<path>`
    pub fn id(&self) -> String {
        format!("hid:{}", self.path)
    }
}

/// Transport tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidDeviceConfig {
    pub timeout: Duration,
    pub report_id: u8,
}

impl Default for HidDeviceConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            report_id: DEFAULT_REPORT_ID,
        }
    }
}

impl HidDeviceConfig {
    pub fn builder() -> HidDeviceConfigBuilder {
        HidDeviceConfigBuilder::default()
    }
}

/// Builder for HidDeviceConfig
#[derive(Default)]
pub struct HidDeviceConfigBuilder {
    timeout: Option<Duration>,
    report_id: Option<u8>,
}

impl HidDeviceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn report_id(mut self, report_id: u8) -> Self {
        self.report_id = Some(report_id);
        self
    }

    pub fn build(self) -> HidDeviceConfig {
        HidDeviceConfig {
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            report_id: self.report_id.unwrap_or(DEFAULT_REPORT_ID),
        }
    }
}
