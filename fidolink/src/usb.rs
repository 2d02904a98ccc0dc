//! Opening connected security keys

use fidolink_transport::{enumerate, HidApiConnection, HidDevice, HidDeviceConfig, HidDriver};
use log::warn;

use crate::error::{Error, Result};

/// Open a driver for every FIDO device that can be opened
pub fn open_all(config: HidDeviceConfig) -> Result<Vec<HidDriver<HidApiConnection>>> {
    let mut drivers = Vec::new();
    for info in enumerate()? {
        match HidApiConnection::new(&info) {
            Ok(connection) => {
                drivers.push(HidDriver::new(HidDevice::with_config(info, config), connection))
            }
            Err(e) => warn!("{}: skipped: {}", info.id(), e),
        }
    }
    Ok(drivers)
}

/// Open the first FIDO device found
pub fn open_first(config: HidDeviceConfig) -> Result<HidDriver<HidApiConnection>> {
    open_all(config)?.into_iter().next().ok_or(Error::NoDevices)
}
