//! Fixed mapping from sensor address to its live state.

use crate::device::DeviceState;
use crate::mac_address::MacAddress;
use std::collections::BTreeMap;

/// All registered devices. Built once at start-up; afterwards only the
/// per-device counters change.
#[derive(Debug, Default)]
pub struct Registry {
    devices: BTreeMap<MacAddress, DeviceState>,
}

impl Registry {
    pub fn new(devices: impl IntoIterator<Item = (MacAddress, DeviceState)>) -> Self {
        Self {
            devices: devices.into_iter().collect(),
        }
    }

    pub fn lookup(&mut self, mac: &MacAddress) -> Option<&mut DeviceState> {
        self.devices.get_mut(mac)
    }

    /// True when every device has published during the current duty cycle.
    pub fn all_published(&self) -> bool {
        self.devices.values().all(|d| d.window_published)
    }

    pub fn reset_all_window_flags(&mut self) {
        for device in self.devices.values_mut() {
            device.window_published = false;
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MacAddress, &DeviceState)> {
        self.devices.iter()
    }
}
