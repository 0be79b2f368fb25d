//! Device identity derived from the ESP32 factory MAC address.
//!
//! The default advertised name is `pinlink-xxyyzz` (last 3 bytes of the
//! 6-byte MAC in lowercase hex): stable across reboots and distinct
//! between boards on the same bench.

use core::fmt::Write;

use crate::config::MAX_DEVICE_NAME_LEN;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

pub type DeviceName = heapless::String<MAX_DEVICE_NAME_LEN>;

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is the 6 bytes the call writes.
    unsafe {
        esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// `pinlink-xxyyzz` from the last 3 MAC bytes.
pub fn hostname(mac: &MacAddress) -> DeviceName {
    let mut name = DeviceName::new();
    let _ = write!(name, "pinlink-{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    name
}

/// The configured name, or the MAC-derived one when none is set.
pub fn advertised_name(configured: &DeviceName) -> DeviceName {
    if configured.is_empty() {
        hostname(&read_mac())
    } else {
        configured.clone()
    }
}
