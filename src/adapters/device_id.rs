//! Hardware-unique suffix derived from the ESP32 factory MAC address.
//!
//! The suffix is the last 3 bytes of the 6-byte MAC in lowercase hex
//! (`aabbcc`).  It is:
//! - Deterministic across reboots (factory-burned eFuse MAC)
//! - Appended to the device name to form the MQTT client identifier
//! - Appended to the device name to form the provisioning portal SSID

/// Six hex digits.
pub type MacSuffix = heapless::String<8>;

/// Full 6-byte MAC address.
pub type MacAddress = [u8; 6];

/// Read the factory MAC address from eFuse.
#[cfg(target_os = "espidf")]
pub fn read_mac() -> MacAddress {
    let mut mac: MacAddress = [0u8; 6];
    // SAFETY: the buffer is exactly the 6 bytes the call writes.
    let ret = unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if ret != esp_idf_svc::sys::ESP_OK as esp_idf_svc::sys::esp_err_t {
        log::warn!("device_id: eFuse MAC read failed ({}), using zeros", ret);
    }
    mac
}

/// Simulation: returns a deterministic fake MAC.
#[cfg(not(target_os = "espidf"))]
pub fn read_mac() -> MacAddress {
    [0xDE, 0xAD, 0xBE, 0xEF, 0xCA, 0xFE]
}

/// Derive the hardware suffix from the last 3 MAC bytes.
pub fn mac_suffix(mac: &MacAddress) -> MacSuffix {
    let mut suffix = MacSuffix::new();
    use core::fmt::Write;
    let _ = write!(suffix, "{:02x}{:02x}{:02x}", mac[3], mac[4], mac[5]);
    suffix
}
