//! Immutable device identity.
//!
//! Built once at boot from the configuration and the factory MAC; every
//! network-facing name (client id, portal SSID, mDNS hostname) is derived
//! from it.

use core::fmt::Write;

use crate::adapters::device_id::{MacAddress, MacSuffix, mac_suffix};
use crate::config::{DeviceConfig, NameString, PrefixString, SecretString};

/// Client id / portal SSID: name (≤32) + '-' + suffix (6).
pub type ClientIdString = heapless::String<40>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    name: NameString,
    topic_prefix: PrefixString,
    ota_password: SecretString,
    hw_suffix: MacSuffix,
}

impl DeviceIdentity {
    pub fn new(config: &DeviceConfig, mac: &MacAddress) -> Self {
        Self {
            name: config.device_name.clone(),
            topic_prefix: config.topic_prefix.clone(),
            ota_password: config.ota_password.clone(),
            hw_suffix: mac_suffix(mac),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn ota_password(&self) -> &str {
        &self.ota_password
    }

    /// MQTT client identifier; the hardware suffix keeps two devices with
    /// the same name from kicking each other off the broker.
    pub fn client_id(&self) -> ClientIdString {
        let mut id = ClientIdString::new();
        let _ = write!(id, "{}-{}", self.name, self.hw_suffix);
        id
    }

    /// SSID of the provisioning access point.
    pub fn portal_ssid(&self) -> ClientIdString {
        self.client_id()
    }

    /// mDNS hostname (`<name>.local`).
    pub fn hostname(&self) -> &str {
        &self.name
    }
}
