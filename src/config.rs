//! Device configuration parameters
//!
//! All tunable parameters for the node.  Identity defaults come from the
//! build environment (`PINGLINK_DEVICE_NAME`, `PINGLINK_TOPIC_PREFIX`,
//! `PINGLINK_OTA_PASSWORD`); every value can be overridden by a config
//! blob stored through [`ConfigPort`].

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::ports::{ConfigError, ConfigPort};

pub type NameString = heapless::String<32>;
pub type PrefixString = heapless::String<64>;
pub type SecretString = heapless::String<64>;
pub type ServiceString = heapless::String<16>;

const DEFAULT_DEVICE_NAME: &str = match option_env!("PINGLINK_DEVICE_NAME") {
    Some(name) => name,
    None => "pinglink",
};
const DEFAULT_TOPIC_PREFIX: &str = match option_env!("PINGLINK_TOPIC_PREFIX") {
    Some(prefix) => prefix,
    None => "pinglink",
};
const DEFAULT_OTA_PASSWORD: &str = match option_env!("PINGLINK_OTA_PASSWORD") {
    Some(password) => password,
    None => "change-me",
};

/// Core device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    // --- Identity ---
    /// Device name (mDNS hostname, client id and portal SSID stem)
    pub device_name: NameString,
    /// Prefix for the ping/pong/alive/info topics
    pub topic_prefix: PrefixString,
    /// Key for firmware push signatures
    pub ota_password: SecretString,

    // --- Liveness ---
    /// Consecutive failed ticks between reboot escalations
    pub reboot_after_failures: u32,
    /// Ticks between alive heartbeats
    pub heartbeat_interval_ticks: u32,
    /// Polling tick period (milliseconds)
    pub tick_interval_ms: u32,

    // --- Provisioning ---
    /// Station auto-connect timeout (seconds)
    pub wifi_connect_timeout_secs: u32,
    /// Configuration portal timeout (seconds)
    pub portal_timeout_secs: u32,

    // --- Network ---
    /// mDNS service type advertised by the broker
    pub broker_service: ServiceString,
    /// mDNS protocol of the broker service
    pub broker_proto: ServiceString,
    /// Bounded wait for the MQTT CONNACK (milliseconds)
    pub mqtt_connect_timeout_ms: u32,
    /// Bounded wait for mDNS answers (milliseconds)
    pub mdns_query_timeout_ms: u32,
    /// Diagnostic HTTP server port
    pub http_port: u16,

    // --- Supervision ---
    /// Task watchdog timeout (seconds)
    pub watchdog_timeout_secs: u32,
}

pub(crate) fn bounded<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    for c in s.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            // Identity
            device_name: bounded(DEFAULT_DEVICE_NAME),
            topic_prefix: bounded(DEFAULT_TOPIC_PREFIX),
            ota_password: bounded(DEFAULT_OTA_PASSWORD),

            // Liveness
            reboot_after_failures: 60,
            heartbeat_interval_ticks: 100,
            tick_interval_ms: 1000, // 1 Hz

            // Provisioning
            wifi_connect_timeout_secs: 60,
            portal_timeout_secs: 180,

            // Network
            broker_service: bounded("_mqtt"),
            broker_proto: bounded("_tcp"),
            mqtt_connect_timeout_ms: 5000,
            mdns_query_timeout_ms: 3000,
            http_port: 80,

            // Supervision
            watchdog_timeout_secs: 30,
        }
    }
}

impl DeviceConfig {
    /// Worst-case time one tick can spend in blocking network calls.
    pub fn worst_case_tick_ms(&self) -> u32 {
        self.tick_interval_ms
            .saturating_add(self.mqtt_connect_timeout_ms)
            .saturating_add(self.mdns_query_timeout_ms)
    }
}

/// Boot-time configuration.
///
/// A stored config wins.  Without one the defaults apply and nothing is
/// written, so the build-time identity stays in effect.  A stored blob that
/// fails to decode or validate is overwritten with the defaults.
pub fn load_or_repair(store: &impl ConfigPort) -> DeviceConfig {
    let rejected = match store.load() {
        Ok(cfg) => return cfg,
        Err(ConfigError::NotFound) => {
            info!("config: nothing stored, using defaults");
            false
        }
        Err(e @ (ConfigError::Corrupted | ConfigError::ValidationFailed(_))) => {
            warn!("config: stored config rejected ({}), restoring defaults", e);
            true
        }
        Err(e) => {
            warn!("config: load failed ({}), using defaults", e);
            false
        }
    };

    let cfg = DeviceConfig::default();
    if rejected {
        if let Err(e) = store.save(&cfg) {
            warn!("config: could not store defaults ({})", e);
        }
    }
    cfg
}
