//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Device (domain)
//! ```
//!
//! Driven adapters (MQTT client, mDNS, NVS, Wi-Fi, OTA) implement these
//! traits.  The [`Device`](super::service::Device) and the
//! [`ConnectionSession`](crate::session::ConnectionSession) consume them via
//! generics, so the domain core never touches the network stack directly.
//!
//! ## Timing
//!
//! Every port method is called from the polling tick and must return in
//! bounded time.  Adapters that wrap blocking vendor calls apply their own
//! timeouts (see [`DeviceConfig`](crate::config::DeviceConfig)).

use core::fmt;
use core::net::Ipv4Addr;
use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::DeviceConfig;

// ───────────────────────────────────────────────────────────────
// Broker discovery
// ───────────────────────────────────────────────────────────────

/// Network address of a discovered MQTT broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerEndpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

impl fmt::Display for BrokerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// Resolves the broker through network service discovery.
pub trait BrokerLocator {
    /// Look up the first instance advertising `service`.`proto`
    /// (e.g. `_mqtt`.`_tcp`).  `None` when nothing answers.
    fn resolve(&mut self, service: &str, proto: &str) -> Option<BrokerEndpoint>;
}

// ───────────────────────────────────────────────────────────────
// MQTT transport
// ───────────────────────────────────────────────────────────────

/// Publish/subscribe transport to the broker.
pub trait MqttPort {
    /// Perform the connect handshake against `endpoint`.
    fn connect(&mut self, endpoint: BrokerEndpoint, client_id: &str) -> Result<(), MqttError>;

    /// Cheap liveness check; never reconnects.
    fn is_connected(&self) -> bool;

    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError>;

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError>;

    /// Service keepalives and hand every queued inbound message to
    /// `on_message`.  Must be called on every tick regardless of
    /// connection state.
    fn poll(&mut self, on_message: &mut dyn FnMut(&str, &[u8]));
}

// ───────────────────────────────────────────────────────────────
// System services
// ───────────────────────────────────────────────────────────────

/// Clock and network identity of the running device.
pub trait SystemPort {
    /// Milliseconds since boot (monotonic).
    fn uptime_ms(&self) -> u64;

    /// Current station IPv4 address, if the interface is up.
    fn local_ip(&self) -> Option<Ipv4Addr>;
}

// ───────────────────────────────────────────────────────────────
// OTA boundary
// ───────────────────────────────────────────────────────────────

/// Progress of an over-the-air update as seen from the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStatus {
    Idle,
    InProgress,
    /// A verified image is staged; the device must restart into it.
    ReadyToReboot,
}

/// Serviced once per tick so a completed update is never missed.
pub trait OtaPort {
    fn poll(&self) -> OtaStatus;
}

// ───────────────────────────────────────────────────────────────
// Provisioning boundary
// ───────────────────────────────────────────────────────────────

/// Wi-Fi station bring-up.  Both paths block for at most `timeout`.
pub trait ProvisioningPort {
    /// Join the network with previously stored credentials.
    fn auto_connect(&mut self, ap_name: &str, timeout: Duration)
    -> Result<Ipv4Addr, ProvisioningError>;

    /// Present the configuration portal unconditionally, then join the
    /// network entered there.
    fn start_config_portal(
        &mut self,
        ap_name: &str,
        timeout: Duration,
    ) -> Result<Ipv4Addr, ProvisioningError>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / telemetry)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`DeviceEvent`](super::events::DeviceEvent)s
/// through this port.  Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &super::events::DeviceEvent);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists device configuration.
///
/// Implementations MUST validate before persisting and again on load;
/// out-of-range values are rejected with [`ConfigError::ValidationFailed`],
/// not clamped.
pub trait ConfigPort {
    /// Load configuration from persistent storage.
    /// [`ConfigError::NotFound`] when nothing was ever stored.
    fn load(&self) -> Result<DeviceConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &DeviceConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage for the reboot journal, the force-config
/// marker and the stored configuration.
///
/// - Keys are namespaced to prevent collisions between subsystems.
/// - Write operations MUST be atomic, no partial writes on power loss.
///   The ESP-IDF NVS API guarantees this natively.
pub trait StoragePort {
    /// Read a value.  Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key.  Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`ConfigPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// No config found in storage (first boot).
    NotFound,
    /// Stored config failed integrity / deserialization check.
    Corrupted,
    /// A config field failed range validation.
    /// The `&'static str` describes which field and why.
    ValidationFailed(&'static str),
    /// Underlying storage is full.
    StorageFull,
    /// Generic I/O error from the storage backend.
    IoError,
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Store not mounted / initialised.
    Unavailable,
    /// Generic I/O error.
    IoError,
}

/// Errors from [`MqttPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttError {
    /// Broker refused or never acknowledged the handshake.
    ConnectFailed,
    /// Operation requires an established session.
    NotConnected,
    SubscribeFailed,
    PublishFailed,
}

/// Errors from [`ProvisioningPort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningError {
    InvalidSsid,
    InvalidPassword,
    /// The bounded wait elapsed without an IP address.
    Timeout,
    /// The Wi-Fi driver rejected a configuration or start request.
    DriverFailed,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted => write!(f, "config corrupted"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {}", msg),
            Self::StorageFull => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::Unavailable => write!(f, "storage unavailable"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl fmt::Display for MqttError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed => write!(f, "MQTT connect failed"),
            Self::NotConnected => write!(f, "MQTT not connected"),
            Self::SubscribeFailed => write!(f, "MQTT subscribe failed"),
            Self::PublishFailed => write!(f, "MQTT publish failed"),
        }
    }
}

impl fmt::Display for ProvisioningError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSsid => write!(f, "SSID invalid (must be 1-32 printable ASCII bytes)"),
            Self::InvalidPassword => {
                write!(f, "password invalid (must be 8-64 bytes for WPA2, or empty for open)")
            }
            Self::Timeout => write!(f, "timed out waiting for an IP address"),
            Self::DriverFailed => write!(f, "Wi-Fi driver error"),
        }
    }
}
