//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter     | Implements         | Connects to                  |
//! |-------------|--------------------|------------------------------|
//! | `device_id` | -                  | eFuse base MAC               |
//! | `http`      | -                  | ESP-IDF HTTP server          |
//! | `log_sink`  | EventSink          | Serial log output            |
//! | `mdns`      | BrokerLocator      | ESP-IDF mDNS component       |
//! | `mqtt`      | MqttPort           | ESP-IDF MQTT client          |
//! | `nvs`       | ConfigPort         | NVS / in-memory store        |
//! |             | StoragePort        |                              |
//! | `ota`       | OtaPort            | esp-ota partition writer     |
//! | `platform`  | SystemPort         | ESP timer, STA netif, reset  |
//! | `time`      | -                  | ESP32 system timer           |
//! | `wifi`      | ProvisioningPort   | ESP-IDF Wi-Fi STA + SoftAP   |

pub mod device_id;
pub mod http;
pub mod log_sink;
pub mod mdns;
pub mod mqtt;
pub mod nvs;
pub mod ota;
pub mod platform;
pub mod time;
pub mod wifi;
