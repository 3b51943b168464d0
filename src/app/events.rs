//! Outbound device events.
//!
//! The [`Device`](super::service::Device) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them; on the device they go to the serial
//! log.

use crate::app::ports::BrokerEndpoint;

/// Structured events emitted by the device loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    /// Boot-time wiring finished; carries the MQTT client identifier.
    Started { client_id: String },

    /// Broker session established (boot or recovery).
    Connected(BrokerEndpoint),

    /// The session was found dead at the start of a tick.
    ConnectionLost,

    /// A reconnection attempt failed; `failures` consecutive so far.
    TickFailed { failures: u32 },

    /// The failure streak hit a multiple of the reboot threshold.
    Escalated { failures: u32, ticks: u64 },

    /// The reason for the previous reboot was published on the info topic.
    RebootReasonDelivered(String),

    /// Heartbeat published on the alive topic.
    AlivePublished { uptime: String },

    /// Reply to a ping published on the pong topic.
    PongSent { counter: u32 },

    /// An operator asked for the configuration portal on next boot.
    ForceConfigRequested,

    /// A verified firmware image is staged.
    FirmwareStaged,

    /// The loop decided to restart the chip.
    RestartScheduled(String),
}
