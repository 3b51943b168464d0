//! Inbound control signals for the device loop.
//!
//! These represent actions requested by the outside world (the HTTP
//! diagnostic surface) that the [`Device`](super::service::Device)
//! consumes at the start of its next tick.  Inbound MQTT pings do not go
//! through here; they are dispatched synchronously while the session is
//! serviced.

/// Signals that external adapters can send into the device loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Persist the force-config marker and restart into the portal.
    ForceConfig,
}
