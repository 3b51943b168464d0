//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each [`DeviceEvent`] as one tagged
//! line to the ESP-IDF logger (UART / USB-CDC in production).

use log::{error, info, warn};

use crate::app::events::DeviceEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`DeviceEvent`] to the serial console.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &DeviceEvent) {
        match event {
            DeviceEvent::Started { client_id } => info!("START | client_id={}", client_id),
            DeviceEvent::Connected(broker) => info!("LINK  | up, broker={}", broker),
            DeviceEvent::ConnectionLost => warn!("LINK  | lost"),
            DeviceEvent::TickFailed { failures } => {
                warn!("LINK  | degraded, {} consecutive failures", failures);
            }
            DeviceEvent::Escalated { failures, ticks } => {
                error!("LINK  | escalating after {} failures ({} ticks)", failures, ticks);
            }
            DeviceEvent::RebootReasonDelivered(reason) => info!("INFO  | delivered '{}'", reason),
            DeviceEvent::AlivePublished { uptime } => info!("ALIVE | {}", uptime),
            DeviceEvent::PongSent { counter } => info!("PONG  | #{}", counter),
            DeviceEvent::ForceConfigRequested => warn!("CONF  | portal requested"),
            DeviceEvent::FirmwareStaged => info!("OTA   | image staged"),
            DeviceEvent::RestartScheduled(reason) => error!("BOOT  | restart: {}", reason),
        }
    }
}
