//! MQTT transport adapter.
//!
//! Wraps `EspMqttClient` on the device.  The client delivers events on its
//! own task; the callback only flips the connected flag and queues inbound
//! messages on an `embassy-sync` channel, which [`MqttPort::poll`] drains
//! inside the polling tick.
//!
//! ```text
//!  esp-mqtt task ──(callback)──▶ Inbox { connected, Channel<Inbound> }
//!                                           │
//!  Device::tick ──▶ MqttPort::poll ─────────┘ (drain, dispatch)
//! ```
//!
//! The simulation backend accepts every connect and records publishes,
//! for running the firmware loop on a host.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, info, warn};

use crate::app::ports::{BrokerEndpoint, MqttError, MqttPort};

const INBOUND_DEPTH: usize = 8;

/// One queued inbound message.
pub struct Inbound {
    pub topic: heapless::String<80>,
    pub payload: heapless::Vec<u8, 128>,
}

/// State shared with the client callback.
struct Inbox {
    connected: AtomicBool,
    queue: Channel<CriticalSectionRawMutex, Inbound, INBOUND_DEPTH>,
}

impl Inbox {
    const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            queue: Channel::new(),
        }
    }

    fn enqueue(&self, topic: &str, payload: &[u8]) {
        let mut msg = Inbound {
            topic: heapless::String::new(),
            payload: heapless::Vec::new(),
        };
        if msg.topic.push_str(topic).is_err() {
            warn!("mqtt: dropping message on over-long topic");
            return;
        }
        let take = payload.len().min(msg.payload.capacity());
        let _ = msg.payload.extend_from_slice(&payload[..take]);
        if self.queue.try_send(msg).is_err() {
            warn!("mqtt: inbound queue full, dropping message on {}", topic);
        }
    }
}

pub struct MqttAdapter {
    inbox: Arc<Inbox>,
    connect_timeout_ms: u32,
    #[cfg(target_os = "espidf")]
    client: Option<esp_idf_svc::mqtt::client::EspMqttClient<'static>>,
    #[cfg(not(target_os = "espidf"))]
    published: Vec<(String, Vec<u8>)>,
}

impl MqttAdapter {
    pub fn new(connect_timeout_ms: u32) -> Self {
        Self {
            inbox: Arc::new(Inbox::new()),
            connect_timeout_ms,
            #[cfg(target_os = "espidf")]
            client: None,
            #[cfg(not(target_os = "espidf"))]
            published: Vec::new(),
        }
    }

    /// Block until the callback reports a session, or the timeout expires.
    fn wait_connected(&self) -> bool {
        const STEP_MS: u32 = 50;
        let mut waited = 0;
        while waited < self.connect_timeout_ms {
            if self.inbox.connected.load(Ordering::Acquire) {
                return true;
            }
            std::thread::sleep(core::time::Duration::from_millis(u64::from(STEP_MS)));
            waited += STEP_MS;
        }
        self.inbox.connected.load(Ordering::Acquire)
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_connect(&mut self, endpoint: BrokerEndpoint, client_id: &str) -> Result<(), MqttError> {
        use core::time::Duration;
        use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration};

        // Drop any previous client first; it owns its own socket and task.
        self.client = None;
        self.inbox.connected.store(false, Ordering::Release);

        let url = format!("mqtt://{}:{}", endpoint.address, endpoint.port);
        let conf = MqttClientConfiguration {
            client_id: Some(client_id),
            keep_alive_interval: Some(Duration::from_secs(15)),
            network_timeout: Duration::from_millis(u64::from(self.connect_timeout_ms)),
            ..Default::default()
        };

        let inbox = self.inbox.clone();
        let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => inbox.connected.store(true, Ordering::Release),
            EventPayload::Disconnected => inbox.connected.store(false, Ordering::Release),
            EventPayload::Received {
                topic: Some(topic),
                data,
                ..
            } => inbox.enqueue(topic, data),
            EventPayload::Error(e) => log::warn!("mqtt: client error {:?}", e),
            _ => {}
        })
        .map_err(|e| {
            warn!("mqtt: client init failed ({:?})", e);
            MqttError::ConnectFailed
        })?;
        self.client = Some(client);
        Ok(())
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_connect(&mut self, endpoint: BrokerEndpoint, client_id: &str) -> Result<(), MqttError> {
        info!("mqtt(sim): {} connected to {}", client_id, endpoint);
        self.inbox.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Simulation: every message published so far.
    #[cfg(not(target_os = "espidf"))]
    pub fn published(&self) -> &[(String, Vec<u8>)] {
        &self.published
    }

    /// Simulation: inject an inbound message as the client task would.
    #[cfg(not(target_os = "espidf"))]
    pub fn inject(&self, topic: &str, payload: &[u8]) {
        self.inbox.enqueue(topic, payload);
    }

    /// Simulation: drop the session as a broker restart would.
    #[cfg(not(target_os = "espidf"))]
    pub fn drop_session(&self) {
        self.inbox.connected.store(false, Ordering::Release);
    }
}

impl MqttPort for MqttAdapter {
    fn connect(&mut self, endpoint: BrokerEndpoint, client_id: &str) -> Result<(), MqttError> {
        self.platform_connect(endpoint, client_id)?;
        if self.wait_connected() {
            Ok(())
        } else {
            warn!("mqtt: no CONNACK from {} within {} ms", endpoint, self.connect_timeout_ms);
            Err(MqttError::ConnectFailed)
        }
    }

    fn is_connected(&self) -> bool {
        self.inbox.connected.load(Ordering::Acquire)
    }

    #[cfg(target_os = "espidf")]
    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        use esp_idf_svc::mqtt::client::QoS;
        let client = self.client.as_mut().ok_or(MqttError::NotConnected)?;
        client
            .subscribe(topic, QoS::AtMostOnce)
            .map(|_| info!("mqtt: subscribed to {}", topic))
            .map_err(|_| MqttError::SubscribeFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        info!("mqtt(sim): subscribed to {}", topic);
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        use esp_idf_svc::mqtt::client::QoS;
        let client = self.client.as_mut().ok_or(MqttError::NotConnected)?;
        client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .map(|_| debug!("mqtt: → {} ({} bytes)", topic, payload.len()))
            .map_err(|_| MqttError::PublishFailed)
    }

    #[cfg(not(target_os = "espidf"))]
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        if !self.is_connected() {
            return Err(MqttError::NotConnected);
        }
        debug!("mqtt(sim): → {} ({} bytes)", topic, payload.len());
        self.published.push((topic.to_owned(), payload.to_vec()));
        Ok(())
    }

    fn poll(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) {
        while let Ok(msg) = self.inbox.queue.try_receive() {
            debug!("mqtt: ← {} ({} bytes)", msg.topic, msg.payload.len());
            on_message(&msg.topic, &msg.payload);
        }
    }
}
