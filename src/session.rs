//! Broker connection session.
//!
//! Owns the MQTT transport and the broker locator.  Resolution and
//! connection failures are returned to the caller and never acted on
//! here; the liveness tracker decides what a failure means.
//!
//! On the first successful handshake of a boot the session subscribes to
//! the ping topic and drains the reboot journal onto the info topic.

use log::{info, warn};

use crate::app::ports::{BrokerEndpoint, BrokerLocator, MqttError, MqttPort, StoragePort};
use crate::config::{DeviceConfig, ServiceString};
use crate::error::{self, Error};
use crate::identity::ClientIdString;
use crate::journal::RebootJournal;
use crate::topics::TopicSet;

/// Mutated only by [`ConnectionSession`].
///
/// `connected` implies `broker` holds the endpoint of the last successful
/// handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionState {
    broker: Option<BrokerEndpoint>,
    connected: bool,
}

impl ConnectionState {
    pub fn broker(&self) -> Option<BrokerEndpoint> {
        self.broker
    }

    pub fn connected(&self) -> bool {
        self.connected
    }
}

pub struct ConnectionSession<M: MqttPort, L: BrokerLocator> {
    mqtt: M,
    locator: L,
    topics: TopicSet,
    client_id: ClientIdString,
    service: ServiceString,
    proto: ServiceString,
    state: ConnectionState,
}

impl<M: MqttPort, L: BrokerLocator> ConnectionSession<M, L> {
    pub fn new(
        mqtt: M,
        locator: L,
        topics: TopicSet,
        client_id: ClientIdString,
        config: &DeviceConfig,
    ) -> Self {
        Self {
            mqtt,
            locator,
            topics,
            client_id,
            service: config.broker_service.clone(),
            proto: config.broker_proto.clone(),
            state: ConnectionState::default(),
        }
    }

    /// Ask service discovery for the broker.
    pub fn resolve_broker(&mut self) -> Option<BrokerEndpoint> {
        let found = self.locator.resolve(&self.service, &self.proto);
        match found {
            Some(endpoint) => info!("session: broker at {}", endpoint),
            None => warn!("session: no {}.{} service answered", self.service, self.proto),
        }
        found
    }

    /// Handshake with `endpoint`.
    ///
    /// On success subscribes to the ping topic and publishes any pending
    /// reboot reason on the info topic; the delivered reason is returned.
    pub fn connect(
        &mut self,
        endpoint: BrokerEndpoint,
        journal: &mut RebootJournal,
        storage: &mut dyn StoragePort,
    ) -> Result<Option<String>, MqttError> {
        self.state.connected = false;
        self.state.broker = Some(endpoint);

        info!("session: connecting to {} as '{}'", endpoint, self.client_id);
        self.mqtt.connect(endpoint, &self.client_id)?;
        self.state.connected = true;
        info!("session: connected");

        let delivered = journal.drain_if_present(storage);
        if let Some(reason) = delivered.as_deref() {
            if let Err(e) = self.mqtt.publish(&self.topics.info, reason.as_bytes()) {
                warn!("session: reboot reason not published ({})", e);
            }
        }

        if let Err(e) = self.mqtt.subscribe(&self.topics.ping) {
            warn!("session: subscribe to {} failed ({})", self.topics.ping, e);
        }

        Ok(delivered)
    }

    /// Re-resolve the broker and connect to it.
    pub fn reconnect(
        &mut self,
        journal: &mut RebootJournal,
        storage: &mut dyn StoragePort,
    ) -> error::Result<Option<String>> {
        self.state.connected = false;
        let endpoint = self.resolve_broker().ok_or(Error::BrokerNotFound)?;
        Ok(self.connect(endpoint, journal, storage)?)
    }

    /// Cheap liveness check; never reconnects.
    pub fn is_connected(&self) -> bool {
        self.state.connected && self.mqtt.is_connected()
    }

    /// Record that the transport dropped.  Returns `true` if the session
    /// believed it was connected until now.
    pub fn note_disconnect(&mut self) -> bool {
        core::mem::replace(&mut self.state.connected, false)
    }

    /// Service the transport; `on_ping` runs once per message received on
    /// the ping topic.  Call every tick, connected or not.
    pub fn tick(&mut self, mut on_ping: impl FnMut(&[u8])) {
        let ping = &self.topics.ping;
        self.mqtt.poll(&mut |topic, payload| {
            if topic == ping.as_str() {
                on_ping(payload);
            }
        });
    }

    pub fn publish_pong(&mut self, text: &str) -> Result<(), MqttError> {
        self.mqtt.publish(&self.topics.pong, text.as_bytes())
    }

    pub fn publish_alive(&mut self, uptime: &str) -> Result<(), MqttError> {
        self.mqtt.publish(&self.topics.alive, uptime.as_bytes())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn topics(&self) -> &TopicSet {
        &self.topics
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[cfg(test)]
    pub(crate) fn mqtt(&self) -> &M {
        &self.mqtt
    }

    #[cfg(test)]
    pub(crate) fn mqtt_mut(&mut self) -> &mut M {
        &mut self.mqtt
    }
}
