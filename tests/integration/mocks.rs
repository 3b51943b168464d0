//! Mock port adapters for integration tests.
//!
//! Every mock records what the device did to it so tests can assert on
//! the full history without a broker, a radio or flash.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use pinglink::app::events::DeviceEvent;
use pinglink::app::ports::{
    BrokerEndpoint, BrokerLocator, EventSink, MqttError, MqttPort, OtaPort, OtaStatus,
    ProvisioningError, ProvisioningPort, StorageError, StoragePort, SystemPort,
};
use pinglink::app::service::Device;
use pinglink::config::DeviceConfig;
use pinglink::control::ControlInbox;
use pinglink::identity::DeviceIdentity;
use pinglink::session::ConnectionSession;
use pinglink::topics::TopicSet;

pub const BROKER: BrokerEndpoint = BrokerEndpoint {
    address: Ipv4Addr::new(192, 168, 1, 10),
    port: 1883,
};
pub const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 42);
pub const MAC: [u8; 6] = [0x24, 0x6F, 0x28, 0x0A, 0x0B, 0x0C];

// ── MQTT ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockMqtt {
    /// Whether a connect attempt would succeed.
    pub broker_up: bool,
    link: bool,
    pub connects: u32,
    pub polls: u32,
    pub subscriptions: Vec<String>,
    pub published: Vec<(String, String)>,
    /// Publishes left to reject before the broker accepts them again.
    pub reject_publishes: u32,
    inbound: VecDeque<(String, Vec<u8>)>,
}

#[allow(dead_code)]
impl MockMqtt {
    pub fn up() -> Self {
        Self {
            broker_up: true,
            ..Self::default()
        }
    }

    pub fn down() -> Self {
        Self::default()
    }

    /// Transport drops as a broker restart would.
    pub fn drop_link(&mut self) {
        self.link = false;
    }

    pub fn inject(&mut self, topic: &str, payload: &[u8]) {
        self.inbound.push_back((topic.to_owned(), payload.to_vec()));
    }

    pub fn published_on(&self, topic: &str) -> Vec<String> {
        self.published
            .iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

/// Handle the device owns; the rig keeps another on the same broker.
#[derive(Debug, Clone, Default)]
pub struct SharedMqtt(Rc<RefCell<MockMqtt>>);

impl MqttPort for SharedMqtt {
    fn connect(&mut self, endpoint: BrokerEndpoint, client_id: &str) -> Result<(), MqttError> {
        self.0.borrow_mut().connect(endpoint, client_id)
    }

    fn is_connected(&self) -> bool {
        self.0.borrow().is_connected()
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        self.0.borrow_mut().subscribe(topic)
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        self.0.borrow_mut().publish(topic, payload)
    }

    fn poll(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) {
        // Drain first so the callback never runs under the borrow.
        let inbound: Vec<_> = {
            let mut mqtt = self.0.borrow_mut();
            mqtt.polls += 1;
            mqtt.inbound.drain(..).collect()
        };
        for (topic, payload) in inbound {
            on_message(&topic, &payload);
        }
    }
}

impl MqttPort for MockMqtt {
    fn connect(&mut self, _endpoint: BrokerEndpoint, _client_id: &str) -> Result<(), MqttError> {
        self.connects += 1;
        self.link = self.broker_up;
        if self.broker_up {
            Ok(())
        } else {
            Err(MqttError::ConnectFailed)
        }
    }

    fn is_connected(&self) -> bool {
        self.link
    }

    fn subscribe(&mut self, topic: &str) -> Result<(), MqttError> {
        if !self.link {
            return Err(MqttError::NotConnected);
        }
        self.subscriptions.push(topic.to_owned());
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), MqttError> {
        if !self.link {
            return Err(MqttError::NotConnected);
        }
        if self.reject_publishes > 0 {
            self.reject_publishes -= 1;
            return Err(MqttError::PublishFailed);
        }
        self.published
            .push((topic.to_owned(), String::from_utf8_lossy(payload).into_owned()));
        Ok(())
    }

    fn poll(&mut self, on_message: &mut dyn FnMut(&str, &[u8])) {
        self.polls += 1;
        while let Some((topic, payload)) = self.inbound.pop_front() {
            on_message(&topic, &payload);
        }
    }
}

// ── Discovery ─────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MockLocator {
    pub answer: Option<BrokerEndpoint>,
    pub queries: u32,
}

impl MockLocator {
    pub fn found() -> Self {
        Self {
            answer: Some(BROKER),
            queries: 0,
        }
    }
}

impl BrokerLocator for MockLocator {
    fn resolve(&mut self, _service: &str, _proto: &str) -> Option<BrokerEndpoint> {
        self.queries += 1;
        self.answer
    }
}

// ── Storage ───────────────────────────────────────────────────

/// Flash shared by every clone, so a clone taken before boot or after a
/// restart sees what the device wrote.
#[derive(Debug, Default, Clone)]
pub struct MemStorage {
    data: Rc<RefCell<HashMap<String, Vec<u8>>>>,
    /// Every operation fails with `IoError`.
    pub broken: bool,
}

#[allow(dead_code)]
impl MemStorage {
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    pub fn get(&self, ns: &str, key: &str) -> Option<Vec<u8>> {
        self.data.borrow().get(&format!("{ns}::{key}")).cloned()
    }

    pub fn put(&self, ns: &str, key: &str, value: &[u8]) {
        self.data
            .borrow_mut()
            .insert(format!("{ns}::{key}"), value.to_vec());
    }
}

impl StoragePort for MemStorage {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.broken {
            return Err(StorageError::IoError);
        }
        let v = self.get(ns, key).ok_or(StorageError::NotFound)?;
        let n = v.len().min(buf.len());
        buf[..n].copy_from_slice(&v[..n]);
        Ok(n)
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if self.broken {
            return Err(StorageError::IoError);
        }
        self.put(ns, key, data);
        Ok(())
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        if self.broken {
            return Err(StorageError::IoError);
        }
        self.data.borrow_mut().remove(&format!("{ns}::{key}"));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        !self.broken && self.data.borrow().contains_key(&format!("{ns}::{key}"))
    }
}

// ── System / OTA / events ─────────────────────────────────────

pub struct MockSystem {
    pub uptime_ms: Cell<u64>,
    pub ip: Option<Ipv4Addr>,
}

impl MockSystem {
    pub fn new() -> Self {
        Self {
            uptime_ms: Cell::new(0),
            ip: Some(LOCAL_IP),
        }
    }
}

impl SystemPort for MockSystem {
    fn uptime_ms(&self) -> u64 {
        self.uptime_ms.get()
    }

    fn local_ip(&self) -> Option<Ipv4Addr> {
        self.ip
    }
}

pub struct MockOta {
    pub status: Cell<OtaStatus>,
}

impl MockOta {
    pub fn idle() -> Self {
        Self {
            status: Cell::new(OtaStatus::Idle),
        }
    }
}

impl OtaPort for MockOta {
    fn poll(&self) -> OtaStatus {
        self.status.get()
    }
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    pub events: Vec<DeviceEvent>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn count(&self, pred: impl Fn(&DeviceEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &DeviceEvent) {
        self.events.push(event.clone());
    }
}

// ── Wi-Fi ─────────────────────────────────────────────────────

#[allow(dead_code)]
pub struct MockWifi {
    pub auto: Result<Ipv4Addr, ProvisioningError>,
    pub portal: Result<Ipv4Addr, ProvisioningError>,
    pub calls: Vec<(&'static str, String, Duration)>,
}

#[allow(dead_code)]
impl MockWifi {
    pub fn answering(
        auto: Result<Ipv4Addr, ProvisioningError>,
        portal: Result<Ipv4Addr, ProvisioningError>,
    ) -> Self {
        Self {
            auto,
            portal,
            calls: Vec::new(),
        }
    }
}

impl ProvisioningPort for MockWifi {
    fn auto_connect(&mut self, ap: &str, timeout: Duration) -> Result<Ipv4Addr, ProvisioningError> {
        self.calls.push(("auto", ap.to_owned(), timeout));
        self.auto
    }

    fn start_config_portal(
        &mut self,
        ap: &str,
        timeout: Duration,
    ) -> Result<Ipv4Addr, ProvisioningError> {
        self.calls.push(("portal", ap.to_owned(), timeout));
        self.portal
    }
}

// ── Device fixture ────────────────────────────────────────────

pub type TestDevice = Device<SharedMqtt, MockLocator, MemStorage>;

pub struct Rig {
    pub device: TestDevice,
    mqtt: SharedMqtt,
    pub sys: MockSystem,
    pub ota: MockOta,
    pub sink: RecordingSink,
    pub inbox: Arc<ControlInbox>,
}

#[allow(dead_code)]
impl Rig {
    pub fn new(config: DeviceConfig, mqtt: MockMqtt, storage: MemStorage) -> Self {
        Self::with_locator(config, mqtt, MockLocator::found(), storage)
    }

    pub fn with_locator(
        config: DeviceConfig,
        mqtt: MockMqtt,
        locator: MockLocator,
        storage: MemStorage,
    ) -> Self {
        let identity = DeviceIdentity::new(&config, &MAC);
        let mqtt = SharedMqtt(Rc::new(RefCell::new(mqtt)));
        let session = ConnectionSession::new(
            mqtt.clone(),
            locator,
            TopicSet::derive(identity.topic_prefix()),
            identity.client_id(),
            &config,
        );
        let inbox = Arc::new(ControlInbox::new());
        let device = Device::new(identity, &config, session, storage, inbox.clone());
        Self {
            device,
            mqtt,
            sys: MockSystem::new(),
            ota: MockOta::idle(),
            sink: RecordingSink::default(),
            inbox,
        }
    }

    pub fn start(&mut self) {
        self.device.start(&self.sys, &mut self.sink);
    }

    pub fn tick(&mut self) -> pinglink::app::service::TickOutcome {
        self.sys.uptime_ms.set(self.sys.uptime_ms.get() + 1000);
        self.device.tick(&self.sys, &self.ota, &mut self.sink)
    }

    pub fn mqtt(&self) -> Ref<'_, MockMqtt> {
        self.mqtt.0.borrow()
    }

    pub fn mqtt_mut(&self) -> RefMut<'_, MockMqtt> {
        self.mqtt.0.borrow_mut()
    }

    pub fn topics(&self) -> TopicSet {
        self.device.session().topics().clone()
    }
}

/// Config with a prefix of `test/node` and the given thresholds.
pub fn config(threshold: u32, heartbeat: u32) -> DeviceConfig {
    DeviceConfig {
        topic_prefix: heapless::String::try_from("test/node").unwrap_or_default(),
        reboot_after_failures: threshold,
        heartbeat_interval_ticks: heartbeat,
        ..DeviceConfig::default()
    }
}
