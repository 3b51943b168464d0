//! PingLink node firmware: main entry point.
//!
//! Hexagonal layout: adapters on the outside, the device loop in the
//! middle, port traits in between.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                      │
//! │                                                               │
//! │  WifiAdapter      MdnsAdapter     MqttAdapter    NvsStorage   │
//! │  (Provisioning)   (Locator)       (MqttPort)     (Storage)    │
//! │  HttpServer       OtaGate         EspSystem      LogEventSink │
//! │  (WebFrontend)    (OtaPort)       (SystemPort)   (EventSink)  │
//! │                                                               │
//! │  ──────────────── Port Trait Boundary ──────────────────      │
//! │                                                               │
//! │  ┌─────────────────────────────────────────────────────────┐  │
//! │  │                  Device (pure logic)                    │  │
//! │  │  Session · Liveness · Journal · Signals                 │  │
//! │  └─────────────────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! Boot order: logger → rollback check → NVS + panic hook → config →
//! identity → Wi-Fi provisioning → mDNS → MQTT session → HTTP → loop.

#![deny(unused_must_use)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::wifi::EspWifi;
use log::{error, info, warn};

use pinglink::adapters::device_id;
use pinglink::adapters::http::HttpServer;
use pinglink::adapters::log_sink::LogEventSink;
use pinglink::adapters::mdns::MdnsAdapter;
use pinglink::adapters::mqtt::MqttAdapter;
use pinglink::adapters::nvs::NvsStorage;
use pinglink::adapters::ota::{OtaGate, check_rollback};
use pinglink::adapters::platform::{self, EspSystem};
use pinglink::adapters::wifi::WifiAdapter;
use pinglink::app::ports::SystemPort;
use pinglink::app::service::{Device, TickOutcome};
use pinglink::config::load_or_repair;
use pinglink::control::{ControlInbox, heartbeat_due};
use pinglink::diagnostics::{self, RuntimeMetrics};
use pinglink::drivers::watchdog::Watchdog;
use pinglink::identity::DeviceIdentity;
use pinglink::journal::RebootJournal;
use pinglink::provisioning::{ProvisionOutcome, provision};
use pinglink::session::ConnectionSession;
use pinglink::topics::TopicSet;
use pinglink::web::WebFrontend;

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PingLink v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    check_rollback();

    // ── 2. Persistent storage + config ────────────────────────
    let mut nvs = match NvsStorage::new() {
        Ok(n) => n,
        Err(e) => {
            // Journal writes will fail and be logged; the node still runs.
            warn!("NVS init failed ({}), running without persistence", e);
            NvsStorage::attach()
        }
    };
    diagnostics::install_panic_handler();

    let config = load_or_repair(&nvs);

    // ── 3. Identity ───────────────────────────────────────────
    let identity = DeviceIdentity::new(&config, &device_id::read_mac());
    info!(
        "Device '{}' (client id {}), topics under '{}'",
        identity.name(),
        identity.client_id(),
        identity.topic_prefix()
    );

    // ── 4. Wi-Fi provisioning ─────────────────────────────────
    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs_partition = EspDefaultNvsPartition::take()?;
    let esp_wifi = EspWifi::new(peripherals.modem, sys_loop, Some(nvs_partition))?;
    let mut wifi = WifiAdapter::new(esp_wifi, config.http_port);

    match provision(&mut wifi, &mut nvs, &RebootJournal::new(), &identity, &config) {
        ProvisionOutcome::Connected(ip) => info!("Wi-Fi up, station address {}", ip),
        ProvisionOutcome::Reboot(reason) => {
            error!("Provisioning gave up: {}", reason);
            platform::restart();
        }
    }

    // ── 5. Network services ───────────────────────────────────
    let mut mdns = MdnsAdapter::new(
        identity.hostname(),
        config.http_port,
        config.mdns_query_timeout_ms,
    );
    mdns.start();

    let session = ConnectionSession::new(
        MqttAdapter::new(config.mqtt_connect_timeout_ms),
        mdns,
        TopicSet::derive(identity.topic_prefix()),
        identity.client_id(),
        &config,
    );

    let inbox = Arc::new(ControlInbox::new());
    let ota = Arc::new(OtaGate::new());
    let _http = HttpServer::start(
        config.http_port,
        WebFrontend::new(inbox.clone()),
        ota.clone(),
        identity.ota_password(),
    )?;

    // ── 6. Device loop ────────────────────────────────────────
    let sys = EspSystem::new();
    let mut sink = LogEventSink::new();
    // Subscribed after provisioning, which may block for minutes.
    let watchdog = Watchdog::new(config.watchdog_timeout_secs);

    let mut device = Device::new(identity, &config, session, nvs, inbox);
    device.start(&sys, &mut sink);

    info!("System ready. Entering polling loop.");
    let period = Duration::from_millis(u64::from(config.tick_interval_ms));

    loop {
        let started = Instant::now();

        if let TickOutcome::Restart(_) = device.tick(&sys, &*ota, &mut sink) {
            platform::restart();
        }

        if heartbeat_due(device.liveness().tick_count(), config.heartbeat_interval_ticks) {
            RuntimeMetrics::collect(sys.uptime_ms() / 1000).log();
        }

        watchdog.feed();
        std::thread::sleep(period.saturating_sub(started.elapsed()));
    }
}
