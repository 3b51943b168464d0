//! Device loop, the hexagonal core.
//!
//! [`Device`] owns the connection session, the liveness tracker, the
//! reboot journal and the pending control signals.  It exposes one
//! hardware-agnostic entry point, [`Device::tick`], invoked once per
//! polling period by `main`.  All I/O flows through port traits, so the
//! whole loop runs against mocks on the host.
//!
//! ```text
//!  OtaPort ─────┐                              ┌──▶ EventSink
//!  ControlInbox ┼──▶ ┌──────────────────────┐ ──┤
//!  SystemPort ──┘    │        Device        │   └──▶ ControlInbox (status)
//!                    │ Session · Liveness · │
//!  MqttPort ◀──────▶ │ Journal · Signals    │ ──▶ StoragePort
//!  BrokerLocator ◀── └──────────────────────┘
//! ```
//!
//! The device never restarts the chip itself.  A restart decision is
//! journaled and handed back as [`TickOutcome::Restart`].

use std::sync::Arc;

use log::{error, info, warn};

use crate::config::DeviceConfig;
use crate::control::{ControlInbox, PendingSignals, StatusSnapshot, format_uptime, heartbeat_due};
use crate::identity::DeviceIdentity;
use crate::journal::{ForceConfigMarker, RebootJournal};
use crate::liveness::{LinkState, LivenessTracker, Verdict};
use crate::session::ConnectionSession;

use super::commands::ControlSignal;
use super::events::DeviceEvent;
use super::ports::{BrokerLocator, EventSink, MqttPort, OtaPort, OtaStatus, StoragePort, SystemPort};

pub const FIRMWARE_UPDATE_REASON: &str = "Rebooted after firmware update";
pub const CONFIG_REQUEST_REASON: &str = "Rebooted due to configuration request";

/// What `main` must do after a tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Healthy tick.
    Continue,
    /// Broker unreachable; `n` consecutive failed ticks so far.
    Degraded(u32),
    /// Reason already journaled; restart the chip now.
    Restart(String),
}

// ───────────────────────────────────────────────────────────────
// Device
// ───────────────────────────────────────────────────────────────

pub struct Device<M: MqttPort, L: BrokerLocator, S: StoragePort> {
    identity: DeviceIdentity,
    session: ConnectionSession<M, L>,
    storage: S,
    journal: RebootJournal,
    liveness: LivenessTracker,
    signals: PendingSignals,
    inbox: Arc<ControlInbox>,
    heartbeat_interval: u32,
}

impl<M: MqttPort, L: BrokerLocator, S: StoragePort> Device<M, L, S> {
    pub fn new(
        identity: DeviceIdentity,
        config: &DeviceConfig,
        session: ConnectionSession<M, L>,
        storage: S,
        inbox: Arc<ControlInbox>,
    ) -> Self {
        Self {
            identity,
            session,
            storage,
            journal: RebootJournal::new(),
            liveness: LivenessTracker::new(config.reboot_after_failures),
            signals: PendingSignals::new(),
            inbox,
            heartbeat_interval: config.heartbeat_interval_ticks,
        }
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Boot-time connection attempt.  A failure here is logged and left
    /// to the first ticks; it does not count against the tracker.
    pub fn start(&mut self, sys: &impl SystemPort, sink: &mut impl EventSink) {
        sink.emit(&DeviceEvent::Started {
            client_id: self.session.client_id().to_owned(),
        });
        info!("device: '{}' starting", self.identity.name());

        match self.session.reconnect(&mut self.journal, &mut self.storage) {
            Ok(delivered) => self.on_connected(delivered, sink),
            Err(e) => warn!("device: boot connect failed ({}), retrying in loop", e),
        }
        self.publish_status(sys);
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// Run one polling cycle.
    pub fn tick(
        &mut self,
        sys: &impl SystemPort,
        ota: &impl OtaPort,
        sink: &mut impl EventSink,
    ) -> TickOutcome {
        let tick = self.liveness.begin_tick();

        // 1. Firmware update.  A portal request from the same tick still
        // gets its marker so the next boot presents the portal.
        if ota.poll() == OtaStatus::ReadyToReboot {
            sink.emit(&DeviceEvent::FirmwareStaged);
            self.drain_inbox();
            self.mark_force_config(sink);
            return self.restart(FIRMWARE_UPDATE_REASON.to_owned(), sink);
        }

        // 2. Signals from the HTTP surface
        self.drain_inbox();
        if self.mark_force_config(sink) {
            return self.restart(CONFIG_REQUEST_REASON.to_owned(), sink);
        }

        // 3. Broker liveness
        if !self.session.is_connected() {
            if self.session.note_disconnect() {
                sink.emit(&DeviceEvent::ConnectionLost);
            }
            match self.session.reconnect(&mut self.journal, &mut self.storage) {
                Ok(delivered) => {
                    self.liveness.record_success();
                    self.on_connected(delivered, sink);
                }
                Err(e) => {
                    warn!("device: tick {} reconnect failed ({})", tick, e);
                    let outcome = match self.liveness.record_failure() {
                        Verdict::Retry { failures } => {
                            sink.emit(&DeviceEvent::TickFailed { failures });
                            TickOutcome::Degraded(failures)
                        }
                        Verdict::Escalate { failures, ticks } => {
                            sink.emit(&DeviceEvent::Escalated { failures, ticks });
                            return self.restart(
                                format!(
                                    "Rebooted due to mqtt lost {failures} cycles. Total cycles {ticks}"
                                ),
                                sink,
                            );
                        }
                    };
                    self.service_transport();
                    self.publish_status(sys);
                    return outcome;
                }
            }
        }

        // 4. Transport keepalive and inbound dispatch
        self.service_transport();

        // 5. Heartbeat
        if heartbeat_due(tick, self.heartbeat_interval) {
            let uptime = format_uptime(sys.uptime_ms());
            match self.session.publish_alive(&uptime) {
                Ok(()) => sink.emit(&DeviceEvent::AlivePublished {
                    uptime: uptime.as_str().to_owned(),
                }),
                Err(e) => warn!("device: alive publish failed ({})", e),
            }
        }

        // 6. Ping service
        let broker = self.session.state().broker().map(|b| b.address);
        if let Some((counter, text)) = self.signals.pending_pong(sys.local_ip(), broker) {
            match self.session.publish_pong(&text) {
                Ok(()) => {
                    self.signals.pong_sent();
                    sink.emit(&DeviceEvent::PongSent { counter });
                }
                Err(e) => warn!("device: pong #{} publish failed ({}), retrying", counter, e),
            }
        }

        // 7. Status for the HTTP surface
        self.publish_status(sys);
        TickOutcome::Continue
    }

    // ── Internals ─────────────────────────────────────────────

    fn drain_inbox(&mut self) {
        while let Some(signal) = self.inbox.try_take() {
            match signal {
                ControlSignal::ForceConfig => self.signals.request_force_config(),
            }
        }
    }

    /// Persist a latched force-config request.  Returns `true` if one was
    /// pending.
    fn mark_force_config(&mut self, sink: &mut impl EventSink) -> bool {
        if !self.signals.take_force_config() {
            return false;
        }
        ForceConfigMarker::set(&mut self.storage);
        sink.emit(&DeviceEvent::ForceConfigRequested);
        true
    }

    fn service_transport(&mut self) {
        let signals = &mut self.signals;
        self.session.tick(|_| signals.on_ping());
    }

    fn on_connected(&mut self, delivered: Option<String>, sink: &mut impl EventSink) {
        if let Some(broker) = self.session.state().broker() {
            sink.emit(&DeviceEvent::Connected(broker));
        }
        if let Some(reason) = delivered {
            sink.emit(&DeviceEvent::RebootReasonDelivered(reason));
        }
    }

    fn restart(&mut self, reason: String, sink: &mut impl EventSink) -> TickOutcome {
        error!("device: restarting ({})", reason);
        self.journal.write_reason(&mut self.storage, &reason);
        sink.emit(&DeviceEvent::RestartScheduled(reason.clone()));
        TickOutcome::Restart(reason)
    }

    fn publish_status(&self, sys: &impl SystemPort) {
        self.inbox.publish_status(self.status(sys));
    }

    // ── Queries ───────────────────────────────────────────────

    /// Snapshot shown on the status page.
    pub fn status(&self, sys: &impl SystemPort) -> StatusSnapshot {
        let state = self.session.state();
        StatusSnapshot {
            name: self.identity.name().to_owned(),
            client_id: self.session.client_id().to_owned(),
            broker: state.broker(),
            connected: self.session.is_connected(),
            link: match self.liveness.state() {
                LinkState::Connected => "connected",
                LinkState::Degraded(_) => "degraded",
                LinkState::RebootPending => "reboot-pending",
            },
            prefix: self.identity.topic_prefix().to_owned(),
            uptime: format_uptime(sys.uptime_ms()).as_str().to_owned(),
            ticks: self.liveness.tick_count(),
            failures: self.liveness.consecutive_failures(),
            pongs: self.signals.ping_counter(),
            topics: self
                .session
                .topics()
                .all()
                .iter()
                .map(|t| (*t).to_owned())
                .collect(),
        }
    }

    pub fn liveness(&self) -> &LivenessTracker {
        &self.liveness
    }

    pub fn signals(&self) -> &PendingSignals {
        &self.signals
    }

    pub fn session(&self) -> &ConnectionSession<M, L> {
        &self.session
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}
