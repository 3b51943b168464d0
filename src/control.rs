//! Control surface: ping bookkeeping, heartbeat timing and the inbox that
//! carries HTTP-originated signals into the polling tick.
//!
//! ```text
//!  MQTT {prefix}/ping ──▶ PendingSignals::on_ping ──▶ pending_pong ──▶ {prefix}/pong
//!  HTTP /config.html  ──▶ ControlInbox::push      ──▶ Device::tick (next tick)
//!  Device::tick       ──▶ ControlInbox::publish_status ──▶ HTTP GET /
//! ```
//!
//! HTTP handlers run on the server task, so the inbox is the only piece
//! shared across tasks.  Handlers only enqueue; every decision is taken in
//! the tick.

use core::fmt::Write as _;
use core::net::Ipv4Addr;
use std::sync::{Mutex, PoisonError};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::warn;
use serde::Serialize;

use crate::app::commands::ControlSignal;
use crate::app::ports::BrokerEndpoint;

// ───────────────────────────────────────────────────────────────
// Pending signals
// ───────────────────────────────────────────────────────────────

/// In-tick signal state.  Touched only from the polling tick.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingSignals {
    ping_requested: bool,
    ping_counter: u32,
    force_config_requested: bool,
}

impl PendingSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// A message arrived on the ping topic.  Several pings before the
    /// next service collapse into one pong.
    pub fn on_ping(&mut self) {
        self.ping_requested = true;
    }

    pub fn ping_requested(&self) -> bool {
        self.ping_requested
    }

    /// Pongs emitted so far; starts at 0, never decreases.
    pub fn ping_counter(&self) -> u32 {
        self.ping_counter
    }

    /// The pong owed for a pending ping, numbered one past the last pong
    /// sent.  Nothing changes until [`Self::pong_sent`] confirms delivery,
    /// so a failed publish is retried with the same number.
    pub fn pending_pong(
        &self,
        local_ip: Option<Ipv4Addr>,
        broker: Option<Ipv4Addr>,
    ) -> Option<(u32, String)> {
        if !self.ping_requested {
            return None;
        }
        let counter = self.ping_counter.wrapping_add(1);
        let text = pong_text(
            counter,
            local_ip.unwrap_or(Ipv4Addr::UNSPECIFIED),
            broker.unwrap_or(Ipv4Addr::UNSPECIFIED),
        );
        Some((counter, text))
    }

    /// The pending pong was published: advance the counter and clear the
    /// ping.  No-op without a pending ping.
    pub fn pong_sent(&mut self) {
        if core::mem::take(&mut self.ping_requested) {
            self.ping_counter = self.ping_counter.wrapping_add(1);
        }
    }

    /// Latch a force-config request for this tick.
    pub fn request_force_config(&mut self) {
        self.force_config_requested = true;
    }

    /// Consume the force-config request, if any.
    pub fn take_force_config(&mut self) -> bool {
        core::mem::take(&mut self.force_config_requested)
    }
}

/// `Hello #<counter>, <ip> mqtt:<broker-ip>`
pub fn pong_text(counter: u32, local_ip: Ipv4Addr, broker: Ipv4Addr) -> String {
    format!("Hello #{counter}, {local_ip} mqtt:{broker}")
}

// ───────────────────────────────────────────────────────────────
// Heartbeat
// ───────────────────────────────────────────────────────────────

/// `true` on exact positive multiples of `interval`.  A zero interval
/// disables the heartbeat.
pub fn heartbeat_due(tick: u64, interval: u32) -> bool {
    interval != 0 && tick != 0 && tick % u64::from(interval) == 0
}

/// `HH:MM:SS`.  Hours are not wrapped at 24.
pub fn format_uptime(uptime_ms: u64) -> heapless::String<24> {
    let secs = uptime_ms / 1000;
    let mut out = heapless::String::new();
    let _ = write!(
        out,
        "{:02}:{:02}:{:02}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    out
}

// ───────────────────────────────────────────────────────────────
// Status snapshot
// ───────────────────────────────────────────────────────────────

/// What the HTTP surface shows.  Rebuilt by the tick, read by handlers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub name: String,
    pub client_id: String,
    pub broker: Option<BrokerEndpoint>,
    pub connected: bool,
    /// `connected`, `degraded` or `reboot-pending`.
    pub link: &'static str,
    pub prefix: String,
    pub uptime: String,
    pub ticks: u64,
    pub failures: u32,
    pub pongs: u32,
    pub topics: Vec<String>,
}

// ───────────────────────────────────────────────────────────────
// Inbox
// ───────────────────────────────────────────────────────────────

const INBOX_DEPTH: usize = 4;

/// Cross-task mailbox between the HTTP server and the polling tick.
/// Shared as `Arc<ControlInbox>`.
pub struct ControlInbox {
    signals: Channel<CriticalSectionRawMutex, ControlSignal, INBOX_DEPTH>,
    status: Mutex<StatusSnapshot>,
}

impl Default for ControlInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlInbox {
    pub fn new() -> Self {
        Self {
            signals: Channel::new(),
            status: Mutex::new(StatusSnapshot::default()),
        }
    }

    /// Enqueue a signal.  A full inbox drops the signal with a warning.
    pub fn push(&self, signal: ControlSignal) {
        if self.signals.try_send(signal).is_err() {
            warn!("inbox: full, dropping {:?}", signal);
        }
    }

    pub fn try_take(&self) -> Option<ControlSignal> {
        self.signals.try_receive().ok()
    }

    pub fn publish_status(&self, snapshot: StatusSnapshot) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
