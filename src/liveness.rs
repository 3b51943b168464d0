//! Broker liveness tracker.
//!
//! Counts polling ticks and consecutive ticks without a usable broker
//! session, and decides when the loop must escalate to a full restart.
//!
//! ```text
//!            fail               fail                 fail (n % threshold == 0)
//! CONNECTED ─────▶ DEGRADED(1) ─────▶ DEGRADED(n) ─────────────────────▶ REBOOT_PENDING
//!     ▲                               │
//!     └────────── success (n = 0) ◀───┘
//! ```
//!
//! ## Counter rules
//!
//! - `consecutive_failures` increments by exactly 1 per failed tick and
//!   resets to 0 on success.  It is never decremented gradually.
//! - Escalation fires when the count is a positive multiple of the
//!   threshold: every multiple, not only the first.  Counting carries on
//!   after an escalation so the 120th, 180th… failures fire again.
//! - `RebootPending` is terminal: once reported it stays reported for the
//!   rest of the process, whatever the counters do afterwards.

use core::num::NonZeroU32;

use log::{info, warn};

/// Link health as reported to the loop and the status page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    /// `n` consecutive failed ticks, `n >= 1`.
    Degraded(u32),
    RebootPending,
}

/// What the loop must do after a failed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep retrying on the next tick.
    Retry { failures: u32 },
    /// Journal the reason and restart.
    Escalate { failures: u32, ticks: u64 },
}

#[derive(Debug, Clone)]
pub struct LivenessTracker {
    threshold: NonZeroU32,
    tick_count: u64,
    consecutive_failures: u32,
    reboot_pending: bool,
}

impl LivenessTracker {
    /// A zero threshold is treated as 1 (escalate on every failure).
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: NonZeroU32::new(threshold).unwrap_or(NonZeroU32::MIN),
            tick_count: 0,
            consecutive_failures: 0,
            reboot_pending: false,
        }
    }

    /// Start a new tick.  Returns the tick number (first tick is 1).
    pub fn begin_tick(&mut self) -> u64 {
        self.tick_count = self.tick_count.wrapping_add(1);
        self.tick_count
    }

    /// A connection attempt succeeded.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            info!(
                "liveness: recovered after {} failed tick(s)",
                self.consecutive_failures
            );
        }
        self.consecutive_failures = 0;
    }

    /// A tick's connection attempt failed.
    pub fn record_failure(&mut self) -> Verdict {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let failures = self.consecutive_failures;

        if failures % self.threshold.get() == 0 {
            warn!(
                "liveness: {} consecutive failures (threshold {}), escalating",
                failures, self.threshold
            );
            self.reboot_pending = true;
            Verdict::Escalate {
                failures,
                ticks: self.tick_count,
            }
        } else {
            Verdict::Retry { failures }
        }
    }

    pub fn state(&self) -> LinkState {
        if self.reboot_pending {
            LinkState::RebootPending
        } else if self.consecutive_failures == 0 {
            LinkState::Connected
        } else {
            LinkState::Degraded(self.consecutive_failures)
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn threshold(&self) -> u32 {
        self.threshold.get()
    }
}
