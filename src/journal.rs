//! Persisted boot flags: the reboot journal and the force-config marker.
//!
//! Both live in the `boot` NVS namespace and are presence-based:
//!
//! | Key             | Content                   | Lifecycle                              |
//! |-----------------|---------------------------|----------------------------------------|
//! | `reboot_reason` | UTF-8 reason, ≤128 bytes  | written before a deliberate restart,   |
//! |                 |                           | drained once after the next connect    |
//! | `force_config`  | 1-byte marker             | written by the HTTP surface, consumed  |
//! |                 |                           | by the next boot's provisioning step   |
//!
//! Storage failures never escape these types: they are logged and the
//! operation behaves as if the key were absent (or the write a no-op), so
//! a broken flash partition can never block a restart.

use log::{info, warn};

use crate::app::ports::{StorageError, StoragePort};

const BOOT_NAMESPACE: &str = "boot";
const REASON_KEY: &str = "reboot_reason";
const FORCE_CONFIG_KEY: &str = "force_config";

/// Longest reason persisted; longer reasons are cut on a char boundary.
pub const MAX_REASON_LEN: usize = 128;

// ───────────────────────────────────────────────────────────────
// Reboot journal
// ───────────────────────────────────────────────────────────────

/// Single-slot, read-once record of why the device last restarted itself.
#[derive(Debug, Default)]
pub struct RebootJournal {
    drained: bool,
}

impl RebootJournal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist `reason`, replacing any previous one.  Never fails.
    pub fn write_reason(&self, storage: &mut dyn StoragePort, reason: &str) {
        let reason = truncate(reason, MAX_REASON_LEN);
        match storage.write(BOOT_NAMESPACE, REASON_KEY, reason.as_bytes()) {
            Ok(()) => info!("journal: recorded '{}'", reason),
            Err(e) => warn!("journal: failed to record reboot reason ({})", e),
        }
    }

    /// Return the stored reason and delete it.
    ///
    /// Latches after the first call of the boot: later calls return `None`
    /// even if the delete failed, so no reason is delivered twice.
    pub fn drain_if_present(&mut self, storage: &mut dyn StoragePort) -> Option<String> {
        if self.drained {
            return None;
        }
        self.drained = true;

        let mut buf = [0u8; MAX_REASON_LEN];
        let reason = match storage.read(BOOT_NAMESPACE, REASON_KEY, &mut buf) {
            Ok(len) => String::from_utf8_lossy(&buf[..len]).trim().to_owned(),
            Err(StorageError::NotFound) => return None,
            Err(e) => {
                // Clear an unreadable slot so it is not retried every boot.
                warn!("journal: failed to read reboot reason ({})", e);
                Self::clear(storage);
                return None;
            }
        };

        Self::clear(storage);
        if reason.is_empty() { None } else { Some(reason) }
    }

    fn clear(storage: &mut dyn StoragePort) {
        if let Err(e) = storage.delete(BOOT_NAMESPACE, REASON_KEY) {
            warn!("journal: failed to clear reboot reason ({})", e);
        }
    }

    /// Whether this boot already drained (or tried to drain) the slot.
    #[cfg(test)]
    pub(crate) fn is_drained(&self) -> bool {
        self.drained
    }
}

// ───────────────────────────────────────────────────────────────
// Force-config marker
// ───────────────────────────────────────────────────────────────

/// "Present the configuration portal on next boot."
pub struct ForceConfigMarker;

impl ForceConfigMarker {
    /// Persist the marker.  Never fails.
    pub fn set(storage: &mut dyn StoragePort) {
        match storage.write(BOOT_NAMESPACE, FORCE_CONFIG_KEY, &[1]) {
            Ok(()) => info!("journal: force-config marker set"),
            Err(e) => warn!("journal: failed to set force-config marker ({})", e),
        }
    }

    /// Check for the marker and delete it.  Returns `true` if it was set.
    pub fn consume(storage: &mut dyn StoragePort) -> bool {
        if !storage.exists(BOOT_NAMESPACE, FORCE_CONFIG_KEY) {
            return false;
        }
        if let Err(e) = storage.delete(BOOT_NAMESPACE, FORCE_CONFIG_KEY) {
            warn!("journal: failed to clear force-config marker ({})", e);
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn is_set(storage: &dyn StoragePort) -> bool {
        storage.exists(BOOT_NAMESPACE, FORCE_CONFIG_KEY)
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
