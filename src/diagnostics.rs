//! Panic journaling and runtime diagnostics.
//!
//! A custom panic hook records `"Rebooted due to panic: <msg>"` in the
//! reboot journal before the default handler resets the chip, so the
//! reason reaches the info topic on the next boot like any other restart.
//!
//! Runtime metrics (heap, RSSI) are collected on demand and logged by the
//! main loop alongside the heartbeat.

use crate::app::ports::StoragePort;
use crate::journal::RebootJournal;

const PANIC_PREFIX: &str = "Rebooted due to panic: ";

/// Text of a panic payload, or a placeholder for non-string payloads.
pub fn panic_message(payload: &(dyn core::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Journal entry for a panic carrying `message`.
pub fn panic_reason(message: &str) -> String {
    format!("{PANIC_PREFIX}{message}")
}

/// Journal a panic through `storage`.  Split out of the hook for testing.
pub fn record_panic(storage: &mut dyn StoragePort, message: &str) {
    RebootJournal::new().write_reason(storage, &panic_reason(message));
}

/// Install a panic hook that journals the panic message.
///
/// Must be called once during init, after NVS is ready.  The hook does
/// not re-initialise flash: it attaches to the partition opened by `main`,
/// and if that never happened the write fails and is only logged.
pub fn install_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        let message = panic_message(info.payload());
        match info.location() {
            Some(at) => log::error!("PANIC at {}:{}: {}", at.file(), at.line(), message),
            None => log::error!("PANIC: {}", message),
        }
        let mut nvs = crate::adapters::nvs::NvsStorage::attach();
        record_panic(&mut nvs, message);
    }));
}

/// Runtime diagnostics snapshot collected on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeMetrics {
    pub uptime_secs: u64,
    pub heap_free: u32,
    pub heap_min_free: u32,
    pub wifi_rssi: Option<i8>,
}

impl RuntimeMetrics {
    #[cfg(target_os = "espidf")]
    pub fn collect(uptime_secs: u64) -> Self {
        use esp_idf_svc::sys::*;
        // SAFETY: plain reads of allocator counters.
        let heap_free = unsafe { esp_get_free_heap_size() };
        let heap_min_free = unsafe { esp_get_minimum_free_heap_size() };

        let mut ap_info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        // SAFETY: `ap_info` is a valid out-pointer for the call.
        let ret = unsafe { esp_wifi_sta_get_ap_info(&mut ap_info) };
        let wifi_rssi = (ret == ESP_OK as esp_err_t).then_some(ap_info.rssi);

        Self {
            uptime_secs,
            heap_free,
            heap_min_free,
            wifi_rssi,
        }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn collect(uptime_secs: u64) -> Self {
        // Heap "decays" slightly over time to model fragmentation.
        let heap_free = 307_200_u32.saturating_sub((uptime_secs / 60) as u32 * 512);
        Self {
            uptime_secs,
            heap_free,
            heap_min_free: heap_free / 100 * 85,
            wifi_rssi: Some(-60),
        }
    }

    pub fn log(&self) {
        log::info!(
            "DIAG  | up={}s heap={}B min={}B rssi={:?}",
            self.uptime_secs,
            self.heap_free,
            self.heap_min_free,
            self.wifi_rssi
        );
    }
}
