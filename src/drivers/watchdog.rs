//! Task Watchdog Timer (TWDT) driver.
//!
//! Subscribes the main task to the ESP-IDF TWDT with the configured
//! timeout.  The timeout must exceed the worst-case tick (blocking
//! discovery plus connect), which `validate_config` enforces.
//!
//! The main loop must call `feed()` once per tick.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

use log::info;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl Watchdog {
    /// Reconfigure the TWDT and subscribe the current task.
    #[cfg(target_os = "espidf")]
    pub fn new(timeout_secs: u32) -> Self {
        let cfg = esp_task_wdt_config_t {
            timeout_ms: timeout_secs.saturating_mul(1000),
            idle_core_mask: 0,
            trigger_panic: true,
        };
        // SAFETY: plain FFI calls with a valid config; a null task handle
        // means "the calling task".
        let subscribed = unsafe {
            let ret = esp_task_wdt_reconfigure(&cfg);
            if ret != ESP_OK as esp_err_t {
                log::warn!("Watchdog: reconfigure returned {} (may already be configured)", ret);
            }
            let ret = esp_task_wdt_add(core::ptr::null_mut());
            if ret != ESP_OK as esp_err_t {
                log::warn!("Watchdog: failed to subscribe ({})", ret);
            }
            ret == ESP_OK as esp_err_t
        };
        if subscribed {
            info!("Watchdog: subscribed ({}s timeout, panic on trigger)", timeout_secs);
        }
        Self { subscribed }
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new(timeout_secs: u32) -> Self {
        info!("Watchdog(sim): {}s, no-op", timeout_secs);
        Self {}
    }

    /// Feed the watchdog.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        if self.subscribed {
            // SAFETY: the task is subscribed.
            unsafe {
                esp_task_wdt_reset();
            }
        }
    }
}
