//! Chip-level services: system clock, station address and restart.

use core::net::Ipv4Addr;

use log::info;

use crate::app::ports::SystemPort;

/// [`SystemPort`] backed by the ESP timer and the default STA netif.
#[derive(Debug, Default, Clone, Copy)]
pub struct EspSystem;

impl EspSystem {
    pub fn new() -> Self {
        Self
    }
}

impl SystemPort for EspSystem {
    fn uptime_ms(&self) -> u64 {
        super::time::uptime_ms()
    }

    #[cfg(target_os = "espidf")]
    fn local_ip(&self) -> Option<Ipv4Addr> {
        use esp_idf_svc::sys::*;
        // SAFETY: the ifkey literal is NUL-terminated; the returned handle is
        // owned by the Wi-Fi driver and only read here.
        unsafe {
            let netif = esp_netif_get_handle_from_ifkey(c"WIFI_STA_DEF".as_ptr());
            if netif.is_null() {
                return None;
            }
            let mut info: esp_netif_ip_info_t = core::mem::zeroed();
            if esp_netif_get_ip_info(netif, &mut info) != ESP_OK as esp_err_t {
                return None;
            }
            let ip = Ipv4Addr::from(info.ip.addr.to_le_bytes());
            (!ip.is_unspecified()).then_some(ip)
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn local_ip(&self) -> Option<Ipv4Addr> {
        Some(Ipv4Addr::new(192, 168, 1, 50))
    }
}

/// Restart the chip.  The reason must already be journaled.
#[cfg(target_os = "espidf")]
pub fn restart() -> ! {
    info!("platform: restarting");
    // Give the UART a moment to flush the last log lines.
    std::thread::sleep(core::time::Duration::from_millis(100));
    // SAFETY: esp_restart never returns.
    unsafe { esp_idf_svc::sys::esp_restart() }
}

#[cfg(not(target_os = "espidf"))]
pub fn restart() -> ! {
    info!("platform(sim): restart requested, exiting");
    std::process::exit(0)
}
