//! mDNS adapter: hostname advertisement and broker discovery.
//!
//! Advertises `<name>.local` plus an `_http._tcp` record for the status
//! page, and resolves the broker with a PTR query for the configured
//! service (`_mqtt._tcp` by default).  Uses the ESP-IDF mDNS component
//! directly on the device; the simulation backend answers with a
//! loopback broker.
//!
//! Lifecycle is tied to Wi-Fi: start once the station has an IP.  The
//! responder is released when the adapter is dropped.

use log::{info, warn};

use crate::app::ports::{BrokerEndpoint, BrokerLocator};

const HTTP_SERVICE_TYPE: &str = "_http";
const HTTP_SERVICE_PROTO: &str = "_tcp";

/// mDNS responder + querier.
pub struct MdnsAdapter {
    hostname: heapless::String<32>,
    http_port: u16,
    query_timeout_ms: u32,
    active: bool,
}

impl MdnsAdapter {
    pub fn new(hostname: &str, http_port: u16, query_timeout_ms: u32) -> Self {
        Self {
            hostname: crate::config::bounded(hostname),
            http_port,
            query_timeout_ms,
            active: false,
        }
    }

    /// Whether mDNS is currently advertising.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Start hostname + service advertisement.
    /// Call after Wi-Fi is connected and has an IP.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.active = self.platform_start();
        if self.active {
            info!(
                "mDNS: advertising {}.local → {}.{}:{}",
                self.hostname, HTTP_SERVICE_TYPE, HTTP_SERVICE_PROTO, self.http_port
            );
        }
    }

    /// Stop mDNS advertisement.  Runs when the adapter is dropped.
    fn stop(&mut self) {
        if !self.active {
            return;
        }
        self.platform_stop();
        self.active = false;
        info!("mDNS: stopped");
    }

    // ── Platform-specific ─────────────────────────────────────

    #[cfg(target_os = "espidf")]
    fn platform_start(&self) -> bool {
        use esp_idf_svc::sys::*;
        use std::ffi::CString;

        let Ok(host) = CString::new(self.hostname.as_str()) else {
            warn!("mDNS: hostname contains NUL");
            return false;
        };
        // SAFETY: all strings are NUL-terminated and outlive the calls; the
        // component copies them internally.
        unsafe {
            let ret = mdns_init();
            if ret != ESP_OK as esp_err_t {
                log::error!("mDNS: mdns_init failed ({})", ret);
                return false;
            }
            mdns_hostname_set(host.as_ptr());
            mdns_instance_name_set(host.as_ptr());
            let ret = mdns_service_add(
                host.as_ptr(),
                c"_http".as_ptr(),
                c"_tcp".as_ptr(),
                self.http_port,
                core::ptr::null_mut(),
                0,
            );
            if ret != ESP_OK as esp_err_t {
                warn!("mDNS: http service registration failed ({})", ret);
            }
        }
        true
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_start(&self) -> bool {
        info!("mDNS(sim): registered {}.local", self.hostname);
        true
    }

    #[cfg(target_os = "espidf")]
    fn platform_stop(&self) {
        // SAFETY: only reached after a successful mdns_init.
        unsafe {
            esp_idf_svc::sys::mdns_free();
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_stop(&self) {
        info!("mDNS(sim): unregistered");
    }

    #[cfg(target_os = "espidf")]
    fn platform_query(&self, service: &str, proto: &str) -> Option<BrokerEndpoint> {
        use core::net::Ipv4Addr;
        use esp_idf_svc::sys::*;
        use std::ffi::CString;

        let service = CString::new(service).ok()?;
        let proto = CString::new(proto).ok()?;
        let mut results: *mut mdns_result_t = core::ptr::null_mut();

        // SAFETY: the query writes a heap-allocated list into `results`,
        // which is walked read-only and released with
        // mdns_query_results_free before returning.
        unsafe {
            let ret = mdns_query_ptr(
                service.as_ptr(),
                proto.as_ptr(),
                self.query_timeout_ms,
                4,
                &mut results,
            );
            if ret != ESP_OK as esp_err_t {
                warn!("mDNS: PTR query failed ({})", ret);
                return None;
            }

            let mut found = None;
            let mut r = results;
            'results: while !r.is_null() {
                let mut a = (*r).addr;
                while !a.is_null() {
                    if u32::from((*a).addr.type_) == ESP_IPADDR_TYPE_V4 {
                        let raw = (*a).addr.u_addr.ip4.addr;
                        found = Some(BrokerEndpoint {
                            address: Ipv4Addr::from(raw.to_le_bytes()),
                            port: (*r).port,
                        });
                        break 'results;
                    }
                    a = (*a).next;
                }
                r = (*r).next;
            }
            if !results.is_null() {
                mdns_query_results_free(results);
            }
            found
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn platform_query(&self, service: &str, proto: &str) -> Option<BrokerEndpoint> {
        info!("mDNS(sim): {}.{} → 127.0.0.1:1883", service, proto);
        Some(BrokerEndpoint {
            address: core::net::Ipv4Addr::LOCALHOST,
            port: 1883,
        })
    }
}

impl Drop for MdnsAdapter {
    fn drop(&mut self) {
        self.stop();
    }
}

impl BrokerLocator for MdnsAdapter {
    fn resolve(&mut self, service: &str, proto: &str) -> Option<BrokerEndpoint> {
        if !self.active {
            warn!("mDNS: query before start");
            return None;
        }
        self.platform_query(service, proto)
    }
}
