//! Wi-Fi provisioning adapter.
//!
//! Implements [`ProvisioningPort`]:
//!
//! - `auto_connect` joins the network stored by the driver.  With nothing
//!   stored it falls through to the configuration portal, sharing the same
//!   deadline.
//! - `start_config_portal` raises a SoftAP named after the device, serves
//!   a one-field-pair HTML form (`GET /`, `POST /wifi`) and joins whatever
//!   network is submitted.  Bad submissions re-render the form with the
//!   error; a failed join keeps the portal up until the deadline.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `EspWifi` in client or mixed mode.  The
//!   driver persists station credentials in its own NVS namespace.
//! - **all other targets**: a scripted network for host-side tests.

use core::net::Ipv4Addr;
use core::time::Duration;

use log::{info, warn};

use crate::app::ports::{ProvisioningError, ProvisioningPort};

// ───────────────────────────────────────────────────────────────
// Credentials
// ───────────────────────────────────────────────────────────────

/// Station credentials that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    ssid: heapless::String<32>,
    password: heapless::String<64>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ProvisioningError> {
        validate_ssid(ssid)?;
        validate_password(password)?;
        let mut c = Self {
            ssid: heapless::String::new(),
            password: heapless::String::new(),
        };
        c.ssid.push_str(ssid).map_err(|_| ProvisioningError::InvalidSsid)?;
        c.password
            .push_str(password)
            .map_err(|_| ProvisioningError::InvalidPassword)?;
        Ok(c)
    }

    /// Pull `ssid` and `password` out of a decoded form body.
    pub fn from_form(fields: &[(String, String)]) -> Result<Self, ProvisioningError> {
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| k == name)
                .map_or("", |(_, v)| v.as_str())
        };
        Self::new(get("ssid").trim(), get("password"))
    }

    pub fn ssid(&self) -> &str {
        &self.ssid
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_ssid(ssid: &str) -> Result<(), ProvisioningError> {
    if ssid.is_empty() || ssid.len() > 32 || !is_printable_ascii(ssid) {
        return Err(ProvisioningError::InvalidSsid);
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), ProvisioningError> {
    if password.is_empty() {
        return Ok(());
    }
    if password.len() < 8 || password.len() > 64 {
        return Err(ProvisioningError::InvalidPassword);
    }
    Ok(())
}

#[cfg(target_os = "espidf")]
const POLL_STEP: Duration = Duration::from_millis(250);
#[cfg(target_os = "espidf")]
const REJOIN_GRACE: Duration = Duration::from_secs(15);

// ───────────────────────────────────────────────────────────────
// Device backend
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: esp_idf_svc::wifi::EspWifi<'static>,
    portal_port: u16,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    pub fn new(wifi: esp_idf_svc::wifi::EspWifi<'static>, portal_port: u16) -> Self {
        Self { wifi, portal_port }
    }

    fn stored_credentials(&self) -> Option<Credentials> {
        use esp_idf_svc::wifi::Configuration;
        match self.wifi.get_configuration().ok()? {
            Configuration::Client(c) | Configuration::Mixed(c, _) if !c.ssid.is_empty() => {
                Credentials::new(c.ssid.as_str(), c.password.as_str()).ok()
            }
            _ => None,
        }
    }

    fn client_config(
        creds: &Credentials,
    ) -> Result<esp_idf_svc::wifi::ClientConfiguration, ProvisioningError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration};
        Ok(ClientConfiguration {
            ssid: creds
                .ssid()
                .try_into()
                .map_err(|_| ProvisioningError::InvalidSsid)?,
            password: creds
                .password()
                .try_into()
                .map_err(|_| ProvisioningError::InvalidPassword)?,
            auth_method: if creds.is_open() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        })
    }

    fn station_ip(&self) -> Option<Ipv4Addr> {
        let info = self.wifi.sta_netif().get_ip_info().ok()?;
        (!info.ip.is_unspecified()).then_some(info.ip)
    }

    /// Start a join and poll until the station has an address or the
    /// deadline passes.
    fn join(&mut self, deadline: std::time::Instant) -> Result<Ipv4Addr, ProvisioningError> {
        self.wifi.connect().map_err(|e| {
            warn!("WiFi: connect request rejected ({:?})", e);
            ProvisioningError::DriverFailed
        })?;
        while std::time::Instant::now() < deadline {
            if self.wifi.is_up().unwrap_or(false) {
                if let Some(ip) = self.station_ip() {
                    return Ok(ip);
                }
            }
            std::thread::sleep(POLL_STEP);
        }
        let _ = self.wifi.disconnect();
        Err(ProvisioningError::Timeout)
    }

    fn run_portal(
        &mut self,
        ap_name: &str,
        deadline: std::time::Instant,
    ) -> Result<Ipv4Addr, ProvisioningError> {
        use std::sync::{Arc, Mutex, PoisonError};

        use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
        use embassy_sync::channel::Channel;
        use embedded_svc::http::Method;
        use embedded_svc::io::Read;
        use esp_idf_svc::http::server::{Configuration as HttpConfiguration, EspHttpServer};
        use esp_idf_svc::wifi::{AccessPointConfiguration, AuthMethod, Configuration};

        use super::http::write_response;
        use crate::web::{Response, parse_form, render_portal_page};

        const MAX_FORM: usize = 512;

        let ap = AccessPointConfiguration {
            ssid: ap_name.try_into().map_err(|_| ProvisioningError::InvalidSsid)?,
            auth_method: AuthMethod::None,
            channel: 1,
            ..Default::default()
        };
        let station = self
            .stored_credentials()
            .map(|c| Self::client_config(&c))
            .transpose()?
            .unwrap_or_default();
        self.wifi
            .set_configuration(&Configuration::Mixed(station, ap))
            .and_then(|()| self.wifi.start())
            .map_err(|e| {
                warn!("WiFi: SoftAP start failed ({:?})", e);
                ProvisioningError::DriverFailed
            })?;
        info!("WiFi: configuration portal '{}' is up", ap_name);

        let submitted: Arc<Channel<CriticalSectionRawMutex, Credentials, 1>> =
            Arc::new(Channel::new());
        let last_error: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let conf = HttpConfiguration {
            http_port: self.portal_port,
            ..Default::default()
        };
        let mut server = EspHttpServer::new(&conf).map_err(|_| ProvisioningError::DriverFailed)?;

        let page_name: String = ap_name.to_owned();
        let page_error = last_error.clone();
        server
            .fn_handler::<anyhow::Error, _>("/", Method::Get, move |req| {
                let error = page_error
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                let page = render_portal_page(&page_name, error.as_deref());
                write_response(req, &Response::html(page))
            })
            .map_err(|_| ProvisioningError::DriverFailed)?;

        let form_error = last_error.clone();
        let form_tx = submitted.clone();
        server
            .fn_handler::<anyhow::Error, _>("/wifi", Method::Post, move |mut req| {
                let len = req.content_len().unwrap_or(0) as usize;
                if len > MAX_FORM {
                    return write_response(req, &Response::text(413, "form too large\n"));
                }
                let mut body = vec![0u8; len];
                req.read_exact(&mut body)?;
                let fields = parse_form(&String::from_utf8_lossy(&body));
                let response = match Credentials::from_form(&fields) {
                    Ok(creds) => {
                        let reply = format!("Saved. Joining '{}'\n", creds.ssid());
                        let _ = form_tx.try_send(creds);
                        Response::text(200, reply)
                    }
                    Err(e) => {
                        *form_error.lock().unwrap_or_else(PoisonError::into_inner) =
                            Some(e.to_string());
                        Response::text(400, format!("{e}\n"))
                    }
                };
                write_response(req, &response)
            })
            .map_err(|_| ProvisioningError::DriverFailed)?;

        while std::time::Instant::now() < deadline {
            let Ok(creds) = submitted.try_receive() else {
                std::thread::sleep(POLL_STEP);
                continue;
            };
            info!("WiFi: portal submitted '{}'", creds.ssid());
            let ap = match self.wifi.get_configuration() {
                Ok(Configuration::Mixed(_, ap)) => ap,
                _ => return Err(ProvisioningError::DriverFailed),
            };
            self.wifi
                .set_configuration(&Configuration::Mixed(Self::client_config(&creds)?, ap))
                .map_err(|_| ProvisioningError::DriverFailed)?;
            match self.join(deadline) {
                Ok(_) => {
                    drop(server);
                    // Switching to plain station mode drops the association.
                    let station = Self::client_config(&creds)?;
                    self.wifi
                        .set_configuration(&Configuration::Client(station))
                        .map_err(|_| ProvisioningError::DriverFailed)?;
                    return self.join(std::time::Instant::now() + REJOIN_GRACE);
                }
                Err(e) => {
                    warn!("WiFi: joining '{}' failed ({})", creds.ssid(), e);
                    *last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(format!("Could not join '{}'", creds.ssid()));
                }
            }
        }
        Err(ProvisioningError::Timeout)
    }
}

#[cfg(target_os = "espidf")]
impl ProvisioningPort for WifiAdapter {
    fn auto_connect(
        &mut self,
        ap_name: &str,
        timeout: Duration,
    ) -> Result<Ipv4Addr, ProvisioningError> {
        use esp_idf_svc::wifi::Configuration;

        let deadline = std::time::Instant::now() + timeout;
        let Some(creds) = self.stored_credentials() else {
            warn!("WiFi: no stored credentials, opening portal");
            return self.run_portal(ap_name, deadline);
        };
        info!("WiFi: joining stored network '{}'", creds.ssid());
        self.wifi
            .set_configuration(&Configuration::Client(Self::client_config(&creds)?))
            .and_then(|()| self.wifi.start())
            .map_err(|_| ProvisioningError::DriverFailed)?;
        self.join(deadline)
    }

    fn start_config_portal(
        &mut self,
        ap_name: &str,
        timeout: Duration,
    ) -> Result<Ipv4Addr, ProvisioningError> {
        self.run_portal(ap_name, std::time::Instant::now() + timeout)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation backend
// ───────────────────────────────────────────────────────────────

/// Scripted network: what is stored, what a portal user would submit and
/// which SSIDs are in range.
#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    stored: Option<Credentials>,
    portal_submission: Option<Vec<(String, String)>>,
    in_range: Vec<String>,
    portal_error: Option<String>,
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    const SIM_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 50);

    pub fn new() -> Self {
        Self {
            stored: None,
            portal_submission: None,
            in_range: Vec::new(),
            portal_error: None,
        }
    }

    pub fn with_stored(mut self, ssid: &str, password: &str) -> Self {
        self.stored = Credentials::new(ssid, password).ok();
        self
    }

    pub fn with_network_in_range(mut self, ssid: &str) -> Self {
        self.in_range.push(ssid.to_owned());
        self
    }

    /// Raw form fields a portal user will post.
    pub fn with_portal_submission(mut self, fields: &[(&str, &str)]) -> Self {
        self.portal_submission = Some(
            fields
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        );
        self
    }

    pub fn stored(&self) -> Option<&Credentials> {
        self.stored.as_ref()
    }

    /// Error the portal form would show on its next render.
    pub fn portal_error(&self) -> Option<&str> {
        self.portal_error.as_deref()
    }

    fn join(&self, creds: &Credentials) -> Result<Ipv4Addr, ProvisioningError> {
        if self.in_range.iter().any(|s| s == creds.ssid()) {
            info!("WiFi(sim): joined '{}'", creds.ssid());
            Ok(Self::SIM_IP)
        } else {
            Err(ProvisioningError::Timeout)
        }
    }

    fn run_portal(&mut self, ap_name: &str) -> Result<Ipv4Addr, ProvisioningError> {
        info!("WiFi(sim): configuration portal '{}' is up", ap_name);
        let Some(fields) = self.portal_submission.take() else {
            return Err(ProvisioningError::Timeout);
        };
        let creds = match Credentials::from_form(&fields) {
            Ok(c) => c,
            Err(e) => {
                self.portal_error = Some(e.to_string());
                return Err(ProvisioningError::Timeout);
            }
        };
        match self.join(&creds) {
            Ok(ip) => {
                self.stored = Some(creds);
                Ok(ip)
            }
            Err(e) => {
                self.portal_error = Some(format!("Could not join '{}'", creds.ssid()));
                Err(e)
            }
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for WifiAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl ProvisioningPort for WifiAdapter {
    fn auto_connect(
        &mut self,
        ap_name: &str,
        _timeout: Duration,
    ) -> Result<Ipv4Addr, ProvisioningError> {
        match self.stored.clone() {
            Some(creds) => self.join(&creds),
            None => {
                warn!("WiFi(sim): no stored credentials, opening portal");
                self.run_portal(ap_name)
            }
        }
    }

    fn start_config_portal(
        &mut self,
        ap_name: &str,
        _timeout: Duration,
    ) -> Result<Ipv4Addr, ProvisioningError> {
        self.run_portal(ap_name)
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────
