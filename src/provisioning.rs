//! Boot-time Wi-Fi bring-up.
//!
//! Consumes the force-config marker, then either joins the stored network
//! or runs the configuration portal.  Either path is bounded; on failure
//! the reason is journaled and the caller restarts.

use core::net::Ipv4Addr;
use core::time::Duration;

use log::{info, warn};

use crate::app::ports::{ProvisioningError, ProvisioningPort, StoragePort};
use crate::config::DeviceConfig;
use crate::identity::DeviceIdentity;
use crate::journal::{ForceConfigMarker, RebootJournal};

pub const AUTOCONNECT_TIMEOUT_REASON: &str = "Rebooted due to autoconnect timeout";
pub const PORTAL_TIMEOUT_REASON: &str = "Rebooted due to config portal timeout";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionOutcome {
    /// Station is up with this address.
    Connected(Ipv4Addr),
    /// Reason already journaled; the caller must restart.
    Reboot(String),
}

pub fn provision(
    port: &mut impl ProvisioningPort,
    storage: &mut dyn StoragePort,
    journal: &RebootJournal,
    identity: &DeviceIdentity,
    config: &DeviceConfig,
) -> ProvisionOutcome {
    let ap_name = identity.portal_ssid();

    let (result, timeout_reason, what) = if ForceConfigMarker::consume(storage) {
        info!("provisioning: force-config marker found, starting portal '{}'", ap_name);
        let timeout = Duration::from_secs(u64::from(config.portal_timeout_secs));
        (
            port.start_config_portal(&ap_name, timeout),
            PORTAL_TIMEOUT_REASON,
            "config portal",
        )
    } else {
        let timeout = Duration::from_secs(u64::from(config.wifi_connect_timeout_secs));
        (
            port.auto_connect(&ap_name, timeout),
            AUTOCONNECT_TIMEOUT_REASON,
            "autoconnect",
        )
    };

    match result {
        Ok(ip) => {
            info!("provisioning: station up, ip {}", ip);
            ProvisionOutcome::Connected(ip)
        }
        Err(e) => {
            warn!("provisioning: {} failed ({})", what, e);
            let reason = match e {
                ProvisioningError::Timeout => timeout_reason.to_owned(),
                other => format!("Rebooted due to {what} failure: {other}"),
            };
            journal.write_reason(storage, &reason);
            ProvisionOutcome::Reboot(reason)
        }
    }
}
