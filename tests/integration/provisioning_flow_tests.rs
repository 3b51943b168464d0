//! Integration tests for the boot provisioning flow.
//!
//! Covers the force-config handshake end to end: the HTTP surface asks
//! for the portal, the device writes the marker and restarts, and the
//! next boot's provisioning step consumes it.

use std::net::Ipv4Addr;
use std::time::Duration;

use pinglink::app::ports::ProvisioningError;
use pinglink::app::service::TickOutcome;
use pinglink::config::DeviceConfig;
use pinglink::identity::DeviceIdentity;
use pinglink::journal::{ForceConfigMarker, RebootJournal};
use pinglink::provisioning::{
    AUTOCONNECT_TIMEOUT_REASON, PORTAL_TIMEOUT_REASON, ProvisionOutcome, provision,
};
use pinglink::web::{HttpMethod, WebFrontend};

use crate::mocks::{MAC, MemStorage, MockMqtt, MockWifi, Rig, config};

const STATION: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 42);

fn boot(wifi: &mut MockWifi, storage: &mut MemStorage) -> ProvisionOutcome {
    let cfg = DeviceConfig::default();
    let identity = DeviceIdentity::new(&cfg, &MAC);
    provision(wifi, storage, &RebootJournal::new(), &identity, &cfg)
}

#[test]
fn config_page_request_leads_to_portal_on_next_boot() {
    // Boot 1: operator hits /config.html.
    let mut rig = Rig::new(config(60, 100), MockMqtt::up(), MemStorage::default());
    rig.start();
    let web = WebFrontend::new(rig.inbox.clone());
    let response = web.handle(HttpMethod::Get, "/config.html");
    assert_eq!(response.status, 200);
    assert!(matches!(rig.tick(), TickOutcome::Restart(_)));

    // Boot 2: same flash, provisioning must present the portal.
    let mut storage = rig.device.storage().clone();
    let mut wifi = MockWifi::answering(Ok(STATION), Ok(STATION));
    assert_eq!(boot(&mut wifi, &mut storage), ProvisionOutcome::Connected(STATION));
    assert_eq!(wifi.calls.len(), 1);
    assert_eq!(wifi.calls[0].0, "portal");
    assert_eq!(wifi.calls[0].2, Duration::from_secs(180));

    // Boot 3: marker consumed, back to silent reconnection.
    let mut wifi = MockWifi::answering(Ok(STATION), Ok(STATION));
    boot(&mut wifi, &mut storage);
    assert_eq!(wifi.calls[0].0, "auto");
}

#[test]
fn portal_ssid_is_the_client_id() {
    let mut storage = MemStorage::default();
    let mut wifi = MockWifi::answering(Ok(STATION), Ok(STATION));
    boot(&mut wifi, &mut storage);
    let expected = DeviceIdentity::new(&DeviceConfig::default(), &MAC).client_id();
    assert_eq!(wifi.calls[0].1, expected.as_str());
}

#[test]
fn autoconnect_timeout_reason_reaches_the_info_topic_after_reboot() {
    let mut storage = MemStorage::default();
    let mut wifi = MockWifi::answering(Err(ProvisioningError::Timeout), Ok(STATION));
    assert_eq!(
        boot(&mut wifi, &mut storage),
        ProvisionOutcome::Reboot(AUTOCONNECT_TIMEOUT_REASON.into())
    );

    // Next boot gets a network and a broker.
    let mut rig = Rig::new(config(60, 100), MockMqtt::up(), storage);
    rig.start();
    let info = rig.topics().info;
    assert_eq!(rig.mqtt().published_on(&info), vec![AUTOCONNECT_TIMEOUT_REASON]);
}

#[test]
fn portal_timeout_journals_and_clears_marker() {
    let mut storage = MemStorage::default();
    ForceConfigMarker::set(&mut storage);
    let mut wifi = MockWifi::answering(Ok(STATION), Err(ProvisioningError::Timeout));

    assert_eq!(
        boot(&mut wifi, &mut storage),
        ProvisionOutcome::Reboot(PORTAL_TIMEOUT_REASON.into())
    );
    assert!(storage.get("boot", "force_config").is_none());
    assert_eq!(
        RebootJournal::new().drain_if_present(&mut storage).as_deref(),
        Some(PORTAL_TIMEOUT_REASON)
    );
}

#[test]
fn broken_flash_still_provisions() {
    let mut storage = MemStorage::broken();
    let mut wifi = MockWifi::answering(Ok(STATION), Ok(STATION));
    assert_eq!(boot(&mut wifi, &mut storage), ProvisionOutcome::Connected(STATION));
    assert_eq!(wifi.calls[0].0, "auto");
}
