//! Integration tests for the Device → Session → MQTT polling loop.
//!
//! These run on the host against the mock ports and cover the tick order,
//! liveness escalation, the ping/pong and heartbeat services, and the
//! control signals coming from the HTTP surface.

use pinglink::app::commands::ControlSignal;
use pinglink::app::events::DeviceEvent;
use pinglink::app::ports::OtaStatus;
use pinglink::app::service::{CONFIG_REQUEST_REASON, FIRMWARE_UPDATE_REASON, TickOutcome};
use pinglink::liveness::LinkState;

use crate::mocks::{BROKER, MemStorage, MockLocator, MockMqtt, Rig, config};

const REASON: (&str, &str) = ("boot", "reboot_reason");
const MARKER: (&str, &str) = ("boot", "force_config");

fn connected_rig(threshold: u32, heartbeat: u32) -> Rig {
    let mut rig = Rig::new(config(threshold, heartbeat), MockMqtt::up(), MemStorage::default());
    rig.start();
    rig
}

/// Take the broker away after a healthy boot.
fn lose_broker(rig: &mut Rig) {
    let mut mqtt = rig.mqtt_mut();
    mqtt.drop_link();
    mqtt.broker_up = false;
}

fn journaled(rig: &Rig) -> Option<String> {
    rig.device
        .storage()
        .get(REASON.0, REASON.1)
        .map(|b| String::from_utf8_lossy(&b).into_owned())
}

// ── Boot ─────────────────────────────────────────────────────

#[test]
fn start_connects_and_subscribes_to_ping() {
    let rig = connected_rig(60, 100);
    let ping = rig.topics().ping;
    assert_eq!(rig.mqtt().subscriptions, vec![ping.to_string()]);
    assert!(rig.device.session().is_connected());
    assert_eq!(rig.device.session().state().broker(), Some(BROKER));
    assert!(matches!(rig.sink.events[0], DeviceEvent::Started { .. }));
    assert!(rig.sink.events.contains(&DeviceEvent::Connected(BROKER)));
}

#[test]
fn failed_boot_attempt_is_not_counted() {
    let mut rig = Rig::new(config(60, 100), MockMqtt::down(), MemStorage::default());
    rig.start();
    assert_eq!(rig.device.liveness().consecutive_failures(), 0);
    assert_eq!(rig.device.liveness().tick_count(), 0);

    assert_eq!(rig.tick(), TickOutcome::Degraded(1));
}

#[test]
fn pending_reason_is_published_once_on_first_connect() {
    let mut storage = MemStorage::default();
    storage.put(REASON.0, REASON.1, b"Rebooted due to config portal timeout");
    let mut rig = Rig::new(config(60, 100), MockMqtt::up(), storage);
    rig.start();

    let info = rig.topics().info;
    assert_eq!(
        rig.mqtt().published_on(&info),
        vec!["Rebooted due to config portal timeout"]
    );
    assert!(journaled(&rig).is_none(), "reason must be deleted after delivery");
    assert!(rig.sink.events.contains(&DeviceEvent::RebootReasonDelivered(
        "Rebooted due to config portal timeout".into()
    )));

    // A reconnect later in the same boot never re-delivers, even if a new
    // reason was written in the meantime.
    rig.device.storage().put(REASON.0, REASON.1, b"stale");
    rig.mqtt_mut().drop_link();
    assert_eq!(rig.tick(), TickOutcome::Continue);
    assert_eq!(rig.mqtt().published_on(&info).len(), 1);
}

#[test]
fn empty_journal_publishes_nothing_on_info() {
    let rig = connected_rig(60, 100);
    assert!(rig.mqtt().published_on(&rig.topics().info).is_empty());
}

// ── Ping / pong ──────────────────────────────────────────────

#[test]
fn ping_is_answered_with_counter_and_addresses() {
    let mut rig = connected_rig(60, 100);
    let topics = rig.topics();

    rig.mqtt_mut().inject(&topics.ping, b"anything");
    assert_eq!(rig.tick(), TickOutcome::Continue);
    assert_eq!(
        rig.mqtt().published_on(&topics.pong),
        vec!["Hello #1, 192.168.1.42 mqtt:192.168.1.10"]
    );
    assert!(rig.sink.events.contains(&DeviceEvent::PongSent { counter: 1 }));
}

#[test]
fn pings_between_ticks_collapse_into_one_pong() {
    let mut rig = connected_rig(60, 100);
    let topics = rig.topics();

    rig.mqtt_mut().inject(&topics.ping, b"1");
    rig.mqtt_mut().inject(&topics.ping, b"2");
    rig.mqtt_mut().inject(&topics.ping, b"3");
    rig.tick();
    rig.mqtt_mut().inject(&topics.ping, b"4");
    rig.tick();
    rig.tick();

    let pongs = rig.mqtt().published_on(&topics.pong);
    assert_eq!(pongs.len(), 2);
    assert!(pongs[1].starts_with("Hello #2,"));
    assert_eq!(rig.device.signals().ping_counter(), 2);
}

#[test]
fn failed_pong_is_retried_with_the_same_number() {
    let mut rig = connected_rig(60, 100);
    let topics = rig.topics();

    rig.mqtt_mut().inject(&topics.ping, b"x");
    rig.mqtt_mut().reject_publishes = 1;
    assert_eq!(rig.tick(), TickOutcome::Continue);
    assert!(rig.mqtt().published_on(&topics.pong).is_empty());
    assert_eq!(rig.device.signals().ping_counter(), 0);
    assert!(rig.device.signals().ping_requested());

    rig.tick();
    rig.mqtt_mut().inject(&topics.ping, b"y");
    rig.tick();
    assert_eq!(
        rig.mqtt().published_on(&topics.pong),
        vec![
            "Hello #1, 192.168.1.42 mqtt:192.168.1.10",
            "Hello #2, 192.168.1.42 mqtt:192.168.1.10",
        ]
    );
    assert_eq!(rig.sink.count(|e| matches!(e, DeviceEvent::PongSent { .. })), 2);
}

#[test]
fn messages_on_other_topics_are_ignored() {
    let mut rig = connected_rig(60, 100);
    rig.mqtt_mut().inject("test/node/pong", b"echo");
    rig.mqtt_mut().inject("elsewhere/ping", b"x");
    rig.tick();
    assert!(rig.mqtt().published_on(&rig.topics().pong).is_empty());
}

// ── Heartbeat ────────────────────────────────────────────────

#[test]
fn heartbeat_fires_on_multiples_of_the_interval() {
    let mut rig = connected_rig(60, 3);
    for _ in 0..9 {
        rig.tick();
    }
    let alive = rig.mqtt().published_on(&rig.topics().alive);
    assert_eq!(alive, vec!["00:00:03", "00:00:06", "00:00:09"]);
}

#[test]
fn heartbeat_is_skipped_on_a_failed_tick() {
    let mut rig = connected_rig(60, 2);
    rig.tick();
    lose_broker(&mut rig);
    assert_eq!(rig.tick(), TickOutcome::Degraded(1));
    assert!(rig.mqtt().published_on(&rig.topics().alive).is_empty());
}

// ── Liveness ─────────────────────────────────────────────────

#[test]
fn failures_count_up_then_escalate_with_reason() {
    let mut rig = connected_rig(5, 100);
    lose_broker(&mut rig);

    for n in 1..5 {
        assert_eq!(rig.tick(), TickOutcome::Degraded(n));
        assert_eq!(rig.device.liveness().state(), LinkState::Degraded(n));
    }
    let reason = "Rebooted due to mqtt lost 5 cycles. Total cycles 5";
    assert_eq!(rig.tick(), TickOutcome::Restart(reason.into()));
    assert_eq!(journaled(&rig).as_deref(), Some(reason));
    assert_eq!(rig.sink.count(|e| *e == DeviceEvent::ConnectionLost), 1);
    assert!(rig.sink.events.contains(&DeviceEvent::Escalated { failures: 5, ticks: 5 }));
}

#[test]
fn escalation_recurs_and_reboot_pending_is_sticky() {
    let mut rig = connected_rig(2, 100);
    lose_broker(&mut rig);

    assert_eq!(rig.tick(), TickOutcome::Degraded(1));
    assert!(matches!(rig.tick(), TickOutcome::Restart(_)));
    assert_eq!(rig.tick(), TickOutcome::Degraded(3));
    assert_eq!(rig.device.liveness().state(), LinkState::RebootPending);
    assert_eq!(
        rig.tick(),
        TickOutcome::Restart("Rebooted due to mqtt lost 4 cycles. Total cycles 4".into())
    );
}

#[test]
fn recovery_resets_the_failure_streak() {
    let mut rig = connected_rig(10, 100);
    lose_broker(&mut rig);
    for _ in 0..3 {
        rig.tick();
    }
    assert_eq!(rig.device.liveness().consecutive_failures(), 3);

    rig.mqtt_mut().broker_up = true;
    assert_eq!(rig.tick(), TickOutcome::Continue);
    assert_eq!(rig.device.liveness().state(), LinkState::Connected);

    lose_broker(&mut rig);
    assert_eq!(rig.tick(), TickOutcome::Degraded(1));
}

#[test]
fn discovery_miss_is_a_failed_tick_without_connect() {
    let mut rig = Rig::with_locator(
        config(60, 100),
        MockMqtt::up(),
        MockLocator::default(),
        MemStorage::default(),
    );
    rig.start();
    assert_eq!(rig.tick(), TickOutcome::Degraded(1));
    assert_eq!(rig.mqtt().connects, 0);
    assert_eq!(rig.device.session().state().broker(), None);
}

#[test]
fn transport_is_serviced_on_failed_ticks() {
    let mut rig = connected_rig(60, 100);
    lose_broker(&mut rig);
    let before = rig.mqtt().polls;
    rig.tick();
    rig.tick();
    assert_eq!(rig.mqtt().polls, before + 2);
}

#[test]
fn reconnect_rediscovers_the_broker_every_time() {
    let mut rig = connected_rig(60, 100);
    rig.mqtt_mut().drop_link();
    rig.tick();
    rig.mqtt_mut().drop_link();
    rig.tick();
    assert_eq!(rig.mqtt().connects, 3);
}

// ── Control signals ──────────────────────────────────────────

#[test]
fn force_config_sets_marker_and_restarts() {
    let mut rig = connected_rig(60, 100);
    rig.inbox.push(ControlSignal::ForceConfig);

    assert_eq!(rig.tick(), TickOutcome::Restart(CONFIG_REQUEST_REASON.into()));
    assert_eq!(rig.device.storage().get(MARKER.0, MARKER.1), Some(vec![1u8]));
    assert_eq!(journaled(&rig).as_deref(), Some(CONFIG_REQUEST_REASON));
    assert!(rig.sink.events.contains(&DeviceEvent::ForceConfigRequested));
}

#[test]
fn broken_storage_never_blocks_a_restart() {
    let mut rig = Rig::new(config(60, 100), MockMqtt::up(), MemStorage::broken());
    rig.start();
    rig.inbox.push(ControlSignal::ForceConfig);
    assert_eq!(rig.tick(), TickOutcome::Restart(CONFIG_REQUEST_REASON.into()));
}

#[test]
fn staged_firmware_restarts_before_anything_else() {
    let mut rig = connected_rig(60, 1);
    let topics = rig.topics();
    rig.mqtt_mut().inject(&topics.ping, b"x");
    rig.ota.status.set(OtaStatus::ReadyToReboot);

    assert_eq!(rig.tick(), TickOutcome::Restart(FIRMWARE_UPDATE_REASON.into()));
    assert!(rig.mqtt().published_on(&topics.pong).is_empty());
    assert!(rig.mqtt().published_on(&topics.alive).is_empty());
    assert!(rig.device.storage().get(MARKER.0, MARKER.1).is_none());
    assert!(rig.sink.events.contains(&DeviceEvent::FirmwareStaged));
}

#[test]
fn config_request_survives_a_firmware_restart() {
    let mut rig = connected_rig(60, 100);
    rig.inbox.push(ControlSignal::ForceConfig);
    rig.ota.status.set(OtaStatus::ReadyToReboot);

    assert_eq!(rig.tick(), TickOutcome::Restart(FIRMWARE_UPDATE_REASON.into()));
    assert_eq!(rig.device.storage().get(MARKER.0, MARKER.1), Some(vec![1u8]));
    assert_eq!(journaled(&rig).as_deref(), Some(FIRMWARE_UPDATE_REASON));
    assert!(rig.sink.events.contains(&DeviceEvent::ForceConfigRequested));
    assert_eq!(rig.inbox.try_take(), None);
}

#[test]
fn upload_in_progress_does_not_disturb_the_tick() {
    let mut rig = connected_rig(60, 100);
    rig.ota.status.set(OtaStatus::InProgress);
    assert_eq!(rig.tick(), TickOutcome::Continue);
}

// ── Status snapshot ──────────────────────────────────────────

#[test]
fn status_snapshot_tracks_the_link() {
    let mut rig = connected_rig(60, 100);
    rig.tick();
    let s = rig.inbox.status();
    assert!(s.connected);
    assert_eq!(s.link, "connected");
    assert_eq!(s.ticks, 1);
    assert_eq!(s.broker, Some(BROKER));
    assert_eq!(s.topics.len(), 4);
    assert_eq!(s.uptime, "00:00:01");

    lose_broker(&mut rig);
    rig.tick();
    let s = rig.inbox.status();
    assert!(!s.connected);
    assert_eq!(s.link, "degraded");
    assert_eq!(s.failures, 1);
}
