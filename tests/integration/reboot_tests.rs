//! Integration tests for deliberate restarts and the reason journal.
//!
//! Each path that restarts the node (escalation, panic, firmware update)
//! must leave a reason the next boot publishes on the info topic.

use pinglink::adapters::ota::{OtaError, OtaGate, sign_image};
use pinglink::app::service::{FIRMWARE_UPDATE_REASON, TickOutcome};
use pinglink::diagnostics::record_panic;
use pinglink::journal::{MAX_REASON_LEN, RebootJournal};

use crate::mocks::{MemStorage, MockMqtt, Rig, config};

const PASSWORD: &str = "ota-secret";

fn upload(gate: &OtaGate, image: &[u8], signature: &str) -> Result<u32, OtaError> {
    let mut rest = image;
    gate.receive(PASSWORD, image.len() as u32, signature, |buf| {
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        rest = &rest[n..];
        Ok(n)
    })
}

fn next_boot_info(storage: MemStorage) -> Vec<String> {
    let mut rig = Rig::new(config(60, 100), MockMqtt::up(), storage);
    rig.start();
    let info = rig.topics().info;
    let delivered = rig.mqtt().published_on(&info);
    delivered
}

#[test]
fn escalation_reason_survives_the_restart() {
    let mut rig = Rig::new(config(3, 100), MockMqtt::up(), MemStorage::default());
    rig.start();
    rig.mqtt_mut().drop_link();
    rig.mqtt_mut().broker_up = false;
    while !matches!(rig.tick(), TickOutcome::Restart(_)) {}

    let storage = rig.device.storage().clone();
    assert_eq!(
        next_boot_info(storage),
        vec!["Rebooted due to mqtt lost 3 cycles. Total cycles 3"]
    );
}

#[test]
fn panic_reason_survives_the_restart() {
    let mut storage = MemStorage::default();
    record_panic(&mut storage, "index out of bounds");
    assert_eq!(
        next_boot_info(storage),
        vec!["Rebooted due to panic: index out of bounds"]
    );
}

#[test]
fn long_reasons_are_cut_to_the_slot_size() {
    let mut storage = MemStorage::default();
    let long = "é".repeat(MAX_REASON_LEN);
    RebootJournal::new().write_reason(&mut storage, &long);

    let delivered = next_boot_info(storage);
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].len() <= MAX_REASON_LEN);
    assert!(delivered[0].chars().all(|c| c == 'é'));
}

#[test]
fn broken_flash_loses_the_reason_but_boots() {
    let mut storage = MemStorage::broken();
    RebootJournal::new().write_reason(&mut storage, "lost");
    assert!(next_boot_info(storage).is_empty());
}

#[test]
fn signed_upload_restarts_the_device() {
    let mut rig = Rig::new(config(60, 100), MockMqtt::up(), MemStorage::default());
    rig.start();
    let gate = OtaGate::new();

    let image = vec![0xA5; 10_000];
    assert_eq!(upload(&gate, &image, &sign_image(PASSWORD, &image)), Ok(10_000));

    assert_eq!(
        rig.device.tick(&rig.sys, &gate, &mut rig.sink),
        TickOutcome::Restart(FIRMWARE_UPDATE_REASON.into())
    );
    assert_eq!(
        next_boot_info(rig.device.storage().clone()),
        vec![FIRMWARE_UPDATE_REASON]
    );
}

#[test]
fn rejected_upload_leaves_the_device_running() {
    let mut rig = Rig::new(config(60, 100), MockMqtt::up(), MemStorage::default());
    rig.start();
    let gate = OtaGate::new();

    let image = vec![0x5A; 2048];
    assert_eq!(
        upload(&gate, &image, &sign_image("wrong", &image)),
        Err(OtaError::SignatureMismatch)
    );
    assert_eq!(
        rig.device.tick(&rig.sys, &gate, &mut rig.sink),
        TickOutcome::Continue
    );
}
