//! Fuzz target: `OtaGate::receive`
//!
//! First 64 bytes are taken as the signature header, the rest as the body
//! delivered in fuzzer-chosen chunk sizes.  An unsigned body must never be
//! accepted, and a failed upload must leave the gate idle.
//!
//! cargo fuzz run fuzz_ota_upload

#![no_main]

use libfuzzer_sys::fuzz_target;
use pinglink::adapters::ota::{OtaGate, sign_image};
use pinglink::app::ports::{OtaPort, OtaStatus};

const PASSWORD: &str = "fuzz";

fuzz_target!(|data: &[u8]| {
    if data.len() < 65 {
        return;
    }
    let (sig, rest) = data.split_at(64);
    let (step, body) = (usize::from(rest[0]).max(1), &rest[1..]);
    let Ok(sig) = core::str::from_utf8(sig) else {
        return;
    };

    let gate = OtaGate::new();
    let mut remaining = body;
    let result = gate.receive(PASSWORD, body.len() as u32, sig, |buf| {
        let n = remaining.len().min(buf.len()).min(step);
        buf[..n].copy_from_slice(&remaining[..n]);
        remaining = &remaining[n..];
        Ok(n)
    });

    match result {
        Ok(_) => {
            assert_eq!(sig.trim(), sign_image(PASSWORD, body));
            assert_eq!(gate.poll(), OtaStatus::ReadyToReboot);
        }
        Err(_) => assert_eq!(gate.poll(), OtaStatus::Idle),
    }
});
