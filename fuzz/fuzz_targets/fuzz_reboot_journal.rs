//! Fuzz target: `RebootJournal`
//!
//! Arbitrary bytes in the reason slot (as a corrupted flash page would
//! leave them) must drain once to a bounded string and never panic.
//!
//! cargo fuzz run fuzz_reboot_journal

#![no_main]

use std::collections::HashMap;

use libfuzzer_sys::fuzz_target;
use pinglink::app::ports::{StorageError, StoragePort};
use pinglink::journal::{MAX_REASON_LEN, RebootJournal};

#[derive(Default)]
struct Mem(HashMap<(String, String), Vec<u8>>);

impl StoragePort for Mem {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let v = self
            .0
            .get(&(ns.to_owned(), key.to_owned()))
            .ok_or(StorageError::NotFound)?;
        let n = v.len().min(buf.len());
        buf[..n].copy_from_slice(&v[..n]);
        Ok(n)
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.0.insert((ns.to_owned(), key.to_owned()), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.0.remove(&(ns.to_owned(), key.to_owned()));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.0.contains_key(&(ns.to_owned(), key.to_owned()))
    }
}

fuzz_target!(|data: &[u8]| {
    let mut storage = Mem::default();
    storage.write("boot", "reboot_reason", data).ok();

    let mut journal = RebootJournal::new();
    if let Some(reason) = journal.drain_if_present(&mut storage) {
        // Lossy decoding may widen invalid bytes to U+FFFD.
        assert!(reason.chars().count() <= MAX_REASON_LEN);
        assert!(!reason.is_empty());
    }
    assert!(journal.drain_if_present(&mut storage).is_none());
    assert!(!storage.exists("boot", "reboot_reason"));
});
