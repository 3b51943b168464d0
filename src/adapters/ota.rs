//! Password-gated OTA firmware update, backed by the `esp-ota` crate.
//!
//! Flow: `POST /update` → [`OtaGate::receive`] → N × chunk → finalize → reboot
//!
//! The pusher signs the image with `HMAC-SHA256(ota_password, image)` and
//! sends the hex tag in `X-Ota-Signature`.  The tag is computed
//! incrementally while the image streams to the inactive partition and
//! compared in constant time before the partition is marked bootable.
//!
//! [`OtaGate`] is shared between the HTTP task (which streams the image)
//! and the polling tick (which polls it through [`OtaPort`] and performs
//! the restart).

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};
use core::time::Duration;
use std::sync::{Mutex, PoisonError};

use burster::Limiter;
use log::{info, warn};

use crate::app::ports::{OtaPort, OtaStatus};

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB
const CHUNK_SIZE: usize = 4096;

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    AlreadyInProgress,
    RateLimited,
    InvalidSize,
    /// Missing or malformed `X-Ota-Signature` header.
    InvalidSignature,
    /// Image HMAC does not match the supplied signature.
    SignatureMismatch,
    BeginFailed,
    WriteFailed,
    ReadFailed,
    VerifyFailed,
    BootSetFailed,
    IncompleteTransfer,
    NotReceiving,
    Overflow,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInProgress => write!(f, "OTA session already in progress"),
            Self::RateLimited => write!(f, "too many OTA attempts"),
            Self::InvalidSize => write!(f, "firmware size out of range (max 4 MB)"),
            Self::InvalidSignature => write!(f, "signature must be 64 hex digits"),
            Self::SignatureMismatch => write!(f, "image signature mismatch"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::ReadFailed => write!(f, "request body read failed"),
            Self::VerifyFailed => write!(f, "OTA verification failed"),
            Self::BootSetFailed => write!(f, "set boot partition failed"),
            Self::IncompleteTransfer => write!(f, "body shorter than declared size"),
            Self::NotReceiving => write!(f, "operation requires active Receiving state"),
            Self::Overflow => write!(f, "body longer than declared size"),
        }
    }
}

impl OtaError {
    /// HTTP status for the upload response.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::AlreadyInProgress => 409,
            Self::RateLimited => 429,
            Self::InvalidSize | Self::InvalidSignature => 400,
            Self::SignatureMismatch => 403,
            Self::IncompleteTransfer | Self::Overflow | Self::ReadFailed => 400,
            _ => 500,
        }
    }
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Receiving { expected_size: u32, bytes_written: u32 },
    Verifying,
    ReadyToReboot,
    Failed,
}

// ── Manager ───────────────────────────────────────────────────

/// One upload.  Lives on the HTTP task for the duration of the request.
///
/// On ESP-IDF targets the image goes to the inactive partition via
/// `esp-ota`; on simulation targets only the bookkeeping and the
/// signature check run.
pub struct OtaManager {
    state: OtaState,
    key: Vec<u8>,
    expected_tag: [u8; 32],
    mac: Option<hmac_sha256::HMAC>,
    #[cfg(target_os = "espidf")]
    ota_update: Option<esp_ota::OtaUpdate>,
}

impl OtaManager {
    pub fn new(password: &str) -> Self {
        Self {
            state: OtaState::Idle,
            key: password.as_bytes().to_vec(),
            expected_tag: [0u8; 32],
            mac: None,
            #[cfg(target_os = "espidf")]
            ota_update: None,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// Validate size and signature, then open the inactive partition.
    pub fn begin(&mut self, firmware_size: u32, signature_hex: &str) -> Result<(), OtaError> {
        if self.state != OtaState::Idle {
            return Err(OtaError::AlreadyInProgress);
        }
        if firmware_size == 0 || firmware_size > MAX_FIRMWARE_SIZE {
            return Err(OtaError::InvalidSize);
        }
        self.expected_tag = parse_signature(signature_hex).ok_or(OtaError::InvalidSignature)?;

        #[cfg(target_os = "espidf")]
        {
            let update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("esp-ota begin failed: {:?}", e);
                OtaError::BeginFailed
            })?;
            self.ota_update = Some(update);
        }

        self.mac = Some(hmac_sha256::HMAC::new(&self.key));
        self.state = OtaState::Receiving {
            expected_size: firmware_size,
            bytes_written: 0,
        };
        info!("OTA: begin ({} bytes)", firmware_size);
        Ok(())
    }

    /// Append the next slice of the image.  Returns total bytes written.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<u32, OtaError> {
        let OtaState::Receiving {
            expected_size,
            bytes_written,
        } = self.state
        else {
            return Err(OtaError::NotReceiving);
        };

        let new_written = u32::try_from(data.len())
            .ok()
            .and_then(|len| bytes_written.checked_add(len))
            .filter(|&n| n <= expected_size)
            .ok_or(OtaError::Overflow)?;

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.as_mut() else {
                return Err(OtaError::NotReceiving);
            };
            if let Err(e) = update.write(data) {
                warn!("esp-ota write failed: {:?}", e);
                self.abort();
                return Err(OtaError::WriteFailed);
            }
        }

        if let Some(mac) = self.mac.as_mut() {
            mac.update(data);
        }
        self.state = OtaState::Receiving {
            expected_size,
            bytes_written: new_written,
        };
        Ok(new_written)
    }

    /// Check the signature, mark the partition bootable, set ReadyToReboot.
    pub fn finalize(&mut self) -> Result<(), OtaError> {
        match self.state {
            OtaState::Receiving {
                expected_size,
                bytes_written,
            } if bytes_written == expected_size => {}
            OtaState::Receiving { .. } => return Err(OtaError::IncompleteTransfer),
            _ => return Err(OtaError::NotReceiving),
        }

        self.state = OtaState::Verifying;

        let tag = self.mac.take().map(|m| m.finalize()).unwrap_or_default();
        if !constant_time_eq(&tag, &self.expected_tag) {
            warn!("OTA: signature mismatch, discarding image");
            self.abort();
            self.state = OtaState::Failed;
            return Err(OtaError::SignatureMismatch);
        }

        #[cfg(target_os = "espidf")]
        {
            let Some(update) = self.ota_update.take() else {
                self.state = OtaState::Failed;
                return Err(OtaError::NotReceiving);
            };
            let mut completed = update.finalize().map_err(|e| {
                warn!("esp-ota finalize failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::VerifyFailed
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("esp-ota set_as_boot_partition failed: {:?}", e);
                self.state = OtaState::Failed;
                OtaError::BootSetFailed
            })?;
        }

        self.state = OtaState::ReadyToReboot;
        info!("OTA: finalized, ready to reboot");
        Ok(())
    }

    /// Abort the current upload; resets to Idle.
    pub fn abort(&mut self) {
        #[cfg(target_os = "espidf")]
        {
            // esp-ota aborts automatically when OtaUpdate is dropped
            self.ota_update.take();
        }
        self.mac = None;
        self.state = OtaState::Idle;
        warn!("OTA: aborted");
    }
}

// ── Gate shared with the polling tick ─────────────────────────

const GATE_IDLE: u8 = 0;
const GATE_BUSY: u8 = 1;
const GATE_READY: u8 = 2;

/// Serialises uploads, rate-limits attempts and reports progress to the
/// tick through [`OtaPort`].
pub struct OtaGate {
    status: AtomicU8,
    limiter: Mutex<burster::TokenBucket<fn() -> Duration>>,
}

impl Default for OtaGate {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaGate {
    pub fn new() -> Self {
        Self {
            status: AtomicU8::new(GATE_IDLE),
            // Burst of 3 attempts, one more per second.
            limiter: Mutex::new(burster::TokenBucket::new_with_time_provider(
                1,
                3,
                super::time::monotonic as fn() -> Duration,
            )),
        }
    }

    fn try_begin(&self) -> Result<(), OtaError> {
        let allowed = self
            .limiter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_consume(1)
            .is_ok();
        if !allowed {
            return Err(OtaError::RateLimited);
        }
        self.status
            .compare_exchange(GATE_IDLE, GATE_BUSY, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| OtaError::AlreadyInProgress)
    }

    /// Run one upload end to end.
    ///
    /// `read` fills the buffer from the request body and returns the byte
    /// count, 0 at end of body.  Returns the number of bytes flashed.
    pub fn receive(
        &self,
        password: &str,
        size: u32,
        signature_hex: &str,
        mut read: impl FnMut(&mut [u8]) -> Result<usize, OtaError>,
    ) -> Result<u32, OtaError> {
        self.try_begin()?;

        let mut manager = OtaManager::new(password);
        let result = stream_image(&mut manager, size, signature_hex, &mut read);

        match result {
            Ok(_) => self.status.store(GATE_READY, Ordering::Release),
            Err(e) => {
                warn!("OTA: upload failed ({})", e);
                if matches!(manager.state(), OtaState::Receiving { .. }) {
                    manager.abort();
                }
                self.status.store(GATE_IDLE, Ordering::Release);
            }
        }
        result
    }
}

impl OtaPort for OtaGate {
    fn poll(&self) -> OtaStatus {
        match self.status.load(Ordering::Acquire) {
            GATE_BUSY => OtaStatus::InProgress,
            GATE_READY => OtaStatus::ReadyToReboot,
            _ => OtaStatus::Idle,
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn stream_image(
    manager: &mut OtaManager,
    size: u32,
    signature_hex: &str,
    read: &mut impl FnMut(&mut [u8]) -> Result<usize, OtaError>,
) -> Result<u32, OtaError> {
    manager.begin(size, signature_hex)?;
    let mut buf = [0u8; CHUNK_SIZE];
    let mut written = 0;
    while written < size {
        let n = read(&mut buf)?;
        if n == 0 {
            break;
        }
        written = manager.write_chunk(&buf[..n])?;
    }
    manager.finalize()?;
    Ok(written)
}

fn parse_signature(hex: &str) -> Option<[u8; 32]> {
    let hex = hex.trim().as_bytes();
    if hex.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (byte, pair) in out.iter_mut().zip(hex.chunks_exact(2)) {
        let s = core::str::from_utf8(pair).ok()?;
        *byte = u8::from_str_radix(s, 16).ok()?;
    }
    Some(out)
}

fn constant_time_eq(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Lowercase hex HMAC of `image` under `password`; what a pusher sends.
pub fn sign_image(password: &str, image: &[u8]) -> String {
    use core::fmt::Write as _;
    let tag = hmac_sha256::HMAC::mac(image, password.as_bytes());
    let mut out = String::with_capacity(64);
    for b in tag {
        let _ = write!(out, "{b:02x}");
    }
    out
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running firmware as valid.
///
/// Without this, the rollback watchdog reverts to the previous firmware
/// after three consecutive failed boots.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}

// ── Tests ─────────────────────────────────────────────────────
