//! PingLink node firmware library.
//!
//! Exposes the pure-logic modules for integration testing and for the
//! firmware binary. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module, with a simulation
//! backend on every other target.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod control;
pub mod diagnostics;
pub mod error;
pub mod identity;
pub mod journal;
pub mod liveness;
pub mod provisioning;
pub mod session;
pub mod topics;
pub mod web;

pub mod adapters;
pub mod drivers;
