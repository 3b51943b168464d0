//! Application core: pure domain logic, zero I/O.
//!
//! This module contains the orchestration rules for the node: the per-tick
//! device loop, the signals it consumes and the events it emits.  All
//! interaction with the network stack happens through **port traits**
//! defined in [`ports`], keeping this layer fully testable without a radio.

pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
