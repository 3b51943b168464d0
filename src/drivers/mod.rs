//! On-chip peripheral drivers.

pub mod watchdog;
