//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against mock adapters.  All tests run on the host (x86_64) with no
//! broker, radio or flash required.

mod device_loop_tests;
mod mocks;
mod provisioning_flow_tests;
mod reboot_tests;
mod web_tests;
