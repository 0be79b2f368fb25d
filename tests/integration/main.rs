//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises the peripheral
//! service against mock adapters.  All tests run on the host with no
//! real hardware or radio required.

#![cfg(not(target_os = "espidf"))]

mod mock_hw;
mod service_tests;
