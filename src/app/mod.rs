//! Application core — pure protocol logic, zero I/O.
//!
//! The pin registry, the JSON codec, the command processor and the
//! connection state machine, tied together by [`service`].  All
//! interaction with hardware and the BLE stack happens through **port
//! traits** defined in [`ports`], keeping this layer fully testable
//! without real peripherals.

pub mod commands;
pub mod connection;
pub mod ports;
pub mod protocol;
pub mod registry;
pub mod service;
