//! PinLink firmware library.
//!
//! Exposes the protocol core and its adapters for integration testing
//! and the binary.  All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module; host builds get
//! simulation stand-ins.

#![deny(unused_must_use)]

pub mod app;
pub mod config;
pub mod error;
pub mod events;
pub mod pins;
pub mod scheduler;

pub mod adapters;
pub mod drivers;
