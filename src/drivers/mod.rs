//! Indicator and watchdog drivers, plus per-pin hardware configuration.

pub mod hw_init;
pub mod status_led;
pub mod watchdog;
