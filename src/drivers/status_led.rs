//! Onboard presence indicator.
//!
//! A single LED on [`pins::INDICATOR_GPIO`]: lit while a client is
//! connected, and mirrors the last value written by a `set` command.
//!
//! ## Dual-target design
//!
//! On ESP-IDF: drives the GPIO via hw_init.
//! On host/test: tracks state in-memory only.

#[cfg(target_os = "espidf")]
use log::warn;

use crate::app::ports::IndicatorPort;
#[cfg(target_os = "espidf")]
use crate::drivers::hw_init;
use crate::pins;

pub struct StatusLed {
    gpio: i32,
    on: bool,
}

impl StatusLed {
    /// Claim the indicator GPIO, LED off.
    pub fn new() -> Self {
        let gpio = pins::INDICATOR_GPIO;
        #[cfg(target_os = "espidf")]
        if let Err(e) = hw_init::configure_output(gpio, false) {
            warn!("status_led: GPIO{} config failed: {}", gpio, e);
        }
        Self { gpio, on: false }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    #[cfg(target_os = "espidf")]
    fn drive(&mut self, on: bool) {
        if let Err(e) = hw_init::gpio_write(self.gpio, on) {
            warn!("status_led: GPIO{} write failed: {}", self.gpio, e);
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn drive(&mut self, on: bool) {
        if self.on != on {
            log::trace!("status_led(sim): GPIO{} -> {}", self.gpio, on);
        }
    }
}

impl Default for StatusLed {
    fn default() -> Self {
        Self::new()
    }
}

impl IndicatorPort for StatusLed {
    fn set(&mut self, on: bool) {
        self.drive(on);
        self.on = on;
    }
}
