//! Default GPIO assignments for the PinLink demo board (ESP32-S3).
//!
//! Single source of truth — `main` registers these at boot and every
//! driver references this module rather than hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Onboard presence indicator
// ---------------------------------------------------------------------------

/// Status LED: lit while a client is connected, mirrors the last `set`.
pub const INDICATOR_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// Exposed digital outputs
// ---------------------------------------------------------------------------

pub const LED1_GPIO: i32 = 11;
pub const LED2_GPIO: i32 = 12;

// ---------------------------------------------------------------------------
// Exposed digital inputs
// ---------------------------------------------------------------------------

/// Active-low push-button, internal pull-up, both edges notify.
pub const BUTTON_GPIO: i32 = 16;

// ---------------------------------------------------------------------------
// Exposed analog inputs (ADC1 only — ADC2 is shared with the radio)
// ---------------------------------------------------------------------------

/// ADC1 channel 4 on ESP32-S3.
pub const ADC_GPIO: i32 = 5;

/// First and last GPIO routed to ADC1 (channel = gpio - 1).
pub const ADC1_FIRST_GPIO: i32 = 1;
pub const ADC1_LAST_GPIO: i32 = 10;

/// Highest GPIO number on the ESP32-S3.
pub const MAX_GPIO: i32 = 48;

/// Map a GPIO to its ADC1 channel, if it has one.
pub const fn adc1_channel(gpio: i32) -> Option<u32> {
    if gpio >= ADC1_FIRST_GPIO && gpio <= ADC1_LAST_GPIO {
        Some((gpio - ADC1_FIRST_GPIO) as u32)
    } else {
        None
    }
}
