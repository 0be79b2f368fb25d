//! Hardware adapter — bridges GPIO / ADC1 to the [`PinBackend`] port.
//!
//! This is the only module in the system that opens pin drivers.  On
//! espidf each handle is a thin wrapper over `hw_init`; on host
//! targets [`SimPins`] hands out in-memory pins so the core runs and
//! tests without peripherals.
//!
//! Output handles implement the `embedded-hal` 1.0 `StatefulOutputPin`
//! trait, input handles `InputPin`.

use crate::error::PinError;
use crate::pins;

/// Reject GPIO numbers the chip does not have.
fn check_gpio(gpio: i32) -> Result<(), PinError> {
    if (0..=pins::MAX_GPIO).contains(&gpio) {
        Ok(())
    } else {
        Err(PinError::InvalidGpio(gpio))
    }
}

fn adc_channel(gpio: i32) -> Result<u32, PinError> {
    check_gpio(gpio)?;
    pins::adc1_channel(gpio).ok_or(PinError::NotAnalogCapable(gpio))
}

// ═══════════════════════════════════════════════════════════════
//  ESP-IDF backend
// ═══════════════════════════════════════════════════════════════

#[cfg(target_os = "espidf")]
pub use esp::{EspAnalog, EspInput, EspOutput, EspPins};

#[cfg(target_os = "espidf")]
mod esp {
    use core::convert::Infallible;

    use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin, StatefulOutputPin};

    use super::{adc_channel, check_gpio};
    use crate::app::ports::{AnalogPin, OutputMode, PinBackend, Pull};
    use crate::drivers::hw_init;
    use crate::error::PinError;

    /// Opens pins straight on the SoC.
    #[derive(Default)]
    pub struct EspPins;

    impl EspPins {
        pub fn new() -> Self {
            Self
        }
    }

    pub struct EspOutput {
        gpio: i32,
    }

    pub struct EspInput {
        gpio: i32,
    }

    pub struct EspAnalog {
        channel: u32,
    }

    impl PinBackend for EspPins {
        type Output = EspOutput;
        type Input = EspInput;
        type Analog = EspAnalog;

        fn open_output(&mut self, gpio: i32, mode: OutputMode) -> Result<EspOutput, PinError> {
            check_gpio(gpio)?;
            hw_init::configure_output(gpio, mode == OutputMode::OpenDrain)?;
            Ok(EspOutput { gpio })
        }

        fn open_input(
            &mut self,
            gpio: i32,
            pull: Option<Pull>,
            edge_source: Option<u8>,
        ) -> Result<EspInput, PinError> {
            check_gpio(gpio)?;
            hw_init::configure_input(gpio, pull == Some(Pull::Up), pull == Some(Pull::Down))?;
            if let Some(source) = edge_source {
                hw_init::arm_edge_interrupt(gpio, source)?;
            }
            Ok(EspInput { gpio })
        }

        fn open_analog(&mut self, gpio: i32) -> Result<EspAnalog, PinError> {
            let channel = adc_channel(gpio)?;
            hw_init::configure_adc_channel(channel)?;
            Ok(EspAnalog { channel })
        }
    }

    impl ErrorType for EspOutput {
        type Error = ErrorKind;
    }

    impl OutputPin for EspOutput {
        fn set_low(&mut self) -> Result<(), ErrorKind> {
            hw_init::gpio_write(self.gpio, false).map_err(|_| ErrorKind::Other)
        }

        fn set_high(&mut self) -> Result<(), ErrorKind> {
            hw_init::gpio_write(self.gpio, true).map_err(|_| ErrorKind::Other)
        }
    }

    impl StatefulOutputPin for EspOutput {
        fn is_set_high(&mut self) -> Result<bool, ErrorKind> {
            Ok(hw_init::gpio_read(self.gpio))
        }

        fn is_set_low(&mut self) -> Result<bool, ErrorKind> {
            Ok(!hw_init::gpio_read(self.gpio))
        }
    }

    impl ErrorType for EspInput {
        type Error = Infallible;
    }

    impl InputPin for EspInput {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(hw_init::gpio_read(self.gpio))
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            Ok(!hw_init::gpio_read(self.gpio))
        }
    }

    impl AnalogPin for EspAnalog {
        /// ESP-IDF status code.
        type Error = i32;

        fn read_raw(&mut self) -> Result<u16, i32> {
            hw_init::adc1_read(self.channel)
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Host simulation backend
// ═══════════════════════════════════════════════════════════════

#[cfg(not(target_os = "espidf"))]
pub use sim::{sim_set_adc, sim_set_input, SimAnalog, SimInput, SimOutput, SimPins};

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::convert::Infallible;
    use core::sync::atomic::{AtomicU16, AtomicU64, Ordering};

    use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};
    use log::debug;

    use super::{adc_channel, check_gpio};
    use crate::app::ports::{AnalogPin, OutputMode, PinBackend, Pull};
    use crate::error::PinError;
    use crate::pins;

    /// Simulated input levels, one bit per GPIO.
    static SIM_INPUT_LEVELS: AtomicU64 = AtomicU64::new(0);

    /// Simulated raw ADC1 samples, indexed by channel.
    static SIM_ADC: [AtomicU16; 10] = [const { AtomicU16::new(0) }; 10];

    /// Drive a simulated input pin.
    pub fn sim_set_input(gpio: i32, high: bool) {
        if !(0..=pins::MAX_GPIO).contains(&gpio) {
            return;
        }
        let bit = 1u64 << gpio;
        if high {
            SIM_INPUT_LEVELS.fetch_or(bit, Ordering::Relaxed);
        } else {
            SIM_INPUT_LEVELS.fetch_and(!bit, Ordering::Relaxed);
        }
    }

    /// Set the raw sample a simulated analog pin returns.
    pub fn sim_set_adc(gpio: i32, raw: u16) {
        if let Some(ch) = pins::adc1_channel(gpio) {
            SIM_ADC[ch as usize].store(raw, Ordering::Relaxed);
        }
    }

    /// In-memory pins with the same validation as the SoC backend.
    #[derive(Default)]
    pub struct SimPins;

    impl SimPins {
        pub fn new() -> Self {
            Self
        }
    }

    pub struct SimOutput {
        high: bool,
    }

    pub struct SimInput {
        gpio: i32,
    }

    pub struct SimAnalog {
        channel: u32,
    }

    impl PinBackend for SimPins {
        type Output = SimOutput;
        type Input = SimInput;
        type Analog = SimAnalog;

        fn open_output(&mut self, gpio: i32, mode: OutputMode) -> Result<SimOutput, PinError> {
            check_gpio(gpio)?;
            debug!("hw(sim): GPIO{} output {:?}", gpio, mode);
            Ok(SimOutput { high: false })
        }

        fn open_input(
            &mut self,
            gpio: i32,
            pull: Option<Pull>,
            edge_source: Option<u8>,
        ) -> Result<SimInput, PinError> {
            check_gpio(gpio)?;
            if pull == Some(Pull::Up) {
                sim_set_input(gpio, true);
            }
            debug!("hw(sim): GPIO{} input, edge source {:?}", gpio, edge_source);
            Ok(SimInput { gpio })
        }

        fn open_analog(&mut self, gpio: i32) -> Result<SimAnalog, PinError> {
            let channel = adc_channel(gpio)?;
            Ok(SimAnalog { channel })
        }
    }

    impl ErrorType for SimOutput {
        type Error = Infallible;
    }

    impl OutputPin for SimOutput {
        fn set_low(&mut self) -> Result<(), Infallible> {
            self.high = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Infallible> {
            self.high = true;
            Ok(())
        }
    }

    impl StatefulOutputPin for SimOutput {
        fn is_set_high(&mut self) -> Result<bool, Infallible> {
            Ok(self.high)
        }

        fn is_set_low(&mut self) -> Result<bool, Infallible> {
            Ok(!self.high)
        }
    }

    impl ErrorType for SimInput {
        type Error = Infallible;
    }

    impl InputPin for SimInput {
        fn is_high(&mut self) -> Result<bool, Infallible> {
            Ok(SIM_INPUT_LEVELS.load(Ordering::Relaxed) & (1u64 << self.gpio) != 0)
        }

        fn is_low(&mut self) -> Result<bool, Infallible> {
            self.is_high().map(|h| !h)
        }
    }

    impl AnalogPin for SimAnalog {
        type Error = Infallible;

        fn read_raw(&mut self) -> Result<u16, Infallible> {
            Ok(SIM_ADC[self.channel as usize].load(Ordering::Relaxed))
        }
    }
}
