//! Per-pin hardware configuration.
//!
//! Configures GPIO directions, edge interrupts and ADC1 oneshot channels
//! using raw ESP-IDF sys calls.  Called from the pin backend while pins
//! are registered, before the event loop starts.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::info;

use crate::error::PinError;

// ── Error type ────────────────────────────────────────────────

/// Errors while configuring a peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    AdcInitFailed(i32),
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
    IsrAddFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AdcInitFailed(rc) => write!(f, "ADC1 init failed (rc={})", rc),
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
            Self::IsrAddFailed(rc) => write!(f, "GPIO ISR handler add failed (rc={})", rc),
        }
    }
}

impl From<HwInitError> for PinError {
    fn from(e: HwInitError) -> Self {
        match e {
            HwInitError::AdcInitFailed(rc)
            | HwInitError::GpioConfigFailed(rc)
            | HwInitError::IsrInstallFailed(rc)
            | HwInitError::IsrAddFailed(rc) => PinError::Hardware(rc),
        }
    }
}

#[cfg(target_os = "espidf")]
fn check(ret: esp_err_t, err: fn(i32) -> HwInitError) -> Result<(), HwInitError> {
    if ret == ESP_OK as i32 { Ok(()) } else { Err(err(ret)) }
}

// ── GPIO Outputs ──────────────────────────────────────────────

/// Configure `gpio` as an output, driven low.
///
/// The input path stays enabled so the level can be read back.
#[cfg(target_os = "espidf")]
pub fn configure_output(gpio: i32, open_drain: bool) -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << gpio,
        mode: if open_drain {
            gpio_mode_t_GPIO_MODE_INPUT_OUTPUT_OD
        } else {
            gpio_mode_t_GPIO_MODE_INPUT_OUTPUT
        },
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_DISABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: gpio was range-checked by the caller; main task only.
    check(unsafe { gpio_config(&cfg) }, HwInitError::GpioConfigFailed)?;
    unsafe { gpio_set_level(gpio, 0) };
    info!("hw_init: GPIO{} output ({})", gpio, if open_drain { "open-drain" } else { "push-pull" });
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_write(gpio: i32, high: bool) -> Result<(), HwInitError> {
    // SAFETY: gpio_set_level writes to an already-configured output pin.
    // Main-loop only.
    check(
        unsafe { gpio_set_level(gpio, u32::from(high)) },
        HwInitError::GpioConfigFailed,
    )
}

// ── GPIO Inputs ───────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn configure_input(gpio: i32, pull_up: bool, pull_down: bool) -> Result<(), HwInitError> {
    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << gpio,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: if pull_up {
            gpio_pullup_t_GPIO_PULLUP_ENABLE
        } else {
            gpio_pullup_t_GPIO_PULLUP_DISABLE
        },
        pull_down_en: if pull_down {
            gpio_pulldown_t_GPIO_PULLDOWN_ENABLE
        } else {
            gpio_pulldown_t_GPIO_PULLDOWN_DISABLE
        },
        intr_type: gpio_int_type_t_GPIO_INTR_DISABLE,
    };
    // SAFETY: gpio was range-checked by the caller; main task only.
    check(unsafe { gpio_config(&cfg) }, HwInitError::GpioConfigFailed)?;
    info!("hw_init: GPIO{} input (pu={}, pd={})", gpio, pull_up, pull_down);
    Ok(())
}

#[cfg(target_os = "espidf")]
pub fn gpio_read(gpio: i32) -> bool {
    // SAFETY: gpio_get_level is a read-only register access on an
    // already-configured pin; safe to call from main context.
    (unsafe { gpio_get_level(gpio) }) != 0
}

// ── GPIO ISR Service ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
use crate::events::INPUT_EDGES;

/// Shared handler for every armed input; `arg` carries the edge source.
#[cfg(target_os = "espidf")]
unsafe extern "C" fn input_edge_isr(arg: *mut core::ffi::c_void) {
    INPUT_EDGES.raise(arg as usize as u8);
}

/// Install the per-pin GPIO ISR service.  Idempotent.
#[cfg(target_os = "espidf")]
pub fn init_isr_service() -> Result<(), HwInitError> {
    // SAFETY: ESP_ERR_INVALID_STATE means it was already installed.
    let ret = unsafe { gpio_install_isr_service(0) };
    if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
        return Err(HwInitError::IsrInstallFailed(ret));
    }
    Ok(())
}

/// Arm both edges of `gpio` to raise `source` in [`INPUT_EDGES`].
///
/// The handler only sets a latch bit: no allocation, no I/O.
#[cfg(target_os = "espidf")]
pub fn arm_edge_interrupt(gpio: i32, source: u8) -> Result<(), HwInitError> {
    init_isr_service()?;
    // SAFETY: the ISR service is installed; the handler is a static fn
    // that only touches an atomic.  Adding a handler to a pin that has
    // one replaces it.
    unsafe {
        check(
            gpio_set_intr_type(gpio, gpio_int_type_t_GPIO_INTR_ANYEDGE),
            HwInitError::GpioConfigFailed,
        )?;
        check(
            gpio_isr_handler_add(gpio, Some(input_edge_isr), source as usize as *mut core::ffi::c_void),
            HwInitError::IsrAddFailed,
        )?;
        check(gpio_intr_enable(gpio), HwInitError::GpioConfigFailed)?;
    }
    info!("hw_init: GPIO{} edges -> source {}", gpio, source);
    Ok(())
}

// ── ADC (oneshot) ─────────────────────────────────────────────

#[cfg(target_os = "espidf")]
static mut ADC1_HANDLE: adc_oneshot_unit_handle_t = core::ptr::null_mut();

/// SAFETY: Must be called only from the main task.  The handle is
/// written once by `init_adc1()` during registration.
#[cfg(target_os = "espidf")]
unsafe fn adc1_handle() -> adc_oneshot_unit_handle_t {
    unsafe { ADC1_HANDLE }
}

/// Create the ADC1 oneshot unit on first use.
#[cfg(target_os = "espidf")]
fn init_adc1() -> Result<(), HwInitError> {
    // SAFETY: main task only; see adc1_handle().
    if !unsafe { adc1_handle() }.is_null() {
        return Ok(());
    }
    let init_cfg = adc_oneshot_unit_init_cfg_t {
        unit_id: adc_unit_t_ADC_UNIT_1,
        ulp_mode: adc_ulp_mode_t_ADC_ULP_MODE_DISABLE,
        ..Default::default()
    };
    // SAFETY: ADC1_HANDLE is only written here, once.
    check(
        unsafe { adc_oneshot_new_unit(&init_cfg, &raw mut ADC1_HANDLE) },
        HwInitError::AdcInitFailed,
    )?;
    info!("hw_init: ADC1 oneshot unit created");
    Ok(())
}

/// Configure one ADC1 channel at 12 dB attenuation, 12-bit.
#[cfg(target_os = "espidf")]
pub fn configure_adc_channel(channel: u32) -> Result<(), HwInitError> {
    init_adc1()?;
    let chan_cfg = adc_oneshot_chan_cfg_t {
        atten: adc_atten_t_ADC_ATTEN_DB_12,
        bitwidth: adc_bitwidth_t_ADC_BITWIDTH_12,
    };
    // SAFETY: handle initialised above; main task only.
    check(
        unsafe { adc_oneshot_config_channel(adc1_handle(), channel, &chan_cfg) },
        HwInitError::AdcInitFailed,
    )?;
    info!("hw_init: ADC1 CH{} configured", channel);
    Ok(())
}

/// One raw 12-bit sample.  `Err` carries the ESP-IDF status.
#[cfg(target_os = "espidf")]
pub fn adc1_read(channel: u32) -> Result<u16, i32> {
    let mut raw: i32 = 0;
    // SAFETY: adc1_handle() contract — main task only.
    let ret = unsafe { adc_oneshot_read(adc1_handle(), channel, &mut raw) };
    if ret != ESP_OK as i32 {
        return Err(ret);
    }
    Ok(raw.max(0) as u16)
}
