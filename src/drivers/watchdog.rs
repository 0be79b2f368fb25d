//! Task watchdog (TWDT) for the consumer loop.
//!
//! The loop subscribes once at boot and feeds from the housekeeping
//! tick.  If the loop stalls for `timeout_ms` the TWDT panics and the
//! chip reboots.  On host targets this is bookkeeping only.

use log::{info, warn};

pub struct Watchdog {
    timeout_ms: u32,
    subscribed: bool,
    feeds: u32,
}

impl Watchdog {
    /// Reconfigure the TWDT and subscribe the calling task.
    ///
    /// A failed subscription is logged, not fatal: the loop still runs,
    /// just unguarded.
    pub fn new(timeout_ms: u32) -> Self {
        let subscribed = match platform_subscribe(timeout_ms) {
            Ok(()) => {
                info!("Watchdog: subscribed, {} ms timeout", timeout_ms);
                true
            }
            Err(rc) => {
                warn!("Watchdog: subscribe failed (rc={}), loop unguarded", rc);
                false
            }
        };
        Self {
            timeout_ms,
            subscribed,
            feeds: 0,
        }
    }

    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Feeds since boot.
    pub fn feeds(&self) -> u32 {
        self.feeds
    }

    /// Must be called more often than the timeout.
    pub fn feed(&mut self) {
        if self.subscribed {
            platform_feed();
        }
        self.feeds = self.feeds.wrapping_add(1);
    }
}

// ── Platform ──────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
fn platform_subscribe(timeout_ms: u32) -> Result<(), i32> {
    use esp_idf_svc::sys::*;

    let cfg = esp_task_wdt_config_t {
        timeout_ms,
        idle_core_mask: 0,
        trigger_panic: true,
    };
    // SAFETY: plain config struct, copied by the driver.
    let ret = unsafe { esp_task_wdt_reconfigure(&cfg) };
    if ret != ESP_OK as i32 {
        // Already running with the sdkconfig timeout; keep going.
        warn!("Watchdog: reconfigure returned {}", ret);
    }
    // SAFETY: NULL subscribes the calling task.
    let ret = unsafe { esp_task_wdt_add(core::ptr::null_mut()) };
    if ret == ESP_OK as i32 { Ok(()) } else { Err(ret) }
}

#[cfg(target_os = "espidf")]
fn platform_feed() {
    // SAFETY: only reached after the calling task subscribed.
    unsafe {
        esp_idf_svc::sys::esp_task_wdt_reset();
    }
}

#[cfg(not(target_os = "espidf"))]
fn platform_subscribe(_timeout_ms: u32) -> Result<(), i32> {
    Ok(())
}

#[cfg(not(target_os = "espidf"))]
fn platform_feed() {}
