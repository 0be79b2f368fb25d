//! Device configuration parameters
//!
//! All tunable parameters for the PinLink peripheral.  Nothing here is
//! persisted; defaults can be overridden at boot from a JSON blob.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Longest advertised name that still fits a legacy advertising packet
/// next to the flags and 16-bit service-list AD structures.
pub const MAX_DEVICE_NAME_LEN: usize = 22;

/// Core device configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    // --- Identity ---
    /// Advertised local name.  Empty means "derive from the factory MAC".
    pub device_name: heapless::String<MAX_DEVICE_NAME_LEN>,

    // --- Timing ---
    /// Minimum spacing between heartbeat notifications (seconds)
    pub heartbeat_interval_secs: u32,
    /// Coarse housekeeping tick: heartbeat check, watchdog, stats (milliseconds)
    pub tick_interval_ms: u32,
    /// Consumer loop poll period for link events and input edges (milliseconds)
    pub poll_interval_ms: u32,
    /// Task watchdog timeout (milliseconds)
    pub watchdog_timeout_ms: u32,
    /// How long the connect greeting waits for an MTU exchange before
    /// it is sent at the default MTU anyway (milliseconds)
    pub connect_grace_ms: u32,

    // --- Protocol ---
    /// Reply `{"status":"error"}` to malformed commands and unknown pins
    /// instead of staying silent.  Off by default: existing clients rely
    /// on the silence.
    pub error_replies: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device_name: heapless::String::new(),

            heartbeat_interval_secs: 5,
            tick_interval_ms: 1000,  // 1 Hz
            poll_interval_ms: 20,    // 50 Hz
            watchdog_timeout_ms: 10_000,
            connect_grace_ms: 500,

            error_replies: false,
        }
    }
}

impl DeviceConfig {
    /// Parse a JSON override.  Missing fields keep their defaults.
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let cfg: Self =
            serde_json::from_slice(raw).map_err(|_| Error::Config("unparseable config JSON"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject parameter combinations the run loop cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 || self.poll_interval_ms == 0 {
            return Err(Error::Config("intervals must be non-zero"));
        }
        if self.poll_interval_ms > self.tick_interval_ms {
            return Err(Error::Config("poll interval longer than tick interval"));
        }
        if u64::from(self.heartbeat_interval_secs) * 1000 < u64::from(self.tick_interval_ms) {
            return Err(Error::Config("heartbeat shorter than one tick"));
        }
        if u64::from(self.watchdog_timeout_ms) < 2 * u64::from(self.tick_interval_ms) {
            return Err(Error::Config("watchdog must span at least two ticks"));
        }
        if u64::from(self.connect_grace_ms) >= self.heartbeat_interval_ms() {
            return Err(Error::Config("connect grace must be shorter than the heartbeat"));
        }
        Ok(())
    }

    /// Heartbeat interval in milliseconds.
    pub fn heartbeat_interval_ms(&self) -> u64 {
        u64::from(self.heartbeat_interval_secs) * 1000
    }
}
