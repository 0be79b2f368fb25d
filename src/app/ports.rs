//! Port traits — the hexagonal boundary between the protocol engine and
//! the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ PeripheralService (domain)
//! ```
//!
//! Driven adapters (pin drivers, indicator, BLE stack) implement these
//! traits.  The [`PeripheralService`](super::service::PeripheralService)
//! consumes them via generics, so the domain core never touches
//! hardware directly.
//!
//! Digital pins use the `embedded-hal` 1.0 traits as-is; only the ADC
//! and the wireless link need traits of our own.

use embedded_hal::digital::{InputPin, StatefulOutputPin};

use crate::error::{LinkError, PinError};

use super::protocol::Outbound;

/// Opaque connection identifier handed out by the BLE stack.
pub type ConnHandle = u16;

/// Opaque attribute (characteristic value) handle.
pub type AttrHandle = u16;

// ───────────────────────────────────────────────────────────────
// Pin driver ports (driven adapter: domain ↔ GPIO / ADC)
// ───────────────────────────────────────────────────────────────

/// Output driver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    PushPull,
    OpenDrain,
}

/// How a digital input reports changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    /// Both edges armed; each edge raises an input-change task.
    Interrupt,
    /// Sampled only when a snapshot is taken.
    Polled,
}

/// Internal bias resistor for a digital input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Up,
    Down,
}

/// One-shot analog sampler.
pub trait AnalogPin {
    type Error: core::fmt::Debug;

    /// Take one raw sample at the device's native resolution.
    fn read_raw(&mut self) -> Result<u16, Self::Error>;
}

/// Opens driver handles for registered pins.
///
/// The registry owns the backend and every handle it returns, so each
/// GPIO is touched only from the consumer context.
pub trait PinBackend {
    type Output: StatefulOutputPin;
    type Input: InputPin;
    type Analog: AnalogPin;

    fn open_output(&mut self, gpio: i32, mode: OutputMode) -> Result<Self::Output, PinError>;

    /// `edge_source` is `Some(bit)` when both edges must raise `bit`
    /// in the device edge latch.
    fn open_input(
        &mut self,
        gpio: i32,
        pull: Option<Pull>,
        edge_source: Option<u8>,
    ) -> Result<Self::Input, PinError>;

    fn open_analog(&mut self, gpio: i32) -> Result<Self::Analog, PinError>;
}

// ───────────────────────────────────────────────────────────────
// Indicator port (driven adapter: domain → onboard LED)
// ───────────────────────────────────────────────────────────────

/// Onboard presence indicator.
pub trait IndicatorPort {
    fn set(&mut self, on: bool);
}

// ───────────────────────────────────────────────────────────────
// Link port (driven adapter: domain ↔ BLE GATT server)
// ───────────────────────────────────────────────────────────────

/// The wireless stack, seen from the core.
///
/// One service (UUID `0x1234`) with one read/write/notify
/// characteristic (UUID `0x5678`).  Events flow the other way through
/// [`LinkEvent`](crate::events::LinkEvent); inbound writes arrive with
/// their bytes already copied out of the stack.
pub trait LinkPort {
    /// Register the service and return the characteristic value handle.
    fn register_service(&mut self) -> Result<AttrHandle, LinkError>;

    /// Set the stored characteristic value (what a plain read returns).
    fn write_value(&mut self, attr: AttrHandle, data: &[u8]) -> Result<(), LinkError>;

    /// Push `data` to `conn` as a notification.
    ///
    /// Fails with `MtuExceeded` if `data` does not fit one PDU at the
    /// peer's current MTU.
    fn notify(&mut self, conn: ConnHandle, attr: AttrHandle, data: &[u8]) -> Result<(), LinkError>;
}

// ───────────────────────────────────────────────────────────────
// Notification sink (domain → encoder → LinkPort)
// ───────────────────────────────────────────────────────────────

/// Where domain components hand outbound messages.
///
/// Delivery is best effort: implementations log and drop failures,
/// so callers never branch on the outcome.
pub trait NotifySink {
    fn notify(&mut self, conn: ConnHandle, msg: &Outbound);
}
