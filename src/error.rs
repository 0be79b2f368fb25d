//! Unified error types for the PinLink firmware.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! consumer loop handles failures uniformly.  All variants are `Copy`
//! so they can be logged and passed around without allocation.
//!
//! None of these is fatal to the run loop: per-message failures are
//! logged and dropped where they occur.  Only bring-up errors propagate
//! out of `main`.

use core::fmt;

use embedded_hal::digital::ErrorKind;
use serde_json::error::Category;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Pin registration, sampling, or write failed.
    Pin(PinError),
    /// An inbound payload could not be decoded into a command.
    Decode(DecodeError),
    /// An outbound notification could not be delivered.
    Notify(NotifyError),
    /// The wireless stack rejected an operation.
    Link(LinkError),
    /// Configuration failed validation.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pin(e) => write!(f, "pin: {e}"),
            Self::Decode(e) => write!(f, "decode: {e}"),
            Self::Notify(e) => write!(f, "notify: {e}"),
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Pin errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    /// Category/name does not resolve to a writable digital output.
    UnknownPin,
    /// Pin names must be 1..=16 bytes.
    InvalidName,
    /// The category already holds the maximum number of pins.
    RegistryFull,
    /// GPIO has no ADC channel on this chip.
    NotAnalogCapable(i32),
    /// GPIO number is outside the chip's pin range.
    InvalidGpio(i32),
    /// ESP-IDF returned a non-OK status while configuring the pin.
    Hardware(i32),
    /// The pin driver reported a failure.
    Driver(ErrorKind),
    /// With this pin added, a worst-case snapshot would encode to this
    /// many bytes, more than one attribute can carry.
    SnapshotTooLarge(usize),
}

impl fmt::Display for PinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPin => write!(f, "unknown pin"),
            Self::InvalidName => write!(f, "pin name must be 1-16 bytes"),
            Self::RegistryFull => write!(f, "pin category full"),
            Self::NotAnalogCapable(gpio) => write!(f, "GPIO{gpio} has no ADC channel"),
            Self::InvalidGpio(gpio) => write!(f, "GPIO{gpio} out of range"),
            Self::Hardware(rc) => write!(f, "hardware config failed (rc={rc})"),
            Self::Driver(kind) => write!(f, "driver error: {kind}"),
            Self::SnapshotTooLarge(len) => write!(f, "snapshot would need {len} bytes"),
        }
    }
}

impl From<PinError> for Error {
    fn from(e: PinError) -> Self {
        Self::Pin(e)
    }
}

// ---------------------------------------------------------------------------
// Decode errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload is not valid JSON for the command schema.
    Json(Category),
    /// No `c`/`cmd` field.
    MissingAction,
    /// `c`/`cmd` holds a value that is neither set nor read.
    UnknownAction,
    /// A set command lacks the named field.
    MissingField(&'static str),
    /// `t`/`category` is not one of the three categories.
    UnknownCategory,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(cat) => write!(f, "malformed JSON ({cat:?})"),
            Self::MissingAction => write!(f, "missing action field"),
            Self::UnknownAction => write!(f, "unknown action"),
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::UnknownCategory => write!(f, "unknown pin category"),
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.classify())
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}

// ---------------------------------------------------------------------------
// Notify errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyError {
    /// Serialisation of the outbound message failed.
    Encode,
    /// Encoded message exceeds the attribute size ceiling.
    PayloadTooLarge(usize),
    /// The transport refused the notification.
    Link(LinkError),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "encode failed"),
            Self::PayloadTooLarge(len) => write!(f, "payload too large ({len} bytes)"),
            Self::Link(e) => write!(f, "{e}"),
        }
    }
}

impl From<LinkError> for NotifyError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<NotifyError> for Error {
    fn from(e: NotifyError) -> Self {
        Self::Notify(e)
    }
}

// ---------------------------------------------------------------------------
// Link (transport) errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// Controller / Bluedroid bring-up failed.
    StackInit(i32),
    /// Service registration did not complete in time.
    RegistrationTimeout,
    /// Operation needs the characteristic but registration has not run.
    NotRegistered,
    /// Payload does not fit the negotiated MTU.
    MtuExceeded { len: usize, mtu: u16 },
    /// The stack returned a non-OK status (e.g. notify buffer full).
    Rejected(i32),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StackInit(rc) => write!(f, "BLE stack init failed (rc={rc})"),
            Self::RegistrationTimeout => write!(f, "GATT service registration timed out"),
            Self::NotRegistered => write!(f, "GATT service not registered"),
            Self::MtuExceeded { len, mtu } => {
                write!(f, "{len} bytes exceed MTU {mtu}")
            }
            Self::Rejected(rc) => write!(f, "stack rejected request (rc={rc})"),
        }
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
