//! Interrupt-driven event plumbing.
//!
//! Two producers feed the single consumer (main loop):
//!
//! - **GPIO ISRs** raise a bit in an [`EdgeLatch`].  Raising is one
//!   atomic `fetch_or`: no allocation, no encoding, no I/O.  Any number
//!   of edges on a source before the consumer drains collapse into the
//!   one bit.
//! - **The BLE host task** posts [`LinkEvent`]s into a bounded channel.
//!
//! ```text
//! ┌─────────────┐  fetch_or   ┌──────────────┐
//! │ GPIO ISR    │───────────▶│  EdgeLatch   │──┐
//! └─────────────┘             └──────────────┘  │   ┌──────────────┐
//!                                               ├──▶│  Main Loop   │
//! ┌─────────────┐  try_send   ┌──────────────┐  │   │  (consumer)  │
//! │ BLE host    │───────────▶│ LINK_EVENTS  │──┘   └──────────────┘
//! └─────────────┘             └──────────────┘
//! ```

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::warn;

use crate::app::ports::{AttrHandle, ConnHandle};
use crate::app::protocol::MAX_PAYLOAD;

// ── Input edges (ISR → consumer) ──────────────────────────────

/// Number of distinct interrupt sources one latch can track.
pub const MAX_EDGE_SOURCES: u8 = 32;

/// Lock-free pending-edge set, one bit per input source.
pub struct EdgeLatch {
    pending: AtomicU32,
}

impl EdgeLatch {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
        }
    }

    /// Mark `source` as changed.  Safe to call from interrupt context.
    /// Out-of-range sources are ignored.
    pub fn raise(&self, source: u8) {
        if source < MAX_EDGE_SOURCES {
            self.pending.fetch_or(1 << source, Ordering::Release);
        }
    }

    /// Take and clear every pending source.  Consumer side only.
    pub fn take(&self) -> u32 {
        self.pending.swap(0, Ordering::AcqRel)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire) != 0
    }
}

impl Default for EdgeLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Latch the device GPIO ISRs write into.
pub static INPUT_EDGES: EdgeLatch = EdgeLatch::new();

// ── Link events (BLE host task → consumer) ────────────────────

/// Bytes of one characteristic write.
pub type WriteBuf = heapless::Vec<u8, MAX_PAYLOAD>;

/// Events the transport reports to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A central connected.
    Connected(ConnHandle),
    /// The central went away.
    Disconnected,
    /// The ATT MTU for `conn` was negotiated.
    MtuChanged { conn: ConnHandle, mtu: u16 },
    /// The central wrote the characteristic.  `value` is copied in the
    /// stack callback, so back-to-back writes each keep their bytes.
    DataWritten {
        conn: ConnHandle,
        attr: AttrHandle,
        value: WriteBuf,
    },
}

impl LinkEvent {
    fn name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "Connected",
            Self::Disconnected => "Disconnected",
            Self::MtuChanged { .. } => "MtuChanged",
            Self::DataWritten { .. } => "DataWritten",
        }
    }
}

const LINK_EVENT_DEPTH: usize = 8;

/// Link event channel: BLE host task → main loop.
pub static LINK_EVENTS: Channel<CriticalSectionRawMutex, LinkEvent, LINK_EVENT_DEPTH> =
    Channel::new();

/// Post a link event.  Returns `false` if the channel is full (dropped).
pub fn push_link_event(event: LinkEvent) -> bool {
    match LINK_EVENTS.try_send(event) {
        Ok(()) => true,
        Err(TrySendError::Full(event)) => {
            warn!("events: link channel full, dropping {}", event.name());
            false
        }
    }
}

/// Drain all pending link events into a callback, FIFO.
pub fn drain_link_events(mut handler: impl FnMut(LinkEvent)) {
    while let Ok(event) = LINK_EVENTS.try_receive() {
        handler(event);
    }
}
