//! Notification scheduler.
//!
//! Decides when to push a `{"data":..}` snapshot without a client
//! asking for one.  Two independent triggers:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Trigger Sources                          │
//! │                                                              │
//! │  ┌──────────────────┐              ┌──────────────────────┐  │
//! │  │ Housekeeping tick│              │ GPIO edge ISR        │  │
//! │  │ (~1 s)           │              │ (EdgeLatch bit)      │  │
//! │  └────────┬─────────┘              └──────────┬───────────┘  │
//! │           │                                   │              │
//! │           ▼                                   ▼              │
//! │   poll_heartbeat()                 collect_edges()           │
//! │   ≥ interval since last            any bits → one pending    │
//! │   heartbeat?                       task (collapse)           │
//! │           │                                   │              │
//! │           │                                   ▼              │
//! │           │                          run_deferred()          │
//! │           ▼                                   ▼              │
//! │        snapshot() ──▶ NotifySink (current handle, if any)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The heartbeat timer starts at boot and is reset by heartbeats only;
//! connect and command replies do not push it back.  While
//! disconnected both triggers are no-ops.

use log::debug;

use crate::app::ports::{ConnHandle, NotifySink, PinBackend};
use crate::app::protocol::Outbound;
use crate::app::registry::PinRegistry;
use crate::events::EdgeLatch;

pub struct NotificationScheduler {
    interval_ms: u64,
    /// Uptime of the last heartbeat (boot time until the first one).
    last_heartbeat_ms: u64,
    /// At most one deferred input-change task.
    input_change_pending: bool,
}

impl NotificationScheduler {
    pub fn new(interval_ms: u64, boot_ms: u64) -> Self {
        Self {
            interval_ms,
            last_heartbeat_ms: boot_ms,
            input_change_pending: false,
        }
    }

    // ── Heartbeat ─────────────────────────────────────────────

    /// Send a heartbeat snapshot if connected and the interval has
    /// elapsed.  Returns `true` when one was sent.
    ///
    /// The timer is reset even if the transport drops the notification.
    pub fn poll_heartbeat<B: PinBackend>(
        &mut self,
        now_ms: u64,
        conn: Option<ConnHandle>,
        registry: &mut PinRegistry<B>,
        sink: &mut impl NotifySink,
    ) -> bool {
        let Some(handle) = conn else {
            return false;
        };
        if now_ms.saturating_sub(self.last_heartbeat_ms) < self.interval_ms {
            return false;
        }
        self.last_heartbeat_ms = now_ms;
        debug!("SCHED: heartbeat at {} ms", now_ms);
        sink.notify(handle, &Outbound::Data(registry.snapshot()));
        true
    }

    // ── Input change (deferred) ───────────────────────────────

    /// Fold any latched edges into the single pending task.  Returns
    /// `true` if edges were found.
    pub fn collect_edges(&mut self, latch: &EdgeLatch) -> bool {
        let sources = latch.take();
        if sources == 0 {
            return false;
        }
        debug!("SCHED: input edges 0b{:b}", sources);
        self.input_change_pending = true;
        true
    }

    pub fn is_input_change_pending(&self) -> bool {
        self.input_change_pending
    }

    /// Run the pending input-change task, if any.  The task is consumed
    /// whether or not a client is connected.  Returns `true` when a
    /// snapshot was sent.
    pub fn run_deferred<B: PinBackend>(
        &mut self,
        conn: Option<ConnHandle>,
        registry: &mut PinRegistry<B>,
        sink: &mut impl NotifySink,
    ) -> bool {
        if !core::mem::take(&mut self.input_change_pending) {
            return false;
        }
        let Some(handle) = conn else {
            debug!("SCHED: input change while disconnected, dropped");
            return false;
        };
        sink.notify(handle, &Outbound::Data(registry.snapshot()));
        true
    }
}
