//! Connection state machine — one client at a time.
//!
//! ```text
//!              on_connect(h)               on_connect(h')
//!  Disconnected ───────────▶ Connected(h) ──────────────▶ Connected(h')
//!        ▲                        │
//!        └──── on_disconnect ─────┘
//! ```
//!
//! A second connect overwrites the handle without a disconnect in
//! between.  Notify failures never cause a transition; only the
//! transport's disconnect event does.
//!
//! The greeting (`connected`, then a snapshot) is held back until the
//! peer's MTU is known: a fresh link runs at the 23-byte default MTU,
//! which fits neither message.  It goes out on the MTU exchange, on the
//! first write from the client, or once the grace period expires,
//! whichever comes first.  Until then no other notification is sent,
//! so the greeting is always the first thing a client sees.

use log::{debug, info};

use super::commands::{CommandProcessor, Outcome};
use super::ports::{ConnHandle, IndicatorPort, NotifySink, PinBackend};
use super::protocol::{Outbound, Status};
use super::registry::PinRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Disconnected,
    Connected(ConnHandle),
}

#[derive(Debug)]
pub struct ConnectionStateMachine {
    state: LinkState,
    grace_ms: u64,
    /// Uptime at which a held greeting goes out regardless.
    greeting_due_ms: Option<u64>,
}

impl ConnectionStateMachine {
    pub fn new(grace_ms: u64) -> Self {
        Self {
            state: LinkState::Disconnected,
            grace_ms,
            greeting_due_ms: None,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Current handle, if a client is connected.
    pub fn handle(&self) -> Option<ConnHandle> {
        match self.state {
            LinkState::Connected(h) => Some(h),
            LinkState::Disconnected => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.handle().is_some()
    }

    pub fn is_greeting_pending(&self) -> bool {
        self.greeting_due_ms.is_some()
    }

    /// Where heartbeats and input changes go: the connected handle,
    /// once its greeting is out.
    pub fn notify_target(&self) -> Option<ConnHandle> {
        if self.is_greeting_pending() {
            None
        } else {
            self.handle()
        }
    }

    /// Light the indicator and hold the greeting until the MTU is known.
    pub fn on_connect(
        &mut self,
        handle: ConnHandle,
        now_ms: u64,
        indicator: &mut impl IndicatorPort,
    ) {
        if let LinkState::Connected(prev) = self.state {
            info!("LINK: handle {} replaces {}", handle, prev);
        } else {
            info!("LINK: connected (handle {})", handle);
        }
        self.state = LinkState::Connected(handle);
        self.greeting_due_ms = Some(now_ms.saturating_add(self.grace_ms));
        indicator.set(true);
    }

    /// The peer's MTU is known: send a held greeting now.  Returns
    /// `true` if one was sent.
    pub fn on_mtu<B: PinBackend>(
        &mut self,
        handle: ConnHandle,
        mtu: u16,
        registry: &mut PinRegistry<B>,
        sink: &mut impl NotifySink,
    ) -> bool {
        if self.handle() != Some(handle) {
            debug!("LINK: MTU {} for stale handle {} ignored", mtu, handle);
            return false;
        }
        debug!("LINK: MTU {} on handle {}", mtu, handle);
        self.send_greeting(registry, sink)
    }

    /// Send a held greeting whose grace period has run out.
    pub fn poll_greeting<B: PinBackend>(
        &mut self,
        now_ms: u64,
        registry: &mut PinRegistry<B>,
        sink: &mut impl NotifySink,
    ) -> bool {
        match self.greeting_due_ms {
            Some(due) if now_ms >= due => {
                debug!("LINK: no MTU exchange, greeting at default MTU");
                self.send_greeting(registry, sink)
            }
            _ => false,
        }
    }

    fn send_greeting<B: PinBackend>(
        &mut self,
        registry: &mut PinRegistry<B>,
        sink: &mut impl NotifySink,
    ) -> bool {
        let Some(handle) = self.handle() else {
            return false;
        };
        if self.greeting_due_ms.take().is_none() {
            return false;
        }
        sink.notify(handle, &Outbound::Status(Status::Connected));
        sink.notify(handle, &Outbound::Data(registry.snapshot()));
        true
    }

    pub fn on_disconnect(&mut self, indicator: &mut impl IndicatorPort) {
        if self.state == LinkState::Disconnected {
            debug!("LINK: disconnect while already disconnected");
        } else {
            info!("LINK: disconnected");
        }
        self.state = LinkState::Disconnected;
        self.greeting_due_ms = None;
        indicator.set(false);
    }

    /// Forward a write to the processor and send its replies to
    /// `handle`.  Returns `None` (nothing processed) unless connected.
    pub fn on_inbound_data<B: PinBackend>(
        &mut self,
        handle: ConnHandle,
        raw: &[u8],
        processor: &CommandProcessor,
        registry: &mut PinRegistry<B>,
        indicator: &mut impl IndicatorPort,
        sink: &mut impl NotifySink,
    ) -> Option<Outcome> {
        if !self.is_connected() {
            debug!("LINK: dropping {} byte write while disconnected", raw.len());
            return None;
        }
        // A client that writes has finished its setup.
        self.send_greeting(registry, sink);

        let outcome = processor.process(raw, registry, indicator);
        for reply in &outcome.replies {
            sink.notify(handle, reply);
        }
        Some(outcome)
    }
}
