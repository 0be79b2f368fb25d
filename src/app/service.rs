//! Peripheral service — the hexagonal core.
//!
//! [`PeripheralService`] owns the pin registry, the connection state
//! machine, the notification scheduler and the command processor.  It
//! is the one context value the consumer loop threads through every
//! handler; nothing here is a process-wide global.  All I/O flows
//! through port traits injected at call sites, so the whole service
//! runs against mock adapters on the host.
//!
//! ```text
//!  LinkEvent ──▶ ┌──────────────────────────────┐ ──▶ LinkPort.notify
//!  EdgeLatch ──▶ │      PeripheralService       │
//!  poll/tick ──▶ │ Registry · Link · Sched · Cmd│ ──▶ IndicatorPort
//!                └──────────────────────────────┘
//! ```

use log::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{Error, LinkError, NotifyError, PinError};
use crate::events::{EdgeLatch, LinkEvent};
use crate::scheduler::NotificationScheduler;

use super::commands::{Applied, CommandProcessor};
use super::connection::ConnectionStateMachine;
use super::ports::{
    AttrHandle, ConnHandle, IndicatorPort, InputMode, LinkPort, NotifySink, OutputMode,
    PinBackend, Pull,
};
use super::protocol::{self, InitialValue, Outbound, Status};
use super::registry::{PinRegistry, StateSnapshot};

// ───────────────────────────────────────────────────────────────
// Link statistics
// ───────────────────────────────────────────────────────────────

/// Counters since boot, logged from the housekeeping tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub notifications_sent: u32,
    pub notify_failures: u32,
    pub decode_errors: u32,
    pub commands_applied: u32,
    pub input_changes: u32,
}

// ───────────────────────────────────────────────────────────────
// Notifier: Outbound → JSON → LinkPort
// ───────────────────────────────────────────────────────────────

/// Encodes and hands messages to the link; failures are counted,
/// logged and dropped.
struct LinkNotifier<'a, L: LinkPort> {
    link: &'a mut L,
    attr: Option<AttrHandle>,
    stats: &'a mut LinkStats,
}

impl<L: LinkPort> LinkNotifier<'_, L> {
    fn send(&mut self, conn: ConnHandle, msg: &Outbound) -> Result<(), NotifyError> {
        let attr = self.attr.ok_or(LinkError::NotRegistered)?;
        let bytes = protocol::encode(msg)?;
        self.link.notify(conn, attr, &bytes)?;
        Ok(())
    }
}

impl<L: LinkPort> NotifySink for LinkNotifier<'_, L> {
    fn notify(&mut self, conn: ConnHandle, msg: &Outbound) {
        match self.send(conn, msg) {
            Ok(()) => self.stats.notifications_sent += 1,
            Err(e) => {
                self.stats.notify_failures += 1;
                warn!("BLE: notify to {} dropped: {}", conn, e);
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// PeripheralService
// ───────────────────────────────────────────────────────────────

pub struct PeripheralService<B: PinBackend> {
    registry: PinRegistry<B>,
    connection: ConnectionStateMachine,
    scheduler: NotificationScheduler,
    processor: CommandProcessor,
    value_handle: Option<AttrHandle>,
    stats: LinkStats,
}

impl<B: PinBackend> PeripheralService<B> {
    /// `boot_ms` starts the heartbeat timer.
    pub fn new(backend: B, config: &DeviceConfig, boot_ms: u64) -> Self {
        Self {
            registry: PinRegistry::new(backend),
            connection: ConnectionStateMachine::new(u64::from(config.connect_grace_ms)),
            scheduler: NotificationScheduler::new(config.heartbeat_interval_ms(), boot_ms),
            processor: CommandProcessor::new(config.error_replies),
            value_handle: None,
            stats: LinkStats::default(),
        }
    }

    // ── Registration (before attach) ──────────────────────────

    pub fn register_digital_output(
        &mut self,
        name: &str,
        gpio: i32,
        mode: OutputMode,
    ) -> Result<(), PinError> {
        self.registry.register_digital_output(name, gpio, mode)
    }

    pub fn register_digital_input(
        &mut self,
        name: &str,
        gpio: i32,
        mode: InputMode,
        pull: Option<Pull>,
    ) -> Result<(), PinError> {
        self.registry.register_digital_input(name, gpio, mode, pull)
    }

    pub fn register_analog_input(&mut self, name: &str, gpio: i32) -> Result<(), PinError> {
        self.registry.register_analog_input(name, gpio)
    }

    /// Register the GATT service and store the `ready` value.
    pub fn attach(&mut self, link: &mut impl LinkPort) -> Result<AttrHandle, Error> {
        let attr = link.register_service()?;
        self.value_handle = Some(attr);

        let snapshot = self.registry.snapshot();
        let initial = protocol::encode(&InitialValue {
            status: Status::Ready,
            data: &snapshot,
        })?;
        link.write_value(attr, &initial)?;
        info!("BLE: service attached, value handle {}, {} byte initial value", attr, initial.len());
        Ok(attr)
    }

    // ── Consumer-loop entry points ────────────────────────────

    /// Apply one transport event.  `now_ms` starts the greeting grace
    /// period on connect.
    pub fn handle_event(
        &mut self,
        event: LinkEvent,
        now_ms: u64,
        link: &mut impl LinkPort,
        indicator: &mut impl IndicatorPort,
    ) {
        let mut sink = LinkNotifier {
            link,
            attr: self.value_handle,
            stats: &mut self.stats,
        };

        match event {
            LinkEvent::Connected(handle) => self.connection.on_connect(handle, now_ms, indicator),
            LinkEvent::Disconnected => self.connection.on_disconnect(indicator),
            LinkEvent::MtuChanged { conn, mtu } => {
                self.connection
                    .on_mtu(conn, mtu, &mut self.registry, &mut sink);
            }
            LinkEvent::DataWritten { conn, attr, value } => {
                if Some(attr) != self.value_handle {
                    debug!("BLE: write to foreign handle {} ignored", attr);
                    return;
                }
                if value.is_empty() {
                    debug!("BLE: empty write ignored");
                    return;
                }

                let outcome = self.connection.on_inbound_data(
                    conn,
                    &value,
                    &self.processor,
                    &mut self.registry,
                    indicator,
                    &mut sink,
                );
                match outcome.map(|o| o.result) {
                    Some(Ok(Applied::Set)) => sink.stats.commands_applied += 1,
                    Some(Err(Error::Decode(_))) => sink.stats.decode_errors += 1,
                    _ => {}
                }
            }
        }
    }

    /// Send a connect greeting whose MTU grace period has run out.
    /// Returns `true` if it was sent.
    pub fn flush_greeting(&mut self, now_ms: u64, link: &mut impl LinkPort) -> bool {
        let mut sink = LinkNotifier {
            link,
            attr: self.value_handle,
            stats: &mut self.stats,
        };
        self.connection
            .poll_greeting(now_ms, &mut self.registry, &mut sink)
    }

    /// Drain the edge latch and run the deferred input-change task.
    /// Returns `true` if a snapshot was sent.
    pub fn service_input_edges(&mut self, latch: &EdgeLatch, link: &mut impl LinkPort) -> bool {
        if self.scheduler.collect_edges(latch) {
            self.stats.input_changes += 1;
        }
        // Held back until the greeting is out; it carries a fresh snapshot.
        let conn = self.connection.notify_target();
        let mut sink = LinkNotifier {
            link,
            attr: self.value_handle,
            stats: &mut self.stats,
        };
        self.scheduler.run_deferred(conn, &mut self.registry, &mut sink)
    }

    /// Housekeeping tick: heartbeat check.  Returns `true` if a
    /// heartbeat was sent.
    pub fn tick(&mut self, now_ms: u64, link: &mut impl LinkPort) -> bool {
        let conn = self.connection.notify_target();
        let mut sink = LinkNotifier {
            link,
            attr: self.value_handle,
            stats: &mut self.stats,
        };
        self.scheduler
            .poll_heartbeat(now_ms, conn, &mut self.registry, &mut sink)
    }

    // ── Queries ───────────────────────────────────────────────

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn connection_handle(&self) -> Option<ConnHandle> {
        self.connection.handle()
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Fresh snapshot, outside of any notification.
    pub fn snapshot(&mut self) -> StateSnapshot {
        self.registry.snapshot()
    }
}
