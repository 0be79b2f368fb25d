//! PinLink Firmware — Main Entry Point
//!
//! One consumer loop owns every piece of mutable state.  Interrupts and
//! the BLE host task only post into lock-free queues.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  EspPins (PinBackend)   BleLink (LinkPort)   StatusLed         │
//! │  GPIO ISRs ─▶ INPUT_EDGES       Bluedroid ─▶ LINK_EVENTS       │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            PeripheralService (pure logic)              │    │
//! │  │  Registry · Connection · Scheduler · Commands          │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Housekeeping tick: heartbeat · watchdog · stats               │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use anyhow::{Context, Result};
use esp_idf_svc::hal::delay::FreeRtos;
use log::{info, warn};

use pinlink::adapters::ble::BleLink;
use pinlink::adapters::device_id;
use pinlink::adapters::hardware::EspPins;
use pinlink::adapters::time::Uptime;
use pinlink::app::ports::{InputMode, OutputMode, Pull};
use pinlink::app::service::PeripheralService;
use pinlink::config::DeviceConfig;
use pinlink::drivers::status_led::StatusLed;
use pinlink::drivers::watchdog::Watchdog;
use pinlink::error::Error;
use pinlink::events::{drain_link_events, INPUT_EDGES};
use pinlink::pins;

/// Ticks between statistics log lines.
const STATS_EVERY_TICKS: u32 = 60;

/// Build-time override, e.g. `PINLINK_CONFIG='{"device_name":"Pico-W"}'`.
fn load_config() -> DeviceConfig {
    match option_env!("PINLINK_CONFIG") {
        Some(raw) => match DeviceConfig::from_json(raw.as_bytes()) {
            Ok(cfg) => {
                info!("Config: build-time override applied");
                cfg
            }
            Err(e) => {
                warn!("Config: override rejected ({}), using defaults", e);
                DeviceConfig::default()
            }
        },
        None => DeviceConfig::default(),
    }
}

// ── Main ──────────────────────────────────────────────────────

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("╔══════════════════════════════════════╗");
    info!("║  PinLink v{}                         ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    let config = load_config();
    let uptime = Uptime::new();
    let mut watchdog = Watchdog::new(config.watchdog_timeout_ms);
    let mut indicator = StatusLed::new();

    // ── 2. Pin registry ───────────────────────────────────────
    let mut service = PeripheralService::new(EspPins::new(), &config, uptime.now_ms());

    service
        .register_digital_output("LED1", pins::LED1_GPIO, OutputMode::PushPull)
        .map_err(Error::from)
        .context("LED1")?;
    service
        .register_digital_output("LED2", pins::LED2_GPIO, OutputMode::PushPull)
        .map_err(Error::from)
        .context("LED2")?;
    service
        .register_digital_input("Button", pins::BUTTON_GPIO, InputMode::Interrupt, Some(Pull::Up))
        .map_err(Error::from)
        .context("Button")?;
    service
        .register_analog_input("ADC", pins::ADC_GPIO)
        .map_err(Error::from)
        .context("ADC")?;

    // ── 3. BLE link ───────────────────────────────────────────
    let name = device_id::advertised_name(&config.device_name);
    let mut link = BleLink::new(&name);
    link.start().map_err(Error::from).context("BLE bring-up")?;
    service.attach(&mut link).context("GATT service")?;

    info!("System ready as '{}'. Entering event loop.", name);

    // ── 4. Consumer loop ──────────────────────────────────────
    let tick_ms = u64::from(config.tick_interval_ms);
    let mut last_tick_ms = uptime.now_ms();
    let mut ticks: u32 = 0;

    loop {
        FreeRtos::delay_ms(config.poll_interval_ms);

        let now_ms = uptime.now_ms();
        drain_link_events(|event| service.handle_event(event, now_ms, &mut link, &mut indicator));
        service.flush_greeting(now_ms, &mut link);
        service.service_input_edges(&INPUT_EDGES, &mut link);

        if now_ms.saturating_sub(last_tick_ms) < tick_ms {
            continue;
        }
        last_tick_ms = now_ms;

        service.tick(now_ms, &mut link);
        watchdog.feed();

        ticks = ticks.wrapping_add(1);
        if ticks % STATS_EVERY_TICKS == 0 {
            let s = service.stats();
            // SAFETY: read-only heap statistics query.
            let free_heap = unsafe { esp_idf_svc::sys::esp_get_free_heap_size() };
            info!(
                "stats: connected={} sent={} failed={} decode_err={} applied={} edges={} heap={}",
                service.is_connected(),
                s.notifications_sent,
                s.notify_failures,
                s.decode_errors,
                s.commands_applied,
                s.input_changes,
                free_heap,
            );
        }
    }
}
