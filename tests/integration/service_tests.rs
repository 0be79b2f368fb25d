//! End-to-end behaviour of `PeripheralService` against mock adapters.
//!
//! Each test drives the service the way the consumer loop does: link
//! events in, edge latch drained, housekeeping ticks with an explicit
//! clock.  Notifications are inspected as parsed JSON.

use serde_json::json;

use pinlink::app::ports::{AttrHandle, ConnHandle, OutputMode};
use pinlink::app::service::PeripheralService;
use pinlink::config::DeviceConfig;
use pinlink::error::PinError;
use pinlink::events::{EdgeLatch, LinkEvent};

use crate::mock_hw::*;

const NEGOTIATED_MTU: u16 = 247;

fn event(r: &mut Rig, event: LinkEvent, now_ms: u64) {
    r.service.handle_event(event, now_ms, &mut r.link, &mut r.led);
}

/// Connect at t=0 and finish the MTU exchange, so the greeting is out.
fn connect(r: &mut Rig, conn: ConnHandle) {
    r.link.mtu = DEFAULT_MTU;
    event(r, LinkEvent::Connected(conn), 0);
    r.link.mtu = NEGOTIATED_MTU;
    event(r, LinkEvent::MtuChanged { conn, mtu: NEGOTIATED_MTU }, 0);
}

fn disconnect(r: &mut Rig) {
    event(r, LinkEvent::Disconnected, 0);
}

fn write_to(r: &mut Rig, conn: ConnHandle, attr: AttrHandle, payload: &[u8]) {
    let written = r.link.client_write(conn, attr, payload);
    event(r, written, 0);
}

fn write(r: &mut Rig, conn: ConnHandle, payload: &[u8]) {
    write_to(r, conn, VALUE_HANDLE, payload);
}

// ── Attach ────────────────────────────────────────────────────

#[test]
fn attach_stores_ready_value_with_snapshot() {
    let mut r = rig();
    r.board.set_adc(ADC, 1234);

    // Re-attach so the stored value sees the ADC sample.
    r.service.attach(&mut r.link).unwrap();
    let value = r.link.stored_value();

    assert_eq!(value["status"], "ready");
    assert_eq!(value["data"]["d"]["do"]["LED1"], json!({"v": 0, "g": LED1}));
    assert_eq!(value["data"]["d"]["di"]["Button"], json!({"v": 1, "g": BUTTON}));
    assert_eq!(value["data"]["d"]["ai"]["ADC"], json!({"v": 1234, "g": ADC}));
    assert!(r.link.sent.is_empty());
}

#[test]
fn largest_accepted_layout_still_attaches() {
    let config = DeviceConfig::default();
    let mut service = PeripheralService::new(MockBoard::default(), &config, 0);
    let mut refused = None;
    for i in 0..16 {
        let name = format!("output_pin_{i:04}");
        if let Err(e) = service.register_digital_output(&name, 10 + i, OutputMode::PushPull) {
            refused = Some(e);
            break;
        }
    }
    assert!(matches!(refused, Some(PinError::SnapshotTooLarge(_))));

    let mut link = RecordingLink::new();
    service.attach(&mut link).unwrap();
    assert_eq!(link.stored_value()["status"], "ready");

    let mut led = MockIndicator::default();
    link.mtu = 517;
    service.handle_event(LinkEvent::Connected(1), 0, &mut link, &mut led);
    service.handle_event(LinkEvent::MtuChanged { conn: 1, mtu: 517 }, 0, &mut link, &mut led);
    assert_eq!(link.take_sent().len(), 2);
    assert_eq!(service.stats().notify_failures, 0);
}

#[test]
fn interrupt_inputs_get_their_own_edge_source() {
    let r = rig();
    assert_eq!(*r.board.edge_sources.borrow(), vec![(BUTTON, Some(0))]);
}

// ── Connection lifecycle ──────────────────────────────────────

#[test]
fn connect_sends_status_then_snapshot() {
    let mut r = rig();
    connect(&mut r, 3);

    assert!(r.service.is_connected());
    assert_eq!(r.service.connection_handle(), Some(3));
    assert!(r.led.is_on());

    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], (3, json!({"status": "connected"})));
    assert_eq!(sent[1].0, 3);
    assert_eq!(pin_value(&sent[1].1, "di", "Button"), Some(1));
}

#[test]
fn greeting_is_held_until_mtu_exchange() {
    let mut r = rig();
    event(&mut r, LinkEvent::Connected(3), 1000);
    assert!(r.led.is_on());
    assert!(!r.service.flush_greeting(1200, &mut r.link));
    assert!(r.link.sent.is_empty());

    r.link.mtu = NEGOTIATED_MTU;
    event(&mut r, LinkEvent::MtuChanged { conn: 3, mtu: NEGOTIATED_MTU }, 1300);
    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], (3, json!({"status": "connected"})));
    assert_eq!(pin_value(&sent[1].1, "do", "LED1"), Some(0));
    assert_eq!(r.service.stats().notify_failures, 0);

    // Once only.
    assert!(!r.service.flush_greeting(10_000, &mut r.link));
    assert!(r.link.sent.is_empty());
}

#[test]
fn greeting_goes_out_when_grace_expires() {
    let config = DeviceConfig::default();
    let grace = u64::from(config.connect_grace_ms);
    let mut r = rig_with(config);
    r.link.mtu = NEGOTIATED_MTU;
    event(&mut r, LinkEvent::Connected(2), 1000);

    assert!(!r.service.flush_greeting(1000 + grace - 1, &mut r.link));
    assert!(r.service.flush_greeting(1000 + grace, &mut r.link));
    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], (2, json!({"status": "connected"})));
}

#[test]
fn greeting_at_default_mtu_fails_but_keeps_the_link() {
    let mut r = rig();
    event(&mut r, LinkEvent::Connected(2), 0);
    assert!(r.service.flush_greeting(60_000, &mut r.link));

    assert!(r.link.sent.is_empty());
    assert_eq!(r.service.stats().notify_failures, 2);
    assert!(r.service.is_connected());
}

#[test]
fn first_write_flushes_the_greeting() {
    let mut r = rig();
    r.link.mtu = NEGOTIATED_MTU;
    event(&mut r, LinkEvent::Connected(1), 0);

    write(&mut r, 1, br#"{"c":"r"}"#);
    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].1, json!({"status": "connected"}));
    assert!(sent[1].1.get("data").is_some());
    assert!(sent[2].1.get("data").is_some());

    event(&mut r, LinkEvent::MtuChanged { conn: 1, mtu: NEGOTIATED_MTU }, 10);
    assert!(r.link.sent.is_empty());
}

#[test]
fn nothing_is_sent_ahead_of_the_greeting() {
    let mut r = rig();
    let latch = EdgeLatch::new();
    r.link.mtu = NEGOTIATED_MTU;
    event(&mut r, LinkEvent::Connected(1), 0);

    latch.raise(0);
    assert!(!r.service.service_input_edges(&latch, &mut r.link));
    assert!(!r.service.tick(5000, &mut r.link));
    assert_eq!(r.link.notify_attempts, 0);

    event(&mut r, LinkEvent::MtuChanged { conn: 1, mtu: NEGOTIATED_MTU }, 5100);
    assert_eq!(r.link.take_sent()[0].1, json!({"status": "connected"}));
    assert!(r.service.tick(10_000, &mut r.link));
}

#[test]
fn disconnect_clears_handle_and_indicator() {
    let mut r = rig();
    connect(&mut r, 3);
    disconnect(&mut r);

    assert!(!r.service.is_connected());
    assert_eq!(r.service.connection_handle(), None);
    assert_eq!(r.led.history, vec![true, false]);
}

#[test]
fn reconnect_overwrites_handle() {
    let mut r = rig();
    connect(&mut r, 3);
    connect(&mut r, 8);
    r.link.take_sent();

    write(&mut r, 8, br#"{"c":"r"}"#);
    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 8);
    assert_eq!(r.service.connection_handle(), Some(8));
}

// ── Commands ──────────────────────────────────────────────────

#[test]
fn set_then_read_round_trip() {
    let mut r = rig();
    connect(&mut r, 1);
    r.link.take_sent();

    write(&mut r, 1, br#"{"c":"s","t":"do","p":"LED1","v":1}"#);
    assert!(r.board.level(LED1));
    assert!(!r.board.level(LED2));

    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].1, json!({"status": "ok"}));
    assert_eq!(pin_value(&sent[1].1, "do", "LED1"), Some(1));
    assert_eq!(pin_value(&sent[1].1, "do", "LED2"), Some(0));

    write(&mut r, 1, br#"{"c":"r"}"#);
    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(pin_value(&sent[0].1, "do", "LED1"), Some(1));
    assert_eq!(r.service.stats().commands_applied, 1);
}

#[test]
fn queued_writes_each_keep_their_bytes() {
    let mut r = rig();
    connect(&mut r, 1);
    r.link.take_sent();

    // Both writes land before the loop drains either.
    let first = r.link.client_write(1, VALUE_HANDLE, br#"{"c":"s","t":"do","p":"LED1","v":1}"#);
    let second = r.link.client_write(1, VALUE_HANDLE, br#"{"c":"s","t":"do","p":"LED2","v":1}"#);
    event(&mut r, first, 0);
    event(&mut r, second, 0);

    assert!(r.board.level(LED1));
    assert!(r.board.level(LED2));
    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 4);
    assert_eq!(pin_value(&sent[1].1, "do", "LED2"), Some(0));
    assert_eq!(pin_value(&sent[3].1, "do", "LED2"), Some(1));
    assert_eq!(r.service.stats().commands_applied, 2);
}

#[test]
fn queued_read_sees_the_set_before_it() {
    let mut r = rig();
    connect(&mut r, 1);
    r.link.take_sent();

    let set = r.link.client_write(1, VALUE_HANDLE, br#"{"c":"s","t":"do","p":"LED1","v":1}"#);
    let read = r.link.client_write(1, VALUE_HANDLE, br#"{"c":"r"}"#);
    event(&mut r, set, 0);
    event(&mut r, read, 0);

    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].1, json!({"status": "ok"}));
    assert_eq!(pin_value(&sent[2].1, "do", "LED1"), Some(1));
}

#[test]
fn long_field_names_are_accepted() {
    let mut r = rig();
    connect(&mut r, 1);
    r.link.take_sent();

    write(
        &mut r,
        1,
        br#"{"cmd":"set","category":"digital_outputs","pin":"LED2","val":7}"#,
    );
    assert!(r.board.level(LED2));
    assert_eq!(r.link.take_sent()[0].1, json!({"status": "ok"}));
}

#[test]
fn set_mirrors_value_on_indicator() {
    let mut r = rig();
    connect(&mut r, 1);

    write(&mut r, 1, br#"{"c":"s","t":"do","p":"LED1","v":0}"#);
    assert!(!r.led.is_on());
    write(&mut r, 1, br#"{"c":"s","t":"do","p":"LED1","v":1}"#);
    assert!(r.led.is_on());
}

#[test]
fn unknown_or_read_only_pin_is_inert() {
    let mut r = rig();
    connect(&mut r, 1);
    r.link.take_sent();
    let before = r.service.snapshot();

    write(&mut r, 1, br#"{"c":"s","t":"do","p":"LED9","v":1}"#);
    write(&mut r, 1, br#"{"c":"s","t":"di","p":"Button","v":0}"#);
    write(&mut r, 1, br#"{"c":"s","t":"ai","p":"ADC","v":1}"#);

    assert!(r.link.sent.is_empty());
    assert_eq!(r.service.snapshot(), before);
    assert!(r.service.is_connected());
    assert_eq!(r.service.stats().commands_applied, 0);
}

#[test]
fn malformed_payload_is_inert() {
    let mut r = rig();
    connect(&mut r, 1);
    r.link.take_sent();

    write(&mut r, 1, b"{not json");
    write(&mut r, 1, br#"{"c":"zap"}"#);
    write(&mut r, 1, br#"{"c":"s","t":"do","p":"LED1"}"#);

    assert!(r.link.sent.is_empty());
    assert!(r.service.is_connected());
    assert!(!r.board.level(LED1));
    assert_eq!(r.service.stats().decode_errors, 3);
}

#[test]
fn error_replies_when_enabled() {
    let config = DeviceConfig {
        error_replies: true,
        ..DeviceConfig::default()
    };
    let mut r = rig_with(config);
    connect(&mut r, 1);
    r.link.take_sent();

    write(&mut r, 1, b"garbage");
    write(&mut r, 1, br#"{"c":"s","t":"do","p":"nope","v":1}"#);

    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(_, m)| *m == json!({"status": "error"})));
}

#[test]
fn write_while_disconnected_is_ignored() {
    let mut r = rig();
    write(&mut r, 1, br#"{"c":"s","t":"do","p":"LED1","v":1}"#);

    assert!(!r.board.level(LED1));
    assert!(r.link.sent.is_empty());
    assert!(r.led.history.is_empty());
}

#[test]
fn foreign_and_empty_writes_are_ignored() {
    let mut r = rig();
    connect(&mut r, 1);
    r.link.take_sent();

    write_to(&mut r, 1, VALUE_HANDLE + 1, br#"{"c":"r"}"#);
    write(&mut r, 1, b"");

    assert!(r.link.sent.is_empty());
    assert_eq!(r.service.stats().decode_errors, 0);
}

// ── Input changes ─────────────────────────────────────────────

#[test]
fn edge_burst_collapses_into_one_snapshot() {
    let mut r = rig();
    let latch = EdgeLatch::new();
    connect(&mut r, 1);
    r.link.take_sent();

    for i in 0..20 {
        r.board.set_input(BUTTON, i % 2 == 0);
        latch.raise(0);
    }
    assert!(r.service.service_input_edges(&latch, &mut r.link));
    assert!(!r.service.service_input_edges(&latch, &mut r.link));

    let sent = r.link.take_sent();
    assert_eq!(sent.len(), 1);
    // The snapshot is taken when the task runs, after the burst settles.
    assert_eq!(pin_value(&sent[0].1, "di", "Button"), Some(0));
    assert_eq!(r.service.stats().input_changes, 1);
}

#[test]
fn disconnected_suppresses_edges_and_heartbeat() {
    let mut r = rig();
    let latch = EdgeLatch::new();
    connect(&mut r, 1);
    disconnect(&mut r);
    r.link.take_sent();

    latch.raise(0);
    assert!(!r.service.service_input_edges(&latch, &mut r.link));
    for now in (0..=30_000).step_by(1000) {
        assert!(!r.service.tick(now, &mut r.link));
    }

    assert!(r.link.sent.is_empty());
    assert_eq!(r.link.notify_attempts, 2);
}

// ── Heartbeat ─────────────────────────────────────────────────

#[test]
fn heartbeat_cadence_carries_fresh_snapshots() {
    let mut r = rig();
    connect(&mut r, 1);
    r.link.take_sent();

    let mut fired = Vec::new();
    for now in (0..=15_000).step_by(1000) {
        r.board.set_adc(ADC, now as u16 / 100);
        if r.service.tick(now, &mut r.link) {
            fired.push(now);
        }
    }
    assert_eq!(fired, [5000, 10_000, 15_000]);

    let sent = r.link.take_sent();
    let samples: Vec<_> = sent
        .iter()
        .map(|(_, m)| pin_value(m, "ai", "ADC").unwrap())
        .collect();
    assert_eq!(samples, [50, 100, 150]);
}

#[test]
fn commands_do_not_push_heartbeat_back() {
    let mut r = rig();
    connect(&mut r, 1);

    assert!(!r.service.tick(4000, &mut r.link));
    write(&mut r, 1, br#"{"c":"r"}"#);
    r.link.take_sent();

    assert!(r.service.tick(5000, &mut r.link));
    assert_eq!(r.link.take_sent().len(), 1);
}

#[test]
fn notify_failure_keeps_connection() {
    let mut r = rig();
    r.link.fail_notify = true;
    connect(&mut r, 1);
    write(&mut r, 1, br#"{"c":"s","t":"do","p":"LED1","v":1}"#);
    assert!(r.service.tick(5000, &mut r.link));

    assert!(r.service.is_connected());
    assert!(r.board.level(LED1));
    let stats = r.service.stats();
    assert_eq!(stats.notify_failures, 5);
    assert_eq!(stats.notifications_sent, 0);

    // Recovery: next heartbeat goes through.
    r.link.fail_notify = false;
    assert!(r.service.tick(10_000, &mut r.link));
    assert_eq!(r.link.take_sent().len(), 1);
}

#[test]
fn failed_reads_keep_last_known_values() {
    let mut r = rig();
    r.board.set_adc(ADC, 900);
    connect(&mut r, 1);
    r.link.take_sent();

    r.board.fail_reads(true);
    r.board.set_adc(ADC, 5);
    r.board.set_input(BUTTON, false);
    write(&mut r, 1, br#"{"c":"r"}"#);

    let sent = r.link.take_sent();
    assert_eq!(pin_value(&sent[0].1, "ai", "ADC"), Some(900));
    assert_eq!(pin_value(&sent[0].1, "di", "Button"), Some(1));
}
