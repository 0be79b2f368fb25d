//! Fuzz target: `PeripheralService::handle_event`
//!
//! Feeds arbitrary characteristic writes through a connected service
//! backed by the simulated pins and BLE link.  The service must never
//! panic, must stay connected, and must only ever notify the connected
//! handle with JSON no larger than the attribute.
//!
//! cargo fuzz run fuzz_service_writes

#![no_main]

use libfuzzer_sys::fuzz_target;
use pinlink::adapters::ble::BleLink;
use pinlink::adapters::hardware::SimPins;
use pinlink::app::ports::{IndicatorPort, OutputMode};
use pinlink::app::protocol::MAX_PAYLOAD;
use pinlink::app::service::PeripheralService;
use pinlink::config::DeviceConfig;

struct NoLed;

impl IndicatorPort for NoLed {
    fn set(&mut self, _on: bool) {}
}

fuzz_target!(|data: &[u8]| {
    let mut service = PeripheralService::new(SimPins::new(), &DeviceConfig::default(), 0);
    let _ = service.register_digital_output("LED1", 11, OutputMode::PushPull);
    let _ = service.register_analog_input("ADC", 5);

    let mut link = BleLink::new("fuzz");
    let Ok(attr) = service.attach(&mut link) else {
        return;
    };
    let mut led = NoLed;
    let connected = link.sim_connect(1);
    service.handle_event(connected, 0, &mut link, &mut led);
    let mtu = link.sim_exchange_mtu(1, 517);
    service.handle_event(mtu, 0, &mut link, &mut led);
    link.sim_take_sent();

    // Split the input into several writes at 0xff bytes.
    for chunk in data.split(|b| *b == 0xff) {
        if let Some(event) = link.sim_client_write(1, attr, chunk) {
            service.handle_event(event, 0, &mut link, &mut led);
        }
    }

    assert!(service.is_connected());
    for (conn, bytes) in link.sim_take_sent() {
        assert_eq!(conn, 1);
        assert!(bytes.len() <= MAX_PAYLOAD);
        assert!(core::str::from_utf8(&bytes).is_ok());
    }
});
