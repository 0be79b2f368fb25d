//! Mock adapters for integration tests.
//!
//! A shared in-memory board behind the `PinBackend` port, a link that
//! records every notification, and an indicator that keeps its history.
//! Nothing here touches the crate's global event statics.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use embedded_hal::digital::{ErrorKind, ErrorType, InputPin, OutputPin, StatefulOutputPin};
use serde_json::Value;

use pinlink::app::ports::{
    AnalogPin, AttrHandle, ConnHandle, IndicatorPort, InputMode, LinkPort, OutputMode, PinBackend,
    Pull,
};
use pinlink::app::service::PeripheralService;
use pinlink::config::DeviceConfig;
use pinlink::error::{LinkError, PinError};
use pinlink::events::{LinkEvent, WriteBuf};

pub const LED1: i32 = 11;
pub const LED2: i32 = 12;
pub const BUTTON: i32 = 16;
pub const ADC: i32 = 5;

// ── MockBoard ─────────────────────────────────────────────────

/// Electrical state shared between the test and every pin handle.
#[derive(Clone, Default)]
pub struct MockBoard {
    levels: Rc<RefCell<HashMap<i32, bool>>>,
    adc: Rc<RefCell<HashMap<i32, u16>>>,
    fail_reads: Rc<Cell<bool>>,
    pub edge_sources: Rc<RefCell<Vec<(i32, Option<u8>)>>>,
}

#[allow(dead_code)]
impl MockBoard {
    pub fn level(&self, gpio: i32) -> bool {
        self.levels.borrow().get(&gpio).copied().unwrap_or(false)
    }

    pub fn set_input(&self, gpio: i32, high: bool) {
        self.levels.borrow_mut().insert(gpio, high);
    }

    pub fn set_adc(&self, gpio: i32, raw: u16) {
        self.adc.borrow_mut().insert(gpio, raw);
    }

    /// Make every subsequent pin read fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.set(fail);
    }
}

pub struct MockPin {
    gpio: i32,
    board: MockBoard,
}

pub struct MockAdc {
    gpio: i32,
    board: MockBoard,
}

impl PinBackend for MockBoard {
    type Output = MockPin;
    type Input = MockPin;
    type Analog = MockAdc;

    fn open_output(&mut self, gpio: i32, _mode: OutputMode) -> Result<MockPin, PinError> {
        self.set_input(gpio, false);
        Ok(MockPin { gpio, board: self.clone() })
    }

    fn open_input(
        &mut self,
        gpio: i32,
        pull: Option<Pull>,
        edge_source: Option<u8>,
    ) -> Result<MockPin, PinError> {
        self.set_input(gpio, pull == Some(Pull::Up));
        self.edge_sources.borrow_mut().push((gpio, edge_source));
        Ok(MockPin { gpio, board: self.clone() })
    }

    fn open_analog(&mut self, gpio: i32) -> Result<MockAdc, PinError> {
        Ok(MockAdc { gpio, board: self.clone() })
    }
}

impl ErrorType for MockPin {
    type Error = ErrorKind;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), ErrorKind> {
        self.board.set_input(self.gpio, false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), ErrorKind> {
        self.board.set_input(self.gpio, true);
        Ok(())
    }
}

impl StatefulOutputPin for MockPin {
    fn is_set_high(&mut self) -> Result<bool, ErrorKind> {
        self.is_high()
    }

    fn is_set_low(&mut self) -> Result<bool, ErrorKind> {
        self.is_low()
    }
}

impl InputPin for MockPin {
    fn is_high(&mut self) -> Result<bool, ErrorKind> {
        if self.board.fail_reads.get() {
            return Err(ErrorKind::Other);
        }
        Ok(self.board.level(self.gpio))
    }

    fn is_low(&mut self) -> Result<bool, ErrorKind> {
        self.is_high().map(|h| !h)
    }
}

impl AnalogPin for MockAdc {
    type Error = ();

    fn read_raw(&mut self) -> Result<u16, ()> {
        if self.board.fail_reads.get() {
            return Err(());
        }
        Ok(self.board.adc.borrow().get(&self.gpio).copied().unwrap_or(0))
    }
}

// ── RecordingLink ─────────────────────────────────────────────

pub const VALUE_HANDLE: AttrHandle = 42;

pub const DEFAULT_MTU: u16 = 23;

/// Records notifications as parsed JSON.  Notifications longer than the
/// current MTU allows are refused, as the stack does.
pub struct RecordingLink {
    pub sent: Vec<(ConnHandle, Value)>,
    pub value: Vec<u8>,
    pub mtu: u16,
    pub fail_notify: bool,
    pub notify_attempts: usize,
}

#[allow(dead_code)]
impl RecordingLink {
    pub fn new() -> Self {
        Self {
            sent: Vec::new(),
            value: Vec::new(),
            mtu: DEFAULT_MTU,
            fail_notify: false,
            notify_attempts: 0,
        }
    }

    /// A central writes `attr`; the event carries a copy of the bytes.
    pub fn client_write(&mut self, conn: ConnHandle, attr: AttrHandle, data: &[u8]) -> LinkEvent {
        self.value = data.to_vec();
        LinkEvent::DataWritten {
            conn,
            attr,
            value: WriteBuf::from_slice(data).expect("write fits one attribute"),
        }
    }

    pub fn take_sent(&mut self) -> Vec<(ConnHandle, Value)> {
        std::mem::take(&mut self.sent)
    }

    pub fn stored_value(&self) -> Value {
        serde_json::from_slice(&self.value).expect("stored value is JSON")
    }
}

impl LinkPort for RecordingLink {
    fn register_service(&mut self) -> Result<AttrHandle, LinkError> {
        Ok(VALUE_HANDLE)
    }

    fn write_value(&mut self, _attr: AttrHandle, data: &[u8]) -> Result<(), LinkError> {
        self.value = data.to_vec();
        Ok(())
    }

    fn notify(&mut self, conn: ConnHandle, _attr: AttrHandle, data: &[u8]) -> Result<(), LinkError> {
        self.notify_attempts += 1;
        if self.fail_notify {
            return Err(LinkError::Rejected(-1));
        }
        if data.len() > usize::from(self.mtu - 3) {
            return Err(LinkError::MtuExceeded { len: data.len(), mtu: self.mtu });
        }
        let json = serde_json::from_slice(data).expect("notification is JSON");
        self.sent.push((conn, json));
        Ok(())
    }
}

// ── MockIndicator ─────────────────────────────────────────────

#[derive(Default)]
pub struct MockIndicator {
    pub history: Vec<bool>,
}

#[allow(dead_code)]
impl MockIndicator {
    pub fn is_on(&self) -> bool {
        self.history.last().copied().unwrap_or(false)
    }
}

impl IndicatorPort for MockIndicator {
    fn set(&mut self, on: bool) {
        self.history.push(on);
    }
}

// ── Fixture ───────────────────────────────────────────────────

pub struct Rig {
    pub service: PeripheralService<MockBoard>,
    pub board: MockBoard,
    pub link: RecordingLink,
    pub led: MockIndicator,
}

/// Demo board layout (LED1, LED2, Button, ADC), attached, disconnected.
pub fn rig_with(config: DeviceConfig) -> Rig {
    let board = MockBoard::default();
    let mut service = PeripheralService::new(board.clone(), &config, 0);
    service
        .register_digital_output("LED1", LED1, OutputMode::PushPull)
        .unwrap();
    service
        .register_digital_output("LED2", LED2, OutputMode::PushPull)
        .unwrap();
    service
        .register_digital_input("Button", BUTTON, InputMode::Interrupt, Some(Pull::Up))
        .unwrap();
    service.register_analog_input("ADC", ADC).unwrap();

    let mut link = RecordingLink::new();
    service.attach(&mut link).unwrap();

    Rig {
        service,
        board,
        link,
        led: MockIndicator::default(),
    }
}

pub fn rig() -> Rig {
    rig_with(DeviceConfig::default())
}

/// Pull `data.d.<cat>.<name>.v` out of a `{"data":..}` message.
#[allow(dead_code)]
pub fn pin_value(msg: &Value, cat: &str, name: &str) -> Option<u64> {
    msg["data"]["d"][cat][name]["v"].as_u64()
}
