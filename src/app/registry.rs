//! Pin registry — named pins in three categories and their snapshots.
//!
//! ```text
//!   "do"  digital outputs  ── write() / read back
//!   "di"  digital inputs   ── sampled (optionally edge-armed)
//!   "ai"  analog inputs    ── sampled
//! ```
//!
//! Entries are created by the `register_*` calls before the run loop
//! starts and live for the whole run.  Names are unique within a
//! category; the same name may appear in two categories, in which case
//! the category a client supplies decides which pin it means.
//!
//! Re-registering a name in the same category replaces the entry in
//! place (same slot, same edge source); no error is raised.
//!
//! A registration is refused if the snapshot, with every value at its
//! widest, would no longer fit the `{"status":"ready","data":..}`
//! initial value.  Every later `{"data":..}` message is smaller.

use embedded_hal::digital::{Error as _, InputPin, OutputPin, PinState, StatefulOutputPin};
use log::{info, warn};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::PinError;

use super::ports::{AnalogPin, InputMode, OutputMode, PinBackend, Pull};
use super::protocol::MAX_PAYLOAD;

/// Pins per category (fixed capacity, no heap).
pub const MAX_PINS_PER_CATEGORY: usize = 16;

/// Longest accepted pin name, in bytes.
pub const MAX_PIN_NAME_LEN: usize = 16;

pub type PinName = heapless::String<MAX_PIN_NAME_LEN>;

/// Bytes the initial-value envelope adds around a snapshot.
const READY_ENVELOPE_LEN: usize = r#"{"status":"ready","data":}"#.len();

/// Largest encoded snapshot any outbound message can carry.
pub const MAX_SNAPSHOT_LEN: usize = MAX_PAYLOAD - READY_ENVELOPE_LEN;

// ───────────────────────────────────────────────────────────────
// Categories
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    DigitalOutput,
    DigitalInput,
    AnalogInput,
}

impl Category {
    /// Short key used on the wire (`do`, `di`, `ai`).
    /// Widest value a pin of this category can report.
    const fn widest_value(self) -> u16 {
        match self {
            Self::AnalogInput => u16::MAX,
            Self::DigitalOutput | Self::DigitalInput => 1,
        }
    }

    pub const fn wire_key(self) -> &'static str {
        match self {
            Self::DigitalOutput => "do",
            Self::DigitalInput => "di",
            Self::AnalogInput => "ai",
        }
    }

    /// Parse a wire key.  Accepts the short keys and the older
    /// long-form names.
    pub fn from_wire(key: &str) -> Option<Self> {
        match key {
            "do" | "digital_outputs" => Some(Self::DigitalOutput),
            "di" | "digital_inputs" => Some(Self::DigitalInput),
            "ai" | "analog_inputs" => Some(Self::AnalogInput),
            _ => None,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Snapshot
// ───────────────────────────────────────────────────────────────

/// One pin's sampled value and its GPIO number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PinReading {
    #[serde(rename = "v")]
    pub value: u16,
    #[serde(rename = "g")]
    pub gpio: i32,
}

/// `name → reading` for one category, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinTable {
    entries: heapless::Vec<(PinName, PinReading), MAX_PINS_PER_CATEGORY>,
}

impl PinTable {
    pub fn get(&self, name: &str) -> Option<&PinReading> {
        self.entries
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, r)| r)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PinReading)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    fn push(&mut self, name: &PinName, reading: PinReading) {
        // Capacity matches the registry's, so this cannot overflow.
        let _ = self.entries.push((name.clone(), reading));
    }

    fn remove(&mut self, name: &PinName) {
        self.entries.retain(|(n, _)| n != name);
    }
}

impl Serialize for PinTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, reading) in &self.entries {
            map.serialize_entry(name.as_str(), reading)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct CategoryTables {
    #[serde(rename = "do")]
    pub digital_outputs: PinTable,
    #[serde(rename = "di")]
    pub digital_inputs: PinTable,
    #[serde(rename = "ai")]
    pub analog_inputs: PinTable,
}

/// Immutable point-in-time read of every registered pin.
///
/// Serialises as `{"d": {"do": {..}, "di": {..}, "ai": {..}}}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct StateSnapshot {
    #[serde(rename = "d")]
    pub pins: CategoryTables,
}

impl StateSnapshot {
    fn table(&self, category: Category) -> &PinTable {
        match category {
            Category::DigitalOutput => &self.pins.digital_outputs,
            Category::DigitalInput => &self.pins.digital_inputs,
            Category::AnalogInput => &self.pins.analog_inputs,
        }
    }

    fn table_mut(&mut self, category: Category) -> &mut PinTable {
        match category {
            Category::DigitalOutput => &mut self.pins.digital_outputs,
            Category::DigitalInput => &mut self.pins.digital_inputs,
            Category::AnalogInput => &mut self.pins.analog_inputs,
        }
    }

    pub fn get(&self, category: Category, name: &str) -> Option<&PinReading> {
        self.table(category).get(name)
    }
}

// ───────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────

struct Entry<H> {
    name: PinName,
    gpio: i32,
    handle: H,
    /// Last successfully sampled value; reported if a read fails.
    last: u16,
}

type Table<H> = heapless::Vec<Entry<H>, MAX_PINS_PER_CATEGORY>;

/// Owns the pin backend and every registered driver handle.
pub struct PinRegistry<B: PinBackend> {
    backend: B,
    outputs: Table<B::Output>,
    inputs: Table<B::Input>,
    analogs: Table<B::Analog>,
}

impl<B: PinBackend> PinRegistry<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            outputs: heapless::Vec::new(),
            inputs: heapless::Vec::new(),
            analogs: heapless::Vec::new(),
        }
    }

    // ── Registration ──────────────────────────────────────────

    pub fn register_digital_output(
        &mut self,
        name: &str,
        gpio: i32,
        mode: OutputMode,
    ) -> Result<(), PinError> {
        let name = pin_name(name)?;
        let slot = free_slot(&self.outputs, &name)?;
        self.check_budget(Category::DigitalOutput, &name, gpio)?;
        let mut handle = self.backend.open_output(gpio, mode)?;
        let last = u16::from(handle.is_set_high().unwrap_or(false));
        upsert(&mut self.outputs, slot, Entry { name, gpio, handle, last });
        info!("REG: do[{}] GPIO{} ({:?})", slot, gpio, mode);
        Ok(())
    }

    /// Interrupt-mode inputs use their slot index as edge source, so
    /// a replaced entry keeps raising the same latch bit.
    pub fn register_digital_input(
        &mut self,
        name: &str,
        gpio: i32,
        mode: InputMode,
        pull: Option<Pull>,
    ) -> Result<(), PinError> {
        let name = pin_name(name)?;
        let slot = free_slot(&self.inputs, &name)?;
        self.check_budget(Category::DigitalInput, &name, gpio)?;
        let edge_source = match mode {
            InputMode::Interrupt => Some(slot as u8),
            InputMode::Polled => None,
        };
        let mut handle = self.backend.open_input(gpio, pull, edge_source)?;
        let last = u16::from(handle.is_high().unwrap_or(false));
        upsert(&mut self.inputs, slot, Entry { name, gpio, handle, last });
        info!("REG: di[{}] GPIO{} ({:?}, pull={:?})", slot, gpio, mode, pull);
        Ok(())
    }

    pub fn register_analog_input(&mut self, name: &str, gpio: i32) -> Result<(), PinError> {
        let name = pin_name(name)?;
        let slot = free_slot(&self.analogs, &name)?;
        self.check_budget(Category::AnalogInput, &name, gpio)?;
        let handle = self.backend.open_analog(gpio)?;
        upsert(&mut self.analogs, slot, Entry { name, gpio, handle, last: 0 });
        info!("REG: ai[{}] GPIO{}", slot, gpio);
        Ok(())
    }

    /// Refuse `name` if the widest possible snapshot with it in place
    /// would exceed [`MAX_SNAPSHOT_LEN`].
    fn check_budget(&self, category: Category, name: &PinName, gpio: i32) -> Result<(), PinError> {
        let mut snap = StateSnapshot::default();
        fill_widest(&mut snap.pins.digital_outputs, &self.outputs, Category::DigitalOutput);
        fill_widest(&mut snap.pins.digital_inputs, &self.inputs, Category::DigitalInput);
        fill_widest(&mut snap.pins.analog_inputs, &self.analogs, Category::AnalogInput);

        let table = snap.table_mut(category);
        table.remove(name);
        table.push(name, PinReading { value: category.widest_value(), gpio });

        let len = serde_json::to_vec(&snap).map_or(usize::MAX, |bytes| bytes.len());
        if len > MAX_SNAPSHOT_LEN {
            warn!(
                "REG: '{}' refused, snapshot would need {} of {} bytes",
                name, len, MAX_SNAPSHOT_LEN
            );
            return Err(PinError::SnapshotTooLarge(len));
        }
        Ok(())
    }

    // ── Queries ───────────────────────────────────────────────

    /// Sample every input, read back every output.
    pub fn snapshot(&mut self) -> StateSnapshot {
        let mut snap = StateSnapshot::default();

        for e in &mut self.outputs {
            match e.handle.is_set_high() {
                Ok(high) => e.last = u16::from(high),
                Err(err) => warn!("REG: read-back of '{}' failed: {:?}", e.name, err.kind()),
            }
            snap.pins.digital_outputs.push(&e.name, reading(e));
        }

        for e in &mut self.inputs {
            match e.handle.is_high() {
                Ok(high) => e.last = u16::from(high),
                Err(err) => warn!("REG: sample of '{}' failed: {:?}", e.name, err.kind()),
            }
            snap.pins.digital_inputs.push(&e.name, reading(e));
        }

        for e in &mut self.analogs {
            match e.handle.read_raw() {
                Ok(raw) => e.last = raw,
                Err(err) => warn!("REG: ADC read of '{}' failed: {:?}", e.name, err),
            }
            snap.pins.analog_inputs.push(&e.name, reading(e));
        }

        snap
    }

    pub fn len(&self, category: Category) -> usize {
        match category {
            Category::DigitalOutput => self.outputs.len(),
            Category::DigitalInput => self.inputs.len(),
            Category::AnalogInput => self.analogs.len(),
        }
    }

    // ── Mutation ──────────────────────────────────────────────

    /// Drive a digital output.  Any other category is `UnknownPin`.
    pub fn write(&mut self, category: Category, name: &str, high: bool) -> Result<(), PinError> {
        if category != Category::DigitalOutput {
            return Err(PinError::UnknownPin);
        }
        let entry = self
            .outputs
            .iter_mut()
            .find(|e| e.name == name)
            .ok_or(PinError::UnknownPin)?;
        entry
            .handle
            .set_state(PinState::from(high))
            .map_err(|e| PinError::Driver(e.kind()))?;
        entry.last = u16::from(high);
        Ok(())
    }
}

// ── Internal ──────────────────────────────────────────────────

fn pin_name(name: &str) -> Result<PinName, PinError> {
    if name.is_empty() {
        return Err(PinError::InvalidName);
    }
    let mut out = PinName::new();
    out.push_str(name).map_err(|()| PinError::InvalidName)?;
    Ok(out)
}

/// Slot for `name`: its existing index, or the next free one.
fn free_slot<H>(table: &Table<H>, name: &PinName) -> Result<usize, PinError> {
    match table.iter().position(|e| e.name == *name) {
        Some(idx) => Ok(idx),
        None if table.is_full() => Err(PinError::RegistryFull),
        None => Ok(table.len()),
    }
}

fn upsert<H>(table: &mut Table<H>, slot: usize, entry: Entry<H>) {
    if slot < table.len() {
        warn!("REG: '{}' re-registered, replacing previous entry", entry.name);
        table[slot] = entry;
    } else {
        // free_slot() checked capacity.
        let _ = table.push(entry);
    }
}

fn fill_widest<H>(out: &mut PinTable, table: &Table<H>, category: Category) {
    for e in table {
        out.push(&e.name, PinReading { value: category.widest_value(), gpio: e.gpio });
    }
}

fn reading<H>(e: &Entry<H>) -> PinReading {
    PinReading {
        value: e.last,
        gpio: e.gpio,
    }
}
