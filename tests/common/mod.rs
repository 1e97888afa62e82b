//! Mock platform adapters for integration tests.
//!
//! Records every output write so tests can assert on the full drive
//! history without touching real GPIO, and lets tests script input
//! samples and clock progress scan by scan.

use std::cell::Cell;
use std::collections::HashMap;

use advtimer::card::condition::{
    Clause, Combiner, ConditionBlock, Operator, SourceField, SourceRef, ValueType,
};
use advtimer::config::{CardBehavior, CardConfig, ConfigEnvelope, FaultPolicy};
use advtimer::error::{FaultKind, IoError, StorageError};
use advtimer::kernel::commands::{CommandEnvelope, KernelCommand};
use advtimer::kernel::queue::Producer;
use advtimer::kernel::ScanKernel;
use advtimer::ports::{
    AnalogInputAdapter, DigitalInputAdapter, DigitalOutputAdapter, FaultSink, Slot, Storage,
    SyncState, TimeSource, WallClock,
};

// ── Clock ─────────────────────────────────────────────────────

pub struct MockClock {
    mono_us: Cell<u64>,
    epoch_ms: Cell<u64>,
    sync: Cell<SyncState>,
}

#[allow(dead_code)]
impl MockClock {
    pub fn new() -> Self {
        Self {
            mono_us: Cell::new(1_000_000),
            epoch_ms: Cell::new(1_704_067_200_000), // 2024-01-01 00:00:00 UTC
            sync: Cell::new(SyncState::Synced),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        self.mono_us.set(self.mono_us.get() + ms * 1000);
        self.epoch_ms.set(self.epoch_ms.get() + ms);
    }

    pub fn set_sync(&self, sync: SyncState) {
        self.sync.set(sync);
    }
}

impl TimeSource for MockClock {
    fn now_monotonic_us(&self) -> u64 {
        self.mono_us.get()
    }

    fn wall_clock(&self) -> WallClock {
        WallClock {
            epoch_sec: self.epoch_ms.get() / 1000,
            sync: self.sync.get(),
        }
    }
}

// ── IO bus ────────────────────────────────────────────────────

/// Scriptable digital/analog input bus with a full write history.
#[derive(Default)]
pub struct MockBus {
    pub digital_in: [bool; 8],
    pub analog_in: [u32; 8],
    pub fail_digital: bool,
    pub fail_analog: bool,
    /// Every write, in order: (channel, level).
    pub writes: Vec<(u8, bool)>,
    last_level: HashMap<u8, bool>,
}

#[allow(dead_code)]
impl MockBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last level written to a channel.
    pub fn level(&self, channel: u8) -> Option<bool> {
        self.last_level.get(&channel).copied()
    }

    /// True if the channel ever went high.
    pub fn ever_high(&self, channel: u8) -> bool {
        self.writes.iter().any(|&(ch, level)| ch == channel && level)
    }
}

impl DigitalInputAdapter for MockBus {
    fn read_digital(&mut self, channel: u8) -> Result<bool, IoError> {
        if self.fail_digital {
            return Err(IoError::ReadFailed);
        }
        self.digital_in
            .get(channel as usize)
            .copied()
            .ok_or(IoError::NoSuchChannel)
    }
}

impl AnalogInputAdapter for MockBus {
    fn read_analog(&mut self, channel: u8) -> Result<u32, IoError> {
        if self.fail_analog {
            return Err(IoError::ReadFailed);
        }
        self.analog_in
            .get(channel as usize)
            .copied()
            .ok_or(IoError::NoSuchChannel)
    }
}

impl DigitalOutputAdapter for MockBus {
    fn write_digital(&mut self, channel: u8, level: bool) -> Result<(), IoError> {
        self.writes.push((channel, level));
        self.last_level.insert(channel, level);
        Ok(())
    }
}

// ── Fault sink ────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub records: Vec<(FaultKind, Option<u32>, String)>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count_of(&self, kind: FaultKind) -> usize {
        self.records.iter().filter(|(k, _, _)| *k == kind).count()
    }
}

impl FaultSink for RecordingSink {
    fn record(&mut self, kind: FaultKind, card_id: Option<u32>, details: &str) {
        self.records.push((kind, card_id, details.to_string()));
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStorage {
    pub slots: HashMap<u8, Vec<u8>>,
}

impl Storage for MemStorage {
    fn read(&self, slot: Slot) -> Result<Vec<u8>, StorageError> {
        self.slots
            .get(&(slot as u8))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    fn write_atomic(&mut self, slot: Slot, bytes: &[u8]) -> Result<(), StorageError> {
        self.slots.insert(slot as u8, bytes.to_vec());
        Ok(())
    }

    fn rotate(&mut self, src: Slot, dst: Slot) -> Result<(), StorageError> {
        let bytes = self.read(src)?;
        self.write_atomic(dst, &bytes)
    }
}

// ── Config builders ───────────────────────────────────────────

#[allow(dead_code)]
pub fn envelope(cards: Vec<CardConfig>) -> ConfigEnvelope {
    ConfigEnvelope {
        config_id: "test".to_string(),
        cards,
        ..ConfigEnvelope::factory()
    }
}

#[allow(dead_code)]
pub fn card(card_id: u32, behavior: CardBehavior) -> CardConfig {
    CardConfig {
        card_id,
        enabled: true,
        label: format!("card {card_id}"),
        fault_policy: FaultPolicy::Warn,
        behavior,
    }
}

/// A one-clause block comparing a card's physical state to a level.
#[allow(dead_code)]
pub fn physical_is(card_id: u32, level: bool) -> ConditionBlock {
    ConditionBlock {
        clause_a: Clause {
            source: SourceRef {
                card_id,
                field: SourceField::PhysicalState,
                value_type: ValueType::Bool,
            },
            operator: Operator::Eq,
            threshold: level as u32,
        },
        clause_b: None,
        combiner: Combiner::None,
    }
}

// ── Drivers ───────────────────────────────────────────────────

/// Run `n` scans at the given cadence: tick, then advance the clock.
#[allow(dead_code)]
pub fn run_scans(
    kernel: &mut ScanKernel,
    bus: &mut MockBus,
    clock: &MockClock,
    sink: &mut RecordingSink,
    n: usize,
    interval_ms: u64,
) {
    for _ in 0..n {
        kernel.tick(bus, clock, sink);
        clock.advance_ms(interval_ms);
    }
}

/// Queue a kernel command with an arbitrary request id.
#[allow(dead_code)]
pub fn send(commands: &Producer<CommandEnvelope>, command: KernelCommand) {
    commands
        .push(CommandEnvelope {
            request_id: 1,
            command,
        })
        .expect("command queue full");
}
