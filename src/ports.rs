//! Port traits — the boundary between the evaluation kernel and the platform.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ ScanKernel (domain)
//! ```
//!
//! Platform adapters (GPIO drivers, ADC, flash, the system clock
//! service) implement these traits. The kernel consumes them via
//! generics, so the scan path never touches hardware directly and the
//! whole engine runs against mocks on the host.
//!
//! Adapters MUST be non-blocking: every call returns within a bounded
//! time or yields a failure value. Any internal queuing is the
//! adapter's responsibility, not the kernel's.

use crate::error::{FaultKind, IoError, StorageError};

// ───────────────────────────────────────────────────────────────
// Time source
// ───────────────────────────────────────────────────────────────

/// Synchronization quality of the wall clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Wall clock is trusted (NTP/RTC chip agree).
    Synced,
    /// Wall clock is free-running since boot; calendar matching is unsafe.
    Unsynced,
    /// Wall clock is known-bad (backup battery dead, never set).
    Invalid,
}

/// A wall-clock reading with its trust level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    /// Seconds since the Unix epoch, UTC.
    pub epoch_sec: u64,
    pub sync: SyncState,
}

/// Monotonic and wall-clock time for the kernel.
pub trait TimeSource {
    /// Monotonic microseconds since an arbitrary origin. Never goes
    /// backwards; drives the scan cadence.
    fn now_monotonic_us(&self) -> u64;

    /// Current wall clock for calendar schedules.
    fn wall_clock(&self) -> WallClock;
}

// ───────────────────────────────────────────────────────────────
// Input adapters (driven: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// Read side for digital input channels.
pub trait DigitalInputAdapter {
    fn read_digital(&mut self, channel: u8) -> Result<bool, IoError>;
}

/// Read side for analog input channels. Raw values are adapter units
/// (ADC counts or pre-scaled sensor units).
pub trait AnalogInputAdapter {
    fn read_analog(&mut self, channel: u8) -> Result<u32, IoError>;
}

// ───────────────────────────────────────────────────────────────
// Output adapter (driven: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write side for digital output channels.
///
/// Implementations MUST be idempotent: writing the current level again
/// is a no-op at the hardware layer.
pub trait DigitalOutputAdapter {
    fn write_digital(&mut self, channel: u8, level: bool) -> Result<(), IoError>;
}

// ───────────────────────────────────────────────────────────────
// Persistence
// ───────────────────────────────────────────────────────────────

/// Logical persistence slots. The actual byte store is external; the
/// kernel only sees opaque slot-addressed blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Slot {
    Active = 0,
    Staged = 1,
    Lkg = 2,
    Factory = 3,
    /// Persisted fault counters (diagnostics, not configuration).
    FaultLedger = 4,
}

/// Opaque slot-addressed byte store.
///
/// `write_atomic` MUST be all-or-nothing across power loss; `rotate`
/// copies src over dst in one atomic step. Both are satisfied natively
/// by flash translation layers with A/B pages.
pub trait Storage {
    fn read(&self, slot: Slot) -> Result<Vec<u8>, StorageError>;
    fn write_atomic(&mut self, slot: Slot, bytes: &[u8]) -> Result<(), StorageError>;
    fn rotate(&mut self, src: Slot, dst: Slot) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Fault sink
// ───────────────────────────────────────────────────────────────

/// Receives structured fault records from the scan path.
///
/// Implementations must not block; a lossy sink is acceptable. The
/// kernel keeps its own per-card counters regardless of what the sink
/// does with the record.
pub trait FaultSink {
    fn record(&mut self, kind: FaultKind, card_id: Option<u32>, details: &str);
}

/// A sink that drops every record. Useful for tests and bring-up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFaultSink;

impl FaultSink for NullFaultSink {
    fn record(&mut self, _kind: FaultKind, _card_id: Option<u32>, _details: &str) {}
}
