//! Fault accounting and diagnostics.
//!
//! Every fault increments a per-kind counter in a compact postcard
//! record persisted through the [`Storage`](crate::ports::Storage)
//! port, so totals survive reboot. A small in-memory ring keeps the
//! most recent fault records for the diagnostics surface; only the
//! counters are persisted, the ring does not survive a reset.

use serde::{Deserialize, Serialize};

use crate::error::{FaultKind, StorageError};
use crate::ports::{FaultSink, Slot, Storage};

/// Most recent faults kept in memory.
const RECENT_FAULTS: usize = 16;
/// Detail strings are truncated to fit a fixed-capacity buffer.
const DETAIL_CAP: usize = 48;

/// The persisted record: one counter per fault kind plus a total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCounts {
    pub per_kind: [u32; FaultKind::COUNT],
    pub total: u32,
}

/// One remembered fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    pub kind: FaultKind,
    pub card_id: Option<u32>,
    pub detail: heapless::String<DETAIL_CAP>,
}

/// Storage-backed fault ledger. Implements [`FaultSink`] so it can be
/// handed straight to the kernel tick.
#[derive(Default)]
pub struct FaultLedger {
    counts: LedgerCounts,
    recent: heapless::Deque<FaultRecord, RECENT_FAULTS>,
    dirty: bool,
}

impl FaultLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load persisted counters, or start fresh when none exist.
    pub fn load(storage: &impl Storage) -> Self {
        let counts = storage
            .read(Slot::FaultLedger)
            .ok()
            .and_then(|bytes| postcard::from_bytes(&bytes).ok())
            .unwrap_or_default();
        Self {
            counts,
            recent: heapless::Deque::new(),
            dirty: false,
        }
    }

    /// Persist the counters if anything changed since the last flush.
    pub fn persist(&mut self, storage: &mut impl Storage) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        let bytes =
            postcard::to_allocvec(&self.counts).map_err(|_| StorageError::IoError)?;
        storage.write_atomic(Slot::FaultLedger, &bytes)?;
        self.dirty = false;
        Ok(())
    }

    pub fn counts(&self) -> &LedgerCounts {
        &self.counts
    }

    pub fn count_of(&self, kind: FaultKind) -> u32 {
        self.counts.per_kind[kind.index()]
    }

    pub fn total(&self) -> u32 {
        self.counts.total
    }

    /// Most recent faults, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &FaultRecord> {
        self.recent.iter()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

impl FaultSink for FaultLedger {
    fn record(&mut self, kind: FaultKind, card_id: Option<u32>, details: &str) {
        self.counts.per_kind[kind.index()] =
            self.counts.per_kind[kind.index()].saturating_add(1);
        self.counts.total = self.counts.total.saturating_add(1);
        self.dirty = true;

        let mut detail = heapless::String::new();
        let _ = detail.push_str(&details[..details.len().min(DETAIL_CAP - 1)]);
        if self.recent.is_full() {
            self.recent.pop_front();
        }
        let _ = self.recent.push_back(FaultRecord {
            kind,
            card_id,
            detail,
        });

        match card_id {
            Some(id) => log::warn!("fault on card {id}: {kind} ({details})"),
            None => log::warn!("fault: {kind} ({details})"),
        }
    }
}
