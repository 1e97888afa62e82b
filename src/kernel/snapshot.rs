//! Immutable per-scan snapshots.
//!
//! One snapshot is published at the end of every completed scan, with
//! a strictly increasing `revision`. While the kernel is paused (STEP
//! with no pending step, or a halted breakpoint) it republishes the
//! last content with the same revision and a bumped `heartbeat` so
//! observers can tell a live-but-paused kernel from a dead one.
//!
//! Unknown fields must be ignored by clients; servers never re-read
//! snapshots, so the format is forward-extensible.

use serde::{Deserialize, Serialize};

use crate::card::ai::Quality;
use crate::card::di::FilterState;
use crate::card::mission::MissionState;
use crate::card::Health;
use crate::kernel::commands::RunMode;

/// Firmware version stamped into `system.fwVersion`.
pub const FW_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Strictly monotone across completed scans.
    pub revision: u64,
    /// Bumps on every publish, paused republishes included.
    pub heartbeat: u64,
    /// Wall-clock milliseconds at publish.
    pub timestamp_ms: u64,
    pub scan_interval_ms: u32,
    pub run_mode: RunMode,
    /// Duration of the scan that produced this snapshot.
    pub scan_duration_us: u32,
    pub overrun_count: u32,
    pub test_mode: TestMode,
    pub system: SystemStatus,
    /// One entry per configured card, in deterministic scan order.
    pub cards: Vec<CardSnapshot>,
}

impl Snapshot {
    /// Pre-commit placeholder published before the first scan.
    pub fn empty() -> Self {
        Self {
            revision: 0,
            heartbeat: 0,
            timestamp_ms: 0,
            scan_interval_ms: 0,
            run_mode: RunMode::Normal,
            scan_duration_us: 0,
            overrun_count: 0,
            test_mode: TestMode::default(),
            system: SystemStatus::default(),
            cards: Vec::new(),
        }
    }
}

/// Commissioning aids currently engaged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMode {
    pub output_mask_global: bool,
    /// True while any input force is applied.
    pub inputs_forced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    /// Any card currently at FAULT health.
    pub alarm_active: bool,
    pub wifi_online: bool,
    pub fw_version: String,
}

/// Authoritative per-card runtime as of this scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSnapshot {
    pub card_id: u32,
    pub enabled: bool,
    pub health: Health,
    pub last_eval_us: u32,
    pub fault_count: u32,
    #[serde(flatten)]
    pub detail: CardDetail,
}

/// Family-specific runtime fields, tagged like the config variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cardType", rename_all = "camelCase")]
pub enum CardDetail {
    #[serde(rename = "DI", rename_all = "camelCase")]
    Di {
        logical_state: bool,
        physical_state: bool,
        trigger_flag: bool,
        /// Qualified-edge counter.
        current_value: u32,
        filter_state: FilterState,
    },
    #[serde(rename = "AI", rename_all = "camelCase")]
    Ai {
        /// Filtered value, centiunits.
        current_value: u32,
        quality: Quality,
    },
    #[serde(rename = "SIO", rename_all = "camelCase")]
    Sio {
        logical_state: bool,
        physical_state: bool,
        mission_state: MissionState,
        /// Completed-cycle counter.
        current_value: u32,
    },
    #[serde(rename = "DO", rename_all = "camelCase")]
    Do {
        logical_state: bool,
        physical_state: bool,
        mission_state: MissionState,
        current_value: u32,
        /// Level handed to the output adapter after masking.
        physical_drive: bool,
        masked: bool,
    },
    #[serde(rename = "MATH", rename_all = "camelCase")]
    Math {
        current_value: u32,
        intermediate_value: u32,
        fault_status: bool,
    },
    #[serde(rename = "RTC", rename_all = "camelCase")]
    Rtc {
        logical_state: bool,
        time_until_next_start_sec: u64,
        time_until_next_end_sec: u64,
    },
}
