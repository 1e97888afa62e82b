//! Card families and their per-scan evaluators.
//!
//! Every functional element of the controller is a typed card: digital
//! input, analog input, soft IO, digital output, math, real-time
//! clock. All families share identity, enablement, fault policy and a
//! set/reset condition surface (where legal); the family variant
//! carries the rest. Dispatch is a plain `match` on the variant — no
//! virtual calls in the scan path.

pub mod ai;
pub mod condition;
pub mod di;
pub mod math;
pub mod mission;
pub mod rtc;

use serde::{Deserialize, Serialize};

use crate::config::CardBehavior;

// ───────────────────────────────────────────────────────────────
// Shared runtime
// ───────────────────────────────────────────────────────────────

/// Card health as published in snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    #[default]
    Ok,
    Warn,
    Fault,
}

/// Runtime bookkeeping common to every family.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardCommon {
    pub health: Health,
    /// Duration of this card's last evaluation, microseconds.
    pub last_eval_us: u32,
    /// Total faults recorded on this card since commit.
    pub fault_count: u32,
    /// Critical faults latch until acknowledged by command.
    pub latched: bool,
}

impl CardCommon {
    /// Record a fault at the given severity. CRITICAL latches.
    pub fn record_fault(&mut self, health: Health, latch: bool) {
        self.fault_count = self.fault_count.saturating_add(1);
        if latch {
            self.latched = true;
        }
        // Health only escalates; WARN never downgrades FAULT.
        self.health = match (self.health, health) {
            (Health::Fault, _) | (_, Health::Fault) => Health::Fault,
            (Health::Warn, _) | (_, Health::Warn) => Health::Warn,
            _ => Health::Ok,
        };
    }

    /// Clear transient health. Latched criticals survive until
    /// acknowledged.
    pub fn clear_transient(&mut self) {
        if !self.latched {
            self.health = Health::Ok;
        }
    }

    /// Acknowledge a latched fault; health recovers next scan.
    pub fn acknowledge(&mut self) {
        self.latched = false;
        self.health = Health::Ok;
    }
}

/// DO runtime: a mission plus the masked physical drive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DoRuntime {
    pub mission: mission::MissionRuntime,
    /// Level actually handed to the output adapter:
    /// `physicalState AND NOT (maskGlobal OR maskLocal)`.
    pub physical_drive: bool,
}

/// Family-specific runtime record.
#[derive(Debug, Clone, PartialEq)]
pub enum FamilyRuntime {
    Di(di::DiRuntime),
    Ai(ai::AiRuntime),
    Sio(mission::MissionRuntime),
    Do(DoRuntime),
    Math(math::MathRuntime),
    Rtc(rtc::RtcRuntime),
}

impl FamilyRuntime {
    /// Fresh runtime for a card's behavior variant.
    pub fn for_behavior(behavior: &CardBehavior) -> Self {
        match behavior {
            CardBehavior::Di(_) => Self::Di(di::DiRuntime::default()),
            CardBehavior::Ai(_) => Self::Ai(ai::AiRuntime::default()),
            CardBehavior::Sio(_) => Self::Sio(mission::MissionRuntime::default()),
            CardBehavior::Do(_) => Self::Do(DoRuntime::default()),
            CardBehavior::Math(_) => Self::Math(math::MathRuntime::default()),
            CardBehavior::Rtc(_) => Self::Rtc(rtc::RtcRuntime::default()),
        }
    }
}
