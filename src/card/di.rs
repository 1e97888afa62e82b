//! Digital input evaluator: debounce, edge qualification, counting.
//!
//! Filter lifecycle per scan:
//!
//! ```text
//!  IDLE ──[edge matches mode]──▶ FILTERING ──[stable for window]──▶ QUALIFIED
//!    ▲                               │                                 │
//!    │                        [bounce/cancel]                          │
//!    └───────────────────────────────┴─────────────────────────────────┘
//!
//!  resetOk (any state) ──▶ INHIBITED  (counter cleared, processing held)
//! ```
//!
//! The set block acts as a gated enable: edge detection, debounce and
//! counting run only while it is true. The physical (polarity-adjusted)
//! sample is published in every state, including INHIBITED.

use serde::{Deserialize, Serialize};

use crate::card::condition::ConditionBlock;

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// Which transition of the debounced sample qualifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeMode {
    Rising,
    Falling,
    Change,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiConfig {
    pub channel: u8,
    /// Active-low polarity when true.
    pub invert: bool,
    /// Debounce window; quantized to whole scans at commit.
    pub debounce_time: u32,
    pub edge_mode: EdgeMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<ConditionBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<ConditionBlock>,
    /// UI hint: expose the qualified-edge counter to operators.
    #[serde(default)]
    pub counter_visible: bool,
}

// ───────────────────────────────────────────────────────────────
// Runtime
// ───────────────────────────────────────────────────────────────

/// Filter lifecycle state, published in snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterState {
    #[default]
    Idle,
    Filtering,
    Qualified,
    Inhibited,
}

/// An in-flight debounce window: the post-edge level and how many
/// consecutive scans (edge scan inclusive) it has held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DebounceWindow {
    level: bool,
    stable_scans: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiRuntime {
    /// Qualified logical state (last qualified sample level).
    pub logical_state: bool,
    /// Polarity-adjusted raw sample, published every scan.
    pub physical_state: bool,
    /// One-scan pulse on edge qualification.
    pub trigger_flag: bool,
    /// Qualified-edge counter. Monotonic between resets.
    pub current_value: u32,
    pub filter_state: FilterState,
    prev_sample: bool,
    primed: bool,
    window: Option<DebounceWindow>,
}

impl DiRuntime {
    /// Seed the edge detector from the current effective sample.
    ///
    /// Called by the kernel when an input force is applied, removed,
    /// or changed, so the forced transition itself never reads as a
    /// qualified edge.
    pub fn prime(&mut self, cfg: &DiConfig, raw_sample: bool) {
        self.prev_sample = raw_sample ^ cfg.invert;
        self.primed = true;
        self.window = None;
    }
}

// ───────────────────────────────────────────────────────────────
// Evaluation
// ───────────────────────────────────────────────────────────────

/// Run one scan of the DI machine.
///
/// `raw_sample` is the pin or forced level before polarity adjustment;
/// `debounce_scans` is the commit-time quantized window length.
pub fn evaluate(
    cfg: &DiConfig,
    rt: &mut DiRuntime,
    raw_sample: bool,
    set_ok: bool,
    reset_ok: bool,
    debounce_scans: u32,
) {
    let sample = raw_sample ^ cfg.invert;
    rt.physical_state = sample;

    let prev = if rt.primed { rt.prev_sample } else { sample };
    rt.prev_sample = sample;
    rt.primed = true;

    if reset_ok {
        rt.logical_state = false;
        rt.trigger_flag = false;
        rt.current_value = 0;
        rt.window = None;
        rt.filter_state = FilterState::Inhibited;
        return;
    }

    if !set_ok {
        rt.trigger_flag = false;
        rt.window = None;
        rt.filter_state = FilterState::Idle;
        return;
    }

    let rising = !prev && sample;
    let falling = prev && !sample;
    let edge_matches = match cfg.edge_mode {
        EdgeMode::Rising => rising,
        EdgeMode::Falling => falling,
        EdgeMode::Change => rising || falling,
    };

    if edge_matches {
        rt.window = Some(DebounceWindow {
            level: sample,
            stable_scans: 1,
        });
    } else if let Some(window) = rt.window.as_mut() {
        if sample == window.level {
            window.stable_scans += 1;
        } else {
            // Non-qualifying transition inside the window: bounce.
            rt.window = None;
        }
    }

    match rt.window {
        Some(window) if window.stable_scans >= debounce_scans => {
            rt.trigger_flag = true;
            rt.current_value = rt.current_value.saturating_add(1);
            rt.logical_state = window.level;
            rt.filter_state = FilterState::Qualified;
            rt.window = None;
        }
        Some(_) => {
            rt.trigger_flag = false;
            rt.filter_state = FilterState::Filtering;
        }
        None => {
            rt.trigger_flag = false;
            rt.filter_state = FilterState::Idle;
        }
    }
}
