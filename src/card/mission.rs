//! DO / SIO mission state machine.
//!
//! A mission is a timed output sequence latched by the rising edge of
//! the set condition:
//!
//! ```text
//!  IDLE ──[setOk ↑]──▶ ONDELAY ──[delay elapsed]──▶ ACTIVE
//!    ▲                                                 │
//!    │                                       [onDuration elapsed]
//!    │                                                 ▼
//!    │◀──[resetOk, any phase]            cycle++ ─▶ repeat? ──▶ ONDELAY
//!    │                                                 │
//!    └───────────────[repeat budget spent]────────── FINISHED
//! ```
//!
//! Reset precedence is absolute: if set and reset are both true in the
//! same scan, reset wins. New rising edges while a mission runs are
//! ignored (non-retriggerable); Gated mode additionally aborts the
//! mission the moment the set condition drops.

use serde::{Deserialize, Serialize};

use crate::card::condition::ConditionBlock;
use crate::centi;

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// Execution mode of the timed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissionMode {
    /// Wait `delayBeforeON`, run ACTIVE, repeat. Latched.
    Normal,
    /// Skip the initial delay (first cycle only). Latched.
    Immediate,
    /// Like Normal, but the set condition must stay true; a gate drop
    /// during ONDELAY/ACTIVE aborts to IDLE.
    Gated,
}

/// Who may apply runtime overrides (force/mask) to a soft card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WritePolicy {
    #[default]
    ReadWrite,
    ReadOnly,
}

/// Timing fields shared by DO and SIO cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MissionConfig {
    pub mode: MissionMode,
    /// Delay before the ACTIVE phase; 0 skips the delay.
    pub delay_before_on: u32,
    /// Length of the ACTIVE phase; 0 holds ACTIVE until reset.
    pub on_duration: u32,
    /// 0 = repeat until reset, N = exactly N full cycles.
    pub repeat_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<ConditionBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<ConditionBlock>,
}

/// Soft IO card: a mission with no physical pin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SioConfig {
    #[serde(flatten)]
    pub mission: MissionConfig,
    #[serde(default)]
    pub write_policy: WritePolicy,
}

/// Digital output card: a mission driving a physical channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoConfig {
    pub channel: u8,
    #[serde(flatten)]
    pub mission: MissionConfig,
    /// Level driven when a critical IO fault latches on this card.
    #[serde(default)]
    pub safe_drive: bool,
}

// ───────────────────────────────────────────────────────────────
// Runtime
// ───────────────────────────────────────────────────────────────

/// Internal mission phase. ONDELAY is collapsed into ACTIVE for the
/// published tri-state [`MissionState`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Idle,
    OnDelay,
    Active,
    Finished,
}

/// Externally visible mission state; ordinals are the STATE condition
/// thresholds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum MissionState {
    #[default]
    Idle = 0,
    Active = 1,
    Finished = 2,
}

impl From<Phase> for MissionState {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Idle => Self::Idle,
            Phase::OnDelay | Phase::Active => Self::Active,
            Phase::Finished => Self::Finished,
        }
    }
}

/// Phase durations resolved to whole scans at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissionTiming {
    /// 0 = no delay phase.
    pub delay_scans: u32,
    /// None = ACTIVE holds until reset.
    pub on_scans: Option<u32>,
}

impl MissionTiming {
    pub fn resolve(cfg: &MissionConfig, scan_interval_ms: u32) -> Self {
        Self {
            delay_scans: if cfg.delay_before_on == 0 {
                0
            } else {
                centi::duration_scans(cfg.delay_before_on, scan_interval_ms)
            },
            on_scans: if cfg.on_duration == 0 {
                None
            } else {
                Some(centi::duration_scans(cfg.on_duration, scan_interval_ms))
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MissionRuntime {
    /// Mission latch: set on ignition, cleared on completion/reset.
    pub logical_state: bool,
    /// True exactly while the ACTIVE phase runs.
    pub physical_state: bool,
    /// One-scan ignition pulse.
    pub trigger_flag: bool,
    /// Completed-cycle counter.
    pub current_value: u32,
    pub phase: Phase,
    phase_scans: u32,
    prev_set_ok: bool,
}

impl MissionRuntime {
    pub fn mission_state(&self) -> MissionState {
        self.phase.into()
    }

    fn abort_to_idle(&mut self) {
        self.logical_state = false;
        self.physical_state = false;
        self.trigger_flag = false;
        self.current_value = 0;
        self.phase = Phase::Idle;
        self.phase_scans = 0;
    }
}

// ───────────────────────────────────────────────────────────────
// Evaluation
// ───────────────────────────────────────────────────────────────

/// Run one scan of the mission machine.
pub fn evaluate(
    cfg: &MissionConfig,
    timing: &MissionTiming,
    rt: &mut MissionRuntime,
    set_ok: bool,
    reset_ok: bool,
) {
    let rising = set_ok && !rt.prev_set_ok;
    rt.prev_set_ok = set_ok;

    if reset_ok {
        rt.abort_to_idle();
        return;
    }

    // Ignition: only from a rearmable phase.
    let rearmable = matches!(rt.phase, Phase::Idle | Phase::Finished);
    rt.trigger_flag = rising && rearmable;
    if rt.trigger_flag {
        rt.logical_state = true;
        rt.current_value = 0;
        enter_run_phase(rt, timing, cfg.mode == MissionMode::Immediate);
    }

    // Gate loss aborts a running Gated mission in the same scan.
    if cfg.mode == MissionMode::Gated
        && matches!(rt.phase, Phase::OnDelay | Phase::Active)
        && !set_ok
    {
        rt.abort_to_idle();
        return;
    }

    // Phase progression: each scan in a timed phase counts once, the
    // entry scan included. A completed cycle always passes through the
    // delay phase, so the output drops for at least the boundary scan
    // even at zero delay.
    let mut cycle_boundary = false;
    match rt.phase {
        Phase::OnDelay => {
            rt.phase_scans += 1;
            if rt.phase_scans >= timing.delay_scans {
                rt.phase = Phase::Active;
                rt.phase_scans = 0;
            }
        }
        Phase::Active => {
            rt.phase_scans += 1;
            if let Some(on_scans) = timing.on_scans {
                if rt.phase_scans >= on_scans {
                    cycle_boundary = true;
                    rt.current_value = rt.current_value.saturating_add(1);
                    if cfg.repeat_count != 0 && rt.current_value >= cfg.repeat_count {
                        rt.logical_state = false;
                        rt.phase = Phase::Finished;
                        rt.phase_scans = 0;
                    } else {
                        // Repeat cycles always run the full delay,
                        // Immediate included.
                        enter_run_phase(rt, timing, false);
                    }
                }
            }
        }
        Phase::Idle | Phase::Finished => {}
    }

    rt.physical_state = rt.phase == Phase::Active && !cycle_boundary;
}

/// Enter ONDELAY, or ACTIVE directly when the delay is skipped.
fn enter_run_phase(rt: &mut MissionRuntime, timing: &MissionTiming, skip_delay: bool) {
    if skip_delay || timing.delay_scans == 0 {
        rt.phase = Phase::Active;
    } else {
        rt.phase = Phase::OnDelay;
    }
    rt.phase_scans = 0;
}
