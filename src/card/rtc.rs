//! Real-time clock schedule evaluator.
//!
//! A trigger fires when every non-wildcard schedule field matches the
//! wall clock and no window is active; the card then holds
//! `logicalState = true` for `triggerDuration` seconds. Matches inside
//! an active window are ignored (the window is neither restarted nor
//! extended). The schedule itself is stateless — the only runtime is
//! the window end and a cached next-occurrence.
//!
//! When the system clock service reports anything but SYNCED the card
//! faults and latches `logicalState = false`; calendar matching
//! against an untrusted clock would fire at arbitrary times.

use chrono::{DateTime, Datelike, Timelike};
use serde::{Deserialize, Serialize};

use crate::card::condition::ConditionBlock;
use crate::ports::{SyncState, WallClock};

const DAY_SECS: u64 = 86_400;
/// Next-occurrence search horizon in days. A schedule with a fixed
/// year/month/day that never matches again resolves to "no next
/// start" once the horizon is exhausted.
const SEARCH_HORIZON_DAYS: u64 = 366 * 5;

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

/// Calendar match pattern. Hour/minute/second are required; the rest
/// are wildcards when absent. Weekday is ISO: 1 = Monday .. 7 = Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day: Option<u8>,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weekday: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RtcConfig {
    pub schedule: Schedule,
    /// Window length in seconds (schedule granularity is seconds).
    pub trigger_duration: u32,
    /// Schema placeholders: RTC is never gated. Presence is a
    /// validation error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<ConditionBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<ConditionBlock>,
}

// ───────────────────────────────────────────────────────────────
// Runtime
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RtcRuntime {
    pub logical_state: bool,
    /// Seconds until the next window opens; 0 when unknown.
    pub time_until_next_start_sec: u64,
    /// Seconds until the current (or next) window closes; 0 when unknown.
    pub time_until_next_end_sec: u64,
    /// Epoch second at which the active window ends.
    active_until_sec: u64,
    /// Cached next match, invalidated once it passes.
    next_start_cache: Option<u64>,
}

// ───────────────────────────────────────────────────────────────
// Evaluation
// ───────────────────────────────────────────────────────────────

/// Run one scan. Returns true when the card faulted on an unsynced
/// clock (the caller escalates health and records the fault).
pub fn evaluate(cfg: &RtcConfig, rt: &mut RtcRuntime, clock: WallClock) -> bool {
    if clock.sync != SyncState::Synced {
        rt.logical_state = false;
        rt.time_until_next_start_sec = 0;
        rt.time_until_next_end_sec = 0;
        rt.next_start_cache = None;
        return true;
    }

    let now = clock.epoch_sec;
    let window_active = now < rt.active_until_sec;

    let mut fired = false;
    if !window_active && matches(&cfg.schedule, now) {
        rt.active_until_sec = now + cfg.trigger_duration as u64;
        rt.next_start_cache = None;
        fired = true;
    }

    rt.logical_state = fired || now < rt.active_until_sec;

    // Refresh the next-occurrence cache once the cached instant passes.
    if rt.next_start_cache.map_or(true, |t| t <= now) {
        rt.next_start_cache = next_match(&cfg.schedule, now);
    }
    rt.time_until_next_start_sec = rt.next_start_cache.map_or(0, |t| t - now);
    rt.time_until_next_end_sec = if now < rt.active_until_sec {
        rt.active_until_sec - now
    } else {
        rt.next_start_cache
            .map_or(0, |t| t + cfg.trigger_duration as u64 - now)
    };

    false
}

/// Whether every non-wildcard field matches the given epoch second.
fn matches(schedule: &Schedule, epoch_sec: u64) -> bool {
    let Some(dt) = DateTime::from_timestamp(epoch_sec as i64, 0) else {
        return false;
    };
    if dt.hour() != schedule.hour as u32
        || dt.minute() != schedule.minute as u32
        || dt.second() != schedule.second as u32
    {
        return false;
    }
    if let Some(year) = schedule.year {
        if dt.year() != year as i32 {
            return false;
        }
    }
    if let Some(month) = schedule.month {
        if dt.month() != month as u32 {
            return false;
        }
    }
    if let Some(day) = schedule.day {
        if dt.day() != day as u32 {
            return false;
        }
    }
    if let Some(weekday) = schedule.weekday {
        if dt.weekday().number_from_monday() != weekday as u32 {
            return false;
        }
    }
    true
}

/// Smallest matching instant strictly after `now`, within the search
/// horizon. The time-of-day is fixed, so there is at most one
/// candidate per day.
fn next_match(schedule: &Schedule, now: u64) -> Option<u64> {
    let tod = schedule.hour as u64 * 3600 + schedule.minute as u64 * 60 + schedule.second as u64;
    let today = now / DAY_SECS;
    for day in 0..SEARCH_HORIZON_DAYS {
        let candidate = (today + day) * DAY_SECS + tod;
        if candidate > now && matches(schedule, candidate) {
            return Some(candidate);
        }
    }
    None
}
