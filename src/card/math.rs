//! MATH card evaluator: standard arithmetic pipeline and integer PID.
//!
//! All arithmetic is integer centiunit math (see [`crate::centi`]);
//! intermediate products are widened, never floated. Numeric domain
//! errors (divide by zero, POW overflow) apply the configured fallback
//! value, raise the card fault flag, and skip every remaining stage.
//!
//! Gating: the pipeline runs while `setOk && !resetOk`. A true reset
//! forces `currentValue ← fallbackValue`; a false set holds the last
//! value.

use serde::{Deserialize, Serialize};

use crate::card::condition::ConditionBlock;
use crate::centi;
use crate::config::{BindSource, Unit};

// ───────────────────────────────────────────────────────────────
// Configuration
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MathMode {
    StandardPipeline,
    #[serde(rename = "PID")]
    Pid,
}

/// Arithmetic operators of the standard pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Min,
    Max,
}

/// When the PID integral accumulator is cleared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegralResetPolicy {
    #[default]
    OnReset,
    OnSignChange,
    Never,
}

/// Standard pipeline stages in fixed order: arithmetic → rate limit →
/// clamp → scale → EMA.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardConfig {
    pub input_a: BindSource,
    pub input_b: BindSource,
    pub operator: MathOp,
    /// Max output slew in centiunits per second; 0 disables the stage.
    #[serde(default)]
    pub rate_limit: u32,
    /// Clamp stage disabled when `clamp_min >= clamp_max`.
    #[serde(default)]
    pub clamp_min: u32,
    #[serde(default)]
    pub clamp_max: u32,
    /// Scale stage maps the clamp range onto `[scale_min, scale_max]`;
    /// disabled when equal to the clamp range (or clamp disabled).
    #[serde(default)]
    pub scale_min: u32,
    #[serde(default)]
    pub scale_max: u32,
    /// Filter weight 0..=100; 100 disables smoothing.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: u32,
}

fn default_ema_alpha() -> u32 {
    100
}

/// PID loop parameters, gains in centiunits (150 = 1.50).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PidConfig {
    pub kp: u32,
    pub ki: u32,
    pub kd: u32,
    pub setpoint: BindSource,
    pub process_variable: BindSource,
    /// Output clamp; requires `output_min < output_max`.
    pub output_min: u32,
    pub output_max: u32,
    #[serde(default)]
    pub integral_reset: IntegralResetPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MathConfig {
    pub mode: MathMode,
    #[serde(default)]
    pub unit: Unit,
    /// Applied on reset and on any calculation fault.
    pub fallback_value: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<ConditionBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset: Option<ConditionBlock>,
    /// Present iff `mode == StandardPipeline`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard: Option<StandardConfig>,
    /// Present iff `mode == PID`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<PidConfig>,
}

// ───────────────────────────────────────────────────────────────
// Runtime
// ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MathRuntime {
    /// Final pipeline output / PID output, centiunits.
    pub current_value: u32,
    /// Arithmetic result before rate/clamp/scale/EMA stages.
    pub intermediate_value: u32,
    /// True when the last evaluated scan hit a calculation fault.
    pub fault: bool,
    integral: i64,
    prev_pv: Option<i64>,
    prev_err_sign: i8,
}

// ───────────────────────────────────────────────────────────────
// Standard pipeline
// ───────────────────────────────────────────────────────────────

/// Run one scan of the standard pipeline. `a`/`b` are the resolved
/// operand values (`None` when a referenced source is unavailable).
/// Returns true when a calculation fault occurred this scan.
pub fn evaluate_standard(
    cfg: &StandardConfig,
    fallback_value: u32,
    rt: &mut MathRuntime,
    a: Option<u32>,
    b: Option<u32>,
    set_ok: bool,
    reset_ok: bool,
    scan_interval_ms: u32,
) -> bool {
    if reset_ok {
        rt.current_value = fallback_value;
        rt.fault = false;
        return false;
    }
    if !set_ok {
        return false;
    }

    let result = match (a, b) {
        (Some(a), Some(b)) => apply_op(cfg.operator, a, b),
        _ => None,
    };
    let Some(result) = result else {
        rt.current_value = fallback_value;
        rt.intermediate_value = fallback_value;
        rt.fault = true;
        return true;
    };

    rt.intermediate_value = result;
    let mut value = result;

    if cfg.rate_limit > 0 {
        let max_delta =
            ((cfg.rate_limit as u64 * scan_interval_ms as u64) / 1000).min(u32::MAX as u64) as u32;
        let prev = rt.current_value;
        value = value.clamp(prev.saturating_sub(max_delta), prev.saturating_add(max_delta));
    }

    if cfg.clamp_min < cfg.clamp_max {
        value = value.clamp(cfg.clamp_min, cfg.clamp_max);
        let scale_enabled = !(cfg.scale_min == cfg.clamp_min && cfg.scale_max == cfg.clamp_max);
        if scale_enabled {
            value = centi::affine_map(value, cfg.clamp_min, cfg.clamp_max, cfg.scale_min, cfg.scale_max);
        }
    }

    if cfg.ema_alpha < 100 {
        value = centi::ema_step(rt.current_value, value, cfg.ema_alpha);
    }

    rt.current_value = value;
    rt.fault = false;
    false
}

fn apply_op(op: MathOp, a: u32, b: u32) -> Option<u32> {
    match op {
        MathOp::Add => a.checked_add(b),
        // The numeric domain is non-negative; subtraction floors at 0.
        MathOp::Sub => Some(a.saturating_sub(b)),
        MathOp::Mul => centi::mul(a, b),
        MathOp::Div => centi::div(a, b),
        MathOp::Mod => {
            if b == 0 {
                None
            } else {
                Some(a % b)
            }
        }
        MathOp::Pow => pow_centi(a, b),
        MathOp::Min => Some(a.min(b)),
        MathOp::Max => Some(a.max(b)),
    }
}

/// Centiunit exponentiation. The exponent must be a whole number
/// (stored value divisible by 100); fractional exponents and overflow
/// past u32 centiunits are domain faults.
fn pow_centi(base: u32, exponent: u32) -> Option<u32> {
    if exponent % centi::SCALE != 0 {
        return None;
    }
    let e = exponent / centi::SCALE;
    if e == 0 {
        return Some(centi::SCALE); // x^0 = 1.00
    }
    let mut acc: u128 = base as u128;
    for _ in 1..e {
        acc = acc.checked_mul(base as u128)? / centi::SCALE as u128;
        if acc > u32::MAX as u128 {
            return None;
        }
    }
    u32::try_from(acc).ok()
}

// ───────────────────────────────────────────────────────────────
// PID
// ───────────────────────────────────────────────────────────────

/// Run one scan of the PID loop. Derivative acts on the process
/// variable (not the error) so setpoint steps do not kick the output;
/// the integral uses back-calculation anti-windup against the output
/// clamp. Returns true when a calculation fault occurred this scan.
pub fn evaluate_pid(
    cfg: &PidConfig,
    fallback_value: u32,
    rt: &mut MathRuntime,
    setpoint: Option<u32>,
    process_variable: Option<u32>,
    set_ok: bool,
    reset_ok: bool,
    scan_interval_ms: u32,
) -> bool {
    if reset_ok {
        rt.current_value = fallback_value;
        rt.fault = false;
        if cfg.integral_reset == IntegralResetPolicy::OnReset {
            rt.integral = 0;
        }
        return false;
    }
    if !set_ok {
        return false;
    }

    let (Some(sp), Some(pv)) = (setpoint, process_variable) else {
        rt.current_value = fallback_value;
        rt.fault = true;
        return true;
    };

    let sp = sp as i64;
    let pv = pv as i64;
    let err = sp - pv;

    let sign = err.signum() as i8;
    if cfg.integral_reset == IntegralResetPolicy::OnSignChange
        && sign != 0
        && rt.prev_err_sign != 0
        && sign != rt.prev_err_sign
    {
        rt.integral = 0;
    }
    if sign != 0 {
        rt.prev_err_sign = sign;
    }

    // Integral accumulates centiunit·milliseconds.
    rt.integral += err * scan_interval_ms as i64;

    let p_term = cfg.kp as i64 * err / 100;
    let i_term = cfg.ki as i64 * rt.integral / (100 * 1000);
    let d_pv = pv - rt.prev_pv.unwrap_or(pv);
    rt.prev_pv = Some(pv);
    let d_term = if scan_interval_ms > 0 {
        -(cfg.kd as i64 * d_pv * 1000) / (100 * scan_interval_ms as i64)
    } else {
        0
    };

    let unclamped = p_term + i_term + d_term;
    let clamped = unclamped.clamp(cfg.output_min as i64, cfg.output_max as i64);

    if unclamped != clamped && cfg.ki > 0 {
        // Back-calculate the excess out of the accumulator.
        let excess = unclamped - clamped;
        rt.integral -= excess * 100 * 1000 / cfg.ki as i64;
    }

    rt.current_value = clamped as u32;
    rt.fault = false;
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn standard(op: MathOp) -> StandardConfig {
        StandardConfig {
            input_a: BindSource::Constant { value: 0 },
            input_b: BindSource::Constant { value: 0 },
            operator: op,
            rate_limit: 0,
            clamp_min: 0,
            clamp_max: 0,
            scale_min: 0,
            scale_max: 0,
            ema_alpha: 100,
        }
    }

    fn pid() -> PidConfig {
        PidConfig {
            kp: 200, // 2.00
            ki: 0,
            kd: 0,
            setpoint: BindSource::Constant { value: 0 },
            process_variable: BindSource::Constant { value: 0 },
            output_min: 0,
            output_max: 10_000,
            integral_reset: IntegralResetPolicy::OnReset,
        }
    }

    #[test]
    fn div_by_zero_applies_fallback_and_faults() {
        let mut cfg = standard(MathOp::Div);
        // Stages after the fault must not run.
        cfg.clamp_min = 0;
        cfg.clamp_max = 100;
        let mut rt = MathRuntime::default();

        let faulted =
            evaluate_standard(&cfg, 777, &mut rt, Some(1000), Some(0), true, false, 10);
        assert!(faulted);
        assert!(rt.fault);
        assert_eq!(rt.current_value, 777);
    }

    #[test]
    fn arithmetic_operators_in_centiunit_space() {
        let cases = [
            (MathOp::Add, 200, 350, Some(550)),
            (MathOp::Sub, 500, 200, Some(300)),
            (MathOp::Sub, 200, 500, Some(0)), // floors at zero
            (MathOp::Mul, 200, 350, Some(700)),
            (MathOp::Div, 1000, 400, Some(250)),
            (MathOp::Mod, 1000, 300, Some(100)),
            (MathOp::Mod, 1000, 0, None),
            (MathOp::Min, 200, 350, Some(200)),
            (MathOp::Max, 200, 350, Some(350)),
        ];
        for (op, a, b, expected) in cases {
            assert_eq!(apply_op(op, a, b), expected, "{op:?}");
        }
    }

    #[test]
    fn pow_whole_exponents_only() {
        // 2.00 ^ 3 = 8.00
        assert_eq!(pow_centi(200, 300), Some(800));
        // x ^ 0 = 1.00
        assert_eq!(pow_centi(500, 0), Some(100));
        // x ^ 1 = x
        assert_eq!(pow_centi(12_345, 100), Some(12_345));
        // Fractional exponent: domain fault.
        assert_eq!(pow_centi(200, 150), None);
        // Overflow: domain fault.
        assert_eq!(pow_centi(1_000_000, 800), None);
    }

    #[test]
    fn fault_skips_downstream_stages() {
        let mut cfg = standard(MathOp::Div);
        cfg.ema_alpha = 10; // would smooth heavily if it ran
        let mut rt = MathRuntime::default();
        rt.current_value = 5000;

        evaluate_standard(&cfg, 777, &mut rt, Some(100), Some(0), true, false, 10);
        // Fallback applied verbatim, not blended by the EMA stage.
        assert_eq!(rt.current_value, 777);
    }

    #[test]
    fn reset_forces_fallback_and_clears_fault() {
        let cfg = standard(MathOp::Add);
        let mut rt = MathRuntime {
            fault: true,
            current_value: 123,
            ..Default::default()
        };
        evaluate_standard(&cfg, 777, &mut rt, Some(1), Some(1), true, true, 10);
        assert_eq!(rt.current_value, 777);
        assert!(!rt.fault);
    }

    #[test]
    fn hold_when_set_not_ok() {
        let cfg = standard(MathOp::Add);
        let mut rt = MathRuntime::default();
        evaluate_standard(&cfg, 0, &mut rt, Some(100), Some(100), true, false, 10);
        assert_eq!(rt.current_value, 200);

        evaluate_standard(&cfg, 0, &mut rt, Some(900), Some(900), false, false, 10);
        assert_eq!(rt.current_value, 200);
    }

    #[test]
    fn rate_limit_bounds_slew() {
        let mut cfg = standard(MathOp::Add);
        cfg.rate_limit = 10_000; // 100.00 units/s → 100 centi per 10 ms scan
        let mut rt = MathRuntime::default();

        evaluate_standard(&cfg, 0, &mut rt, Some(5000), Some(0), true, false, 10);
        assert_eq!(rt.current_value, 100);
        evaluate_standard(&cfg, 0, &mut rt, Some(5000), Some(0), true, false, 10);
        assert_eq!(rt.current_value, 200);
        assert_eq!(rt.intermediate_value, 5000);
    }

    #[test]
    fn clamp_and_scale_stages() {
        let mut cfg = standard(MathOp::Add);
        cfg.clamp_min = 0;
        cfg.clamp_max = 1000;
        cfg.scale_min = 0;
        cfg.scale_max = 10_000;
        let mut rt = MathRuntime::default();

        evaluate_standard(&cfg, 0, &mut rt, Some(400), Some(100), true, false, 10);
        // 500 clamped (no-op) then scaled ×10.
        assert_eq!(rt.current_value, 5000);

        evaluate_standard(&cfg, 0, &mut rt, Some(4000), Some(0), true, false, 10);
        // 4000 clamps to 1000 → scales to full range.
        assert_eq!(rt.current_value, 10_000);
    }

    #[test]
    fn degenerate_clamp_disables_clamp_and_scale() {
        let mut cfg = standard(MathOp::Add);
        cfg.clamp_min = 500;
        cfg.clamp_max = 500;
        cfg.scale_min = 0;
        cfg.scale_max = 100;
        let mut rt = MathRuntime::default();

        evaluate_standard(&cfg, 0, &mut rt, Some(4000), Some(0), true, false, 10);
        assert_eq!(rt.current_value, 4000);
    }

    #[test]
    fn ema_stage_smooths_output() {
        let mut cfg = standard(MathOp::Add);
        cfg.ema_alpha = 50;
        let mut rt = MathRuntime::default();

        evaluate_standard(&cfg, 0, &mut rt, Some(2000), Some(0), true, false, 10);
        assert_eq!(rt.current_value, 1000);
        evaluate_standard(&cfg, 0, &mut rt, Some(2000), Some(0), true, false, 10);
        assert_eq!(rt.current_value, 1500);
    }

    #[test]
    fn missing_operand_is_a_fault() {
        let cfg = standard(MathOp::Add);
        let mut rt = MathRuntime::default();
        let faulted = evaluate_standard(&cfg, 42, &mut rt, None, Some(1), true, false, 10);
        assert!(faulted);
        assert_eq!(rt.current_value, 42);
    }

    // ── PID ───────────────────────────────────────────────────

    #[test]
    fn pid_proportional_step() {
        let cfg = pid();
        let mut rt = MathRuntime::default();
        // err = 10.00, kp = 2.00 → out = 20.00
        evaluate_pid(&cfg, 0, &mut rt, Some(2000), Some(1000), true, false, 10);
        assert_eq!(rt.current_value, 2000);
    }

    #[test]
    fn pid_output_clamped() {
        let mut cfg = pid();
        cfg.kp = 100_000;
        let mut rt = MathRuntime::default();
        evaluate_pid(&cfg, 0, &mut rt, Some(10_000), Some(0), true, false, 10);
        assert_eq!(rt.current_value, cfg.output_max);
    }

    #[test]
    fn pid_integral_accumulates() {
        let mut cfg = pid();
        cfg.kp = 0;
        cfg.ki = 100; // 1.00
        let mut rt = MathRuntime::default();

        evaluate_pid(&cfg, 0, &mut rt, Some(2000), Some(1000), true, false, 1000);
        let first = rt.current_value;
        evaluate_pid(&cfg, 0, &mut rt, Some(2000), Some(1000), true, false, 1000);
        assert!(rt.current_value > first, "integral must accumulate");
    }

    #[test]
    fn pid_anti_windup_recovers_quickly() {
        let mut cfg = pid();
        cfg.kp = 0;
        cfg.ki = 100;
        cfg.output_max = 500;
        let mut rt = MathRuntime::default();

        // Saturate hard for many scans.
        for _ in 0..100 {
            evaluate_pid(&cfg, 0, &mut rt, Some(10_000), Some(0), true, false, 1000);
            assert_eq!(rt.current_value, 500);
        }
        // With back-calculation the accumulator tracks the clamp, so a
        // reversed error pulls the output off the rail immediately.
        evaluate_pid(&cfg, 0, &mut rt, Some(0), Some(10_000), true, false, 1000);
        assert!(rt.current_value < 500);
    }

    #[test]
    fn pid_derivative_on_pv_ignores_setpoint_steps() {
        let mut cfg = pid();
        cfg.kp = 0;
        cfg.kd = 100;
        cfg.output_min = 0;
        cfg.output_max = 10_000;
        let mut rt = MathRuntime::default();

        evaluate_pid(&cfg, 0, &mut rt, Some(1000), Some(500), true, false, 100);
        let before = rt.current_value;
        // Setpoint step with a flat PV: derivative term stays zero.
        evaluate_pid(&cfg, 0, &mut rt, Some(9000), Some(500), true, false, 100);
        assert_eq!(rt.current_value, before);

        // A rising PV produces a negative (braking) derivative.
        evaluate_pid(&cfg, 0, &mut rt, Some(9000), Some(1500), true, false, 100);
        assert_eq!(rt.current_value, 0); // clamped at output_min
    }

    #[test]
    fn pid_reset_applies_fallback_and_policy() {
        let mut cfg = pid();
        cfg.ki = 100;
        let mut rt = MathRuntime::default();
        evaluate_pid(&cfg, 0, &mut rt, Some(2000), Some(0), true, false, 1000);
        assert!(rt.integral > 0);

        evaluate_pid(&cfg, 777, &mut rt, Some(2000), Some(0), true, true, 1000);
        assert_eq!(rt.current_value, 777);
        assert_eq!(rt.integral, 0);
    }

    #[test]
    fn pid_never_policy_keeps_integral_through_reset() {
        let mut cfg = pid();
        cfg.ki = 100;
        cfg.integral_reset = IntegralResetPolicy::Never;
        let mut rt = MathRuntime::default();
        evaluate_pid(&cfg, 0, &mut rt, Some(2000), Some(0), true, false, 1000);
        let integral = rt.integral;

        evaluate_pid(&cfg, 777, &mut rt, Some(2000), Some(0), true, true, 1000);
        assert_eq!(rt.integral, integral);
    }

    #[test]
    fn pid_sign_change_clears_integral() {
        let mut cfg = pid();
        cfg.kp = 0;
        cfg.ki = 100;
        cfg.integral_reset = IntegralResetPolicy::OnSignChange;
        let mut rt = MathRuntime::default();

        for _ in 0..5 {
            evaluate_pid(&cfg, 0, &mut rt, Some(2000), Some(0), true, false, 1000);
        }
        assert!(rt.integral > 0);

        // Error flips negative: accumulator clears before integrating.
        evaluate_pid(&cfg, 0, &mut rt, Some(0), Some(2000), true, false, 1000);
        assert!(rt.integral <= 0);
    }
}
