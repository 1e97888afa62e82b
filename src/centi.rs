//! Fixed-point centiunit arithmetic.
//!
//! Every configuration numeric with decimal semantics is stored as an
//! unsigned 32-bit **centiunit**: `stored = display × 100`. The kernel
//! path never touches floating point; all intermediate products are
//! widened to u64/u128 and divided back down.

/// Scale factor between display units and stored centiunits.
pub const SCALE: u32 = 100;

/// Encode a display value given as whole units plus hundredths.
///
/// `encode(12, 34)` → `1234` (12.34). Hundredths above 99 carry into
/// the whole part. Saturates at `u32::MAX`.
pub const fn encode(whole: u32, hundredths: u32) -> u32 {
    match whole.checked_mul(SCALE) {
        Some(base) => base.saturating_add(hundredths),
        None => u32::MAX,
    }
}

/// Decode a stored centiunit back into `(whole, hundredths)`.
pub const fn decode(stored: u32) -> (u32, u32) {
    (stored / SCALE, stored % SCALE)
}

/// Centiunit multiplication: `a × b` where both carry the ×100 factor.
/// Returns `None` when the result does not fit a u32 centiunit.
pub fn mul(a: u32, b: u32) -> Option<u32> {
    let wide = (a as u64) * (b as u64) / SCALE as u64;
    u32::try_from(wide).ok()
}

/// Centiunit division: `a ÷ b`. Returns `None` on a zero divisor or
/// when the quotient does not fit a u32 centiunit.
pub fn div(a: u32, b: u32) -> Option<u32> {
    if b == 0 {
        return None;
    }
    let wide = (a as u64) * SCALE as u64 / (b as u64);
    u32::try_from(wide).ok()
}

/// Linear map of `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// Endpoints may be increasing or decreasing; `value` is assumed to be
/// already clamped into the input range. A degenerate input range maps
/// everything to `out_min`.
pub fn affine_map(value: u32, in_min: u32, in_max: u32, out_min: u32, out_max: u32) -> u32 {
    if in_max <= in_min {
        return out_min;
    }
    let in_delta = (in_max - in_min) as i64;
    let out_delta = out_max as i64 - out_min as i64;
    let offset = (value.clamp(in_min, in_max) - in_min) as i64;
    let mapped = out_min as i64 + offset * out_delta / in_delta;
    mapped.clamp(0, u32::MAX as i64) as u32
}

/// One EMA step: `(alpha · sample + (100 − alpha) · prev) / 100`.
///
/// `alpha` is a centiunit weight 0..=100; 100 passes the sample
/// through unfiltered.
pub fn ema_step(prev: u32, sample: u32, alpha: u32) -> u32 {
    let alpha = alpha.min(SCALE) as u64;
    let blended =
        (alpha * sample as u64 + (SCALE as u64 - alpha) * prev as u64) / SCALE as u64;
    blended as u32
}

/// Convert a duration-valued config field into whole scans.
///
/// Durations are quantized to the scan grid at commit time; the entry
/// scan counts toward the total, so a window of N scans spans exactly
/// N consecutive samples.
pub fn duration_scans(value: u32, scan_interval_ms: u32) -> u32 {
    if scan_interval_ms == 0 {
        return 1;
    }
    ((value + scan_interval_ms - 1) / scan_interval_ms).max(1)
}
