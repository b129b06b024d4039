//! Metric normalizers
//!
//! Each maps a raw metric onto [0, 1] using fixed reference points. The
//! reference/bound pairs are never equal, so no division can degenerate.

/// EAR at which eyes count as fully open
pub const EAR_REF: f64 = 0.30;
/// EAR at which eyes count as fully closed
pub const EAR_MIN: f64 = 0.10;
/// MAR of a relaxed closed mouth
pub const MAR_REF: f64 = 0.30;
/// MAR of a full yawn
pub const MAR_MAX: f64 = 0.60;
pub const PERCLOS_MIN_PCT: f64 = 0.0;
pub const PERCLOS_MAX_PCT: f64 = 80.0;
pub const MICROSLEEP_MAX_COUNT: u32 = 5;
pub const PITCH_MAX_DEG: f64 = 20.0;

/// Clamp to [0, 1], mapping NaN to 0
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

pub fn normalize_ear(ear: f64) -> f64 {
    normalize_ear_with(ear, EAR_REF, EAR_MIN)
}

pub fn normalize_ear_with(ear: f64, reference: f64, min: f64) -> f64 {
    clamp_unit((reference - ear) / (reference - min))
}

pub fn normalize_mar(mar: f64) -> f64 {
    normalize_mar_with(mar, MAR_REF, MAR_MAX)
}

pub fn normalize_mar_with(mar: f64, reference: f64, max: f64) -> f64 {
    clamp_unit((mar - reference) / (max - reference))
}

/// 1.0 at or below `min`, 0.0 at or above `max`
pub fn normalize_perclos(perclos_pct: f64) -> f64 {
    normalize_perclos_with(perclos_pct, PERCLOS_MIN_PCT, PERCLOS_MAX_PCT)
}

pub fn normalize_perclos_with(perclos_pct: f64, min: f64, max: f64) -> f64 {
    1.0 - clamp_unit((perclos_pct - min) / (max - min))
}

pub fn normalize_micro(count: u32) -> f64 {
    normalize_micro_with(count, MICROSLEEP_MAX_COUNT)
}

pub fn normalize_micro_with(count: u32, max: u32) -> f64 {
    clamp_unit(count as f64 / max.max(1) as f64)
}

pub fn normalize_pitch(pitch_deg: f64) -> f64 {
    normalize_pitch_with(pitch_deg, PITCH_MAX_DEG)
}

pub fn normalize_pitch_with(pitch_deg: f64, max_deg: f64) -> f64 {
    clamp_unit(pitch_deg.abs() / max_deg)
}

/// Normalize into [0, 1] between two learned reference points, 0 if they coincide
pub fn normalize_between(value: f64, baseline: f64, target: f64) -> f64 {
    if target == baseline {
        return 0.0;
    }
    clamp_unit((value - baseline) / (target - baseline))
}
