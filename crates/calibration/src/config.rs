//! Calibration configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Calibration configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub simple: SimpleCalibrationConfig,
    pub advanced: AdvancedCalibrationConfig,
    /// Where the advanced model is written after calibration
    pub snapshot_path: Option<PathBuf>,
}

/// Four-phase EAR/MAR calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleCalibrationConfig {
    pub eyes_open_s: f64,
    pub eyes_closed_s: f64,
    pub mouth_closed_s: f64,
    pub mouth_open_s: f64,
    /// Metrics poll period (milliseconds)
    pub poll_interval_ms: u64,
    /// Fraction of the closed→open gap where the threshold sits
    pub interpolation: f64,
}

impl Default for SimpleCalibrationConfig {
    fn default() -> Self {
        Self {
            eyes_open_s: 6.0,
            eyes_closed_s: 4.0,
            mouth_closed_s: 4.0,
            mouth_open_s: 4.0,
            poll_interval_ms: 50,
            interpolation: 0.6,
        }
    }
}

impl SimpleCalibrationConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1)).min(MAX_DURATION)
    }

    /// Short phases for quick checks
    pub fn quick() -> Self {
        Self {
            eyes_open_s: 2.0,
            eyes_closed_s: 2.0,
            mouth_closed_s: 2.0,
            mouth_open_s: 2.0,
            ..Default::default()
        }
    }
}

/// Three-state learned calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedCalibrationConfig {
    /// Duration of each cognitive-state phase (seconds)
    pub phase_duration_s: f64,
    /// Sampling period (seconds)
    pub sample_interval_s: f64,
    /// Scores are forced to zero this long after the profile is created (seconds)
    pub warmup_s: f64,
    /// Number of recent scores averaged by `score_state`
    pub score_window: usize,
    /// PERCLOS is ignored until this many samples back it
    pub min_perclos_samples: usize,
    /// MAR readings below this are treated as noise
    pub mar_noise_floor: f64,
}

impl Default for AdvancedCalibrationConfig {
    fn default() -> Self {
        Self {
            phase_duration_s: 600.0,
            sample_interval_s: 1.0,
            warmup_s: 5.0,
            score_window: 5,
            min_perclos_samples: 10,
            mar_noise_floor: 0.01,
        }
    }
}

impl AdvancedCalibrationConfig {
    pub fn phase_duration(&self) -> Duration {
        secs(self.phase_duration_s)
    }

    pub fn sample_interval(&self) -> Duration {
        secs(self.sample_interval_s)
    }

    pub fn warmup(&self) -> Duration {
        secs(self.warmup_s)
    }
}

/// Longest phase, poll or warm-up duration taken from configuration
const MAX_DURATION: Duration = Duration::from_secs(24 * 60 * 60);

/// Seconds to `Duration`: negative or NaN input is zero, anything longer
/// than [`MAX_DURATION`] (infinity included) is capped
pub(crate) fn secs(s: f64) -> Duration {
    if s.is_nan() || s <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(s)
        .unwrap_or(Duration::MAX)
        .min(MAX_DURATION)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secs_handles_out_of_range_input() {
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(-3.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(1e300), MAX_DURATION);
        assert_eq!(secs(f64::INFINITY), MAX_DURATION);
    }

    #[test]
    fn test_huge_intervals_are_capped() {
        let simple = SimpleCalibrationConfig {
            poll_interval_ms: u64::MAX,
            ..Default::default()
        };
        assert_eq!(simple.poll_interval(), MAX_DURATION);

        let advanced = AdvancedCalibrationConfig {
            sample_interval_s: f64::MAX,
            warmup_s: f64::INFINITY,
            ..Default::default()
        };
        assert_eq!(advanced.sample_interval(), MAX_DURATION);
        assert_eq!(advanced.warmup(), MAX_DURATION);
    }
}
