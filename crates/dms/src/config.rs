//! DMS configuration

use crate::perclos::PerclosConfig;
use crate::scoring::ScoringConfig;
use alerting::AlertConfig;
use calibration::CalibrationConfig;
use serde::{Deserialize, Serialize};

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Alert thresholds, debounce and cooldown
    pub alert: AlertConfig,

    /// PERCLOS rolling window
    pub perclos: PerclosConfig,

    /// PERCLOS percentage flagged as high
    pub perclos_high_pct: f64,

    /// Eye closure that counts as a microsleep (seconds)
    pub microsleep_duration_s: f64,

    /// Frame rate assumed until the source reports its own
    pub frame_rate: f64,

    /// Score smoothing, blend weights and history
    pub scoring: ScoringConfig,

    /// Calibration phases and snapshot location
    pub calibration: CalibrationConfig,
}

impl Default for DmsConfig {
    fn default() -> Self {
        let frame_rate = 20.0;
        Self {
            alert: AlertConfig::default().with_frame_rate(frame_rate),
            perclos: PerclosConfig::default(),
            perclos_high_pct: 1.5,
            microsleep_duration_s: 1.5,
            frame_rate,
            scoring: ScoringConfig::default(),
            calibration: CalibrationConfig::default(),
        }
    }
}

impl DmsConfig {
    /// Create strict config (lower thresholds)
    pub fn strict() -> Self {
        let mut config = Self::default();
        config.alert.ear_consec_frames = 10;
        config.alert.head_down_hold_s = 1.5;
        config.alert.cooldown_seconds = 3.0;
        config.microsleep_duration_s = 1.0;
        config
    }

    /// Create lenient config (higher thresholds)
    pub fn lenient() -> Self {
        let mut config = Self::default();
        config.alert.ear_consec_frames = 20;
        config.alert.head_down_hold_s = 3.0;
        config.alert.cooldown_seconds = 8.0;
        config.microsleep_duration_s = 2.0;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DmsConfig::default();
        assert_eq!(config.alert.thresholds.ear, 0.21);
        assert_eq!(config.alert.thresholds.mar, 0.60);
        assert_eq!(config.alert.thresholds.pitch, 30.0);
        assert_eq!(config.alert.mar_consec_frames, 12);
        assert_eq!(config.perclos.capacity(), 1200);
    }

    #[test]
    fn test_presets_ordered() {
        let strict = DmsConfig::strict();
        let lenient = DmsConfig::lenient();
        assert!(strict.alert.ear_consec_frames < lenient.alert.ear_consec_frames);
        assert!(strict.microsleep_duration_s < lenient.microsleep_duration_s);
    }
}
