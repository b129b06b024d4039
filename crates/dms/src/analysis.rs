//! DMS analysis results

use crate::scoring::FatigueScore;
use alerting::AlertKind;
use calibration::ProfileKind;
use feature_engine::MetricSample;
use serde::{Deserialize, Serialize};

/// Complete per-frame analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Whether a face was detected
    pub face_detected: bool,

    /// Metrics the detectors saw (substituted when no face was detected)
    pub metrics: MetricSample,

    /// PERCLOS at or above the configured display threshold
    pub perclos_high: bool,

    /// Microsleeps since the session started
    pub microsleep_count: u32,

    /// A microsleep episode started on this frame
    pub new_microsleep: bool,

    /// Fatigue score, risk and trend
    pub score: FatigueScore,

    /// Alerts emitted on this frame
    pub alerts: Vec<AlertKind>,

    /// Calibration profile used for this frame
    pub profile: ProfileKind,
}

impl FrameAnalysis {
    pub fn perclos_pct(&self) -> f64 {
        self.metrics.perclos_pct
    }
}
