//! Metric types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Metrics tracked by the fatigue engine, in canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Eye aspect ratio
    Ear,
    /// Mouth aspect ratio
    Mar,
    /// Percentage of eye closure over the rolling window
    Perclos,
    /// Head pitch in degrees
    Pitch,
}

impl Metric {
    /// All metrics in canonical order
    pub const ALL: [Metric; 4] = [Metric::Ear, Metric::Mar, Metric::Perclos, Metric::Pitch];

    /// Lowercase metric name as used in persisted snapshots
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Ear => "ear",
            Metric::Mar => "mar",
            Metric::Perclos => "perclos",
            Metric::Pitch => "pitch",
        }
    }

    /// Parse a snapshot metric name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_str() == name)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame's fused measurements
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub ear: f64,
    pub mar: f64,
    /// Head pitch relative to vertical, 0° = upright
    pub pitch_deg: f64,
    /// PERCLOS percentage (0-100)
    pub perclos_pct: f64,
}

impl MetricSample {
    pub fn new(ear: f64, mar: f64, pitch_deg: f64, perclos_pct: f64) -> Self {
        Self {
            ear,
            mar,
            pitch_deg,
            perclos_pct,
        }
    }

    /// Value of a single metric
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Ear => self.ear,
            Metric::Mar => self.mar,
            Metric::Perclos => self.perclos_pct,
            Metric::Pitch => self.pitch_deg,
        }
    }

    /// Copy with one metric replaced
    pub fn with(mut self, metric: Metric, value: f64) -> Self {
        match metric {
            Metric::Ear => self.ear = value,
            Metric::Mar => self.mar = value,
            Metric::Perclos => self.perclos_pct = value,
            Metric::Pitch => self.pitch_deg = value,
        }
        self
    }
}

/// Anything that can supply calibrated decision thresholds.
///
/// `None` means "not calibrated for this metric"; callers fall back to the
/// static configured default independently per metric.
pub trait ThresholdSource {
    fn ear_threshold(&self) -> Option<f64>;
    fn mar_threshold(&self) -> Option<f64>;
    fn pitch_threshold(&self) -> Option<f64>;
}

/// Effective decision thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSet {
    pub ear: f64,
    pub mar: f64,
    /// Degrees
    pub pitch: f64,
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            ear: 0.21,
            mar: 0.60,
            pitch: 30.0,
        }
    }
}

impl ThresholdSet {
    /// Resolve each threshold as "source value if present, else default"
    pub fn resolve<S: ThresholdSource + ?Sized>(source: &S, defaults: &ThresholdSet) -> Self {
        Self {
            ear: source.ear_threshold().unwrap_or(defaults.ear),
            mar: source.mar_threshold().unwrap_or(defaults.mar),
            pitch: source.pitch_threshold().unwrap_or(defaults.pitch),
        }
    }
}

impl ThresholdSource for ThresholdSet {
    fn ear_threshold(&self) -> Option<f64> {
        Some(self.ear)
    }

    fn mar_threshold(&self) -> Option<f64> {
        Some(self.mar)
    }

    fn pitch_threshold(&self) -> Option<f64> {
        Some(self.pitch)
    }
}
