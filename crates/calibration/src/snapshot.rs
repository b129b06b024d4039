//! Persisted advanced calibration model
//!
//! JSON document of the form
//! `{"thresholds": {metric: {"enter_hi", "exit_lo"}}, "weights": {metric: w},
//! "metrics_names": [...], "pitch_baseline": f}`. `pitch_baseline` is
//! optional so documents written without it still load.

use crate::advanced::{LearnedModel, ThresholdPair};
use crate::CalibrationError;
use feature_engine::Metric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::info;

/// Allowed drift of the stored weights from a unit sum
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Serializable snapshot of an advanced profile's learned model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSnapshot {
    pub thresholds: BTreeMap<String, ThresholdPair>,
    pub weights: BTreeMap<String, f64>,
    pub metrics_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pitch_baseline: Option<f64>,
}

impl ProfileSnapshot {
    pub(crate) fn from_model(model: &LearnedModel, pitch_baseline: Option<f64>) -> Self {
        Self {
            thresholds: model
                .thresholds
                .iter()
                .map(|(metric, pair)| (metric.as_str().to_string(), *pair))
                .collect(),
            weights: model
                .weights
                .iter()
                .map(|(metric, w)| (metric.as_str().to_string(), *w))
                .collect(),
            metrics_names: model.metrics.iter().map(|m| m.as_str().to_string()).collect(),
            pitch_baseline,
        }
    }

    /// Validate and convert into a scoring model
    pub(crate) fn to_model(&self) -> Result<LearnedModel, CalibrationError> {
        if self.metrics_names.is_empty() {
            return Err(CalibrationError::Snapshot("metrics_names is empty".into()));
        }

        let mut metrics = Vec::with_capacity(self.metrics_names.len());
        let mut thresholds = BTreeMap::new();
        let mut weights = BTreeMap::new();

        for name in &self.metrics_names {
            let metric = Metric::from_name(name)
                .ok_or_else(|| CalibrationError::Snapshot(format!("unknown metric '{}'", name)))?;
            if metrics.contains(&metric) {
                return Err(CalibrationError::Snapshot(format!("duplicate metric '{}'", name)));
            }

            let pair = self
                .thresholds
                .get(name)
                .ok_or_else(|| CalibrationError::Snapshot(format!("no thresholds for '{}'", name)))?;
            if !pair.enter_hi.is_finite() || !pair.exit_lo.is_finite() {
                return Err(CalibrationError::Snapshot(format!("non-finite thresholds for '{}'", name)));
            }

            let weight = *self
                .weights
                .get(name)
                .ok_or_else(|| CalibrationError::Snapshot(format!("no weight for '{}'", name)))?;
            if !weight.is_finite() || weight < 0.0 {
                return Err(CalibrationError::Snapshot(format!("invalid weight {} for '{}'", weight, name)));
            }

            metrics.push(metric);
            thresholds.insert(metric, *pair);
            weights.insert(metric, weight);
        }

        let total: f64 = weights.values().sum();
        if total <= 0.0 || (total - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(CalibrationError::Snapshot(format!("weights sum to {}, expected 1", total)));
        }

        if let Some(baseline) = self.pitch_baseline {
            if !baseline.is_finite() {
                return Err(CalibrationError::Snapshot("non-finite pitch_baseline".into()));
            }
        }

        Ok(LearnedModel {
            thresholds,
            weights,
            metrics,
        })
    }

    pub fn to_json(&self) -> Result<String, CalibrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CalibrationError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        info!("Calibration snapshot saved to {}", path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, CalibrationError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
