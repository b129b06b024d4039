//! Advanced three-state calibration
//!
//! Samples the full metric vector while the driver is alert, moderately tired
//! and tired. Each metric gets a threshold pair (moderate and alert means) and
//! a weight proportional to how well it separates tired from alert, measured
//! in pooled standard deviations. The resulting model scores live metric
//! vectors in [0, 1].

use crate::collector::PhaseCollector;
use crate::config::AdvancedCalibrationConfig;
use crate::snapshot::ProfileSnapshot;
use crate::CalibrationError;
use feature_engine::normalize::normalize_between;
use feature_engine::{mean, Metric, MetricSample, StatisticalFeatures, ThresholdSource};
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Driver state sampled during advanced calibration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CognitiveState {
    Alert,
    Moderate,
    Tired,
}

impl CognitiveState {
    pub const ORDER: [CognitiveState; 3] = [
        CognitiveState::Alert,
        CognitiveState::Moderate,
        CognitiveState::Tired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CognitiveState::Alert => "alert",
            CognitiveState::Moderate => "moderate",
            CognitiveState::Tired => "tired",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CognitiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-metric threshold pair.
///
/// The names are directional only: scoring normalizes between
/// `min(enter_hi, exit_lo)` and `max(enter_hi, exit_lo)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    /// Mean of the moderate-state samples
    pub enter_hi: f64,
    /// Mean of the alert-state samples
    pub exit_lo: f64,
}

impl ThresholdPair {
    fn bounds(&self) -> (f64, f64) {
        (self.enter_hi.min(self.exit_lo), self.enter_hi.max(self.exit_lo))
    }
}

/// Thresholds and weights learned from calibration samples
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LearnedModel {
    pub(crate) thresholds: BTreeMap<Metric, ThresholdPair>,
    pub(crate) weights: BTreeMap<Metric, f64>,
    /// Metrics that take part in scoring, in snapshot order
    pub(crate) metrics: Vec<Metric>,
}

/// Advanced calibration profile with its learned scoring function
#[derive(Debug)]
pub struct AdvancedProfile {
    config: AdvancedCalibrationConfig,
    samples: [Vec<MetricSample>; 3],
    model: Option<LearnedModel>,
    pitch_baseline: f64,
    created_at: Instant,
    recent_scores: Mutex<RingBuffer<f64>>,
}

impl Clone for AdvancedProfile {
    fn clone(&self) -> Self {
        let recent = self
            .recent_scores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Self {
            config: self.config.clone(),
            samples: self.samples.clone(),
            model: self.model.clone(),
            pitch_baseline: self.pitch_baseline,
            created_at: self.created_at,
            recent_scores: Mutex::new(recent),
        }
    }
}

impl AdvancedProfile {
    /// Empty profile; the warm-up period starts at `now`
    pub fn new(config: AdvancedCalibrationConfig, now: Instant) -> Self {
        let window = config.score_window.max(1);
        Self {
            config,
            samples: Default::default(),
            model: None,
            pitch_baseline: 0.0,
            created_at: now,
            recent_scores: Mutex::new(RingBuffer::new(window)),
        }
    }

    /// Rebuild a scoring profile from a persisted snapshot
    pub fn from_snapshot(
        snapshot: &ProfileSnapshot,
        config: AdvancedCalibrationConfig,
        now: Instant,
    ) -> Result<Self, CalibrationError> {
        let mut profile = Self::new(config, now);
        profile.apply_snapshot(snapshot)?;
        Ok(profile)
    }

    /// Append samples collected for `state`
    pub fn record(&mut self, state: CognitiveState, samples: impl IntoIterator<Item = MetricSample>) {
        self.samples[state.index()].extend(samples);
    }

    pub fn samples(&self, state: CognitiveState) -> &[MetricSample] {
        &self.samples[state.index()]
    }

    /// Learn thresholds, weights and the pitch baseline from the samples.
    ///
    /// Every state needs at least one sample; otherwise the model is left
    /// unset and scoring falls back to the static blend.
    pub fn compute_thresholds_and_weights(&mut self) -> Result<(), CalibrationError> {
        if let Some(empty) = CognitiveState::ORDER
            .into_iter()
            .find(|state| self.samples(*state).is_empty())
        {
            warn!("No samples for state {}, advanced model not computed", empty);
            self.model = None;
            return Err(CalibrationError::InsufficientSamples(format!(
                "no samples collected for state {}",
                empty
            )));
        }

        let mut thresholds = BTreeMap::new();
        let mut separations = Vec::with_capacity(Metric::ALL.len());

        for metric in Metric::ALL {
            let alert = self.values(CognitiveState::Alert, metric);
            let moderate = self.values(CognitiveState::Moderate, metric);
            let tired = self.values(CognitiveState::Tired, metric);

            thresholds.insert(
                metric,
                ThresholdPair {
                    enter_hi: mean(&moderate),
                    exit_lo: mean(&alert),
                },
            );

            let mut pooled = tired.clone();
            pooled.extend_from_slice(&alert);
            let spread = StatisticalFeatures::compute(&pooled).safe_std_dev();
            let separation = (mean(&tired) - mean(&alert)).abs() / spread;
            separations.push(if separation.is_finite() { separation } else { 0.0 });
        }

        let total: f64 = separations.iter().sum();
        let weights = if total > 0.0 && total.is_finite() {
            Metric::ALL
                .into_iter()
                .zip(separations)
                .map(|(metric, s)| (metric, s / total))
                .collect()
        } else {
            warn!("Calibration states are indistinguishable, using uniform weights");
            let uniform = 1.0 / Metric::ALL.len() as f64;
            Metric::ALL.into_iter().map(|metric| (metric, uniform)).collect()
        };

        self.pitch_baseline = mean(&self.values(CognitiveState::Alert, Metric::Pitch));
        self.model = Some(LearnedModel {
            thresholds,
            weights,
            metrics: Metric::ALL.to_vec(),
        });
        self.clear_scores();

        info!(
            "Advanced thresholds and weights computed, pitch baseline {:.2}",
            self.pitch_baseline
        );
        Ok(())
    }

    /// Finite values of `metric` recorded for `state`
    fn values(&self, state: CognitiveState, metric: Metric) -> Vec<f64> {
        self.samples(state)
            .iter()
            .map(|s| s.get(metric))
            .filter(|v| v.is_finite())
            .collect()
    }

    /// Thresholds and weights are both available
    pub fn has_model(&self) -> bool {
        self.model
            .as_ref()
            .is_some_and(|m| !m.thresholds.is_empty() && !m.weights.is_empty())
    }

    pub fn threshold(&self, metric: Metric) -> Option<ThresholdPair> {
        self.model.as_ref()?.thresholds.get(&metric).copied()
    }

    pub fn weight(&self, metric: Metric) -> Option<f64> {
        self.model.as_ref()?.weights.get(&metric).copied()
    }

    pub fn weights(&self) -> BTreeMap<Metric, f64> {
        self.model.as_ref().map(|m| m.weights.clone()).unwrap_or_default()
    }

    pub fn thresholds(&self) -> BTreeMap<Metric, ThresholdPair> {
        self.model.as_ref().map(|m| m.thresholds.clone()).unwrap_or_default()
    }

    pub fn pitch_baseline(&self) -> f64 {
        self.pitch_baseline
    }

    pub fn config(&self) -> &AdvancedCalibrationConfig {
        &self.config
    }

    /// Score a live metric vector in [0, 1].
    ///
    /// `perclos_samples` is the number of samples backing the PERCLOS value.
    /// Returns 0.0 during warm-up and without a model; otherwise the mean of
    /// the last `score_window` scores.
    pub fn score_state(&self, sample: &MetricSample, perclos_samples: usize, now: Instant) -> f64 {
        if now.saturating_duration_since(self.created_at) < self.config.warmup() {
            return 0.0;
        }
        let Some(model) = self.model.as_ref() else {
            return 0.0;
        };

        let mut score = 0.0;
        for metric in &model.metrics {
            let (Some(pair), Some(weight)) = (model.thresholds.get(metric), model.weights.get(metric)) else {
                continue;
            };
            let value = self.adjust(*metric, sample.get(*metric), perclos_samples);
            let (baseline, target) = pair.bounds();
            score += weight * normalize_between(value, baseline, target);
        }
        if !score.is_finite() {
            debug!("Non-finite advanced score, clamping to zero");
            score = 0.0;
        }

        let mut recent = self
            .recent_scores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        recent.push(score);
        recent.iter().sum::<f64>() / recent.len() as f64
    }

    fn adjust(&self, metric: Metric, value: f64, perclos_samples: usize) -> f64 {
        match metric {
            Metric::Pitch => (value - self.pitch_baseline).max(0.0),
            Metric::Perclos if perclos_samples < self.config.min_perclos_samples => 0.0,
            Metric::Perclos => value.min(100.0),
            Metric::Mar if value < self.config.mar_noise_floor => 0.0,
            _ => value,
        }
    }

    fn clear_scores(&self) {
        self.recent_scores
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Serializable copy of the learned model
    pub fn to_snapshot(&self) -> Result<ProfileSnapshot, CalibrationError> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| CalibrationError::InsufficientSamples("no learned model to export".into()))?;
        Ok(ProfileSnapshot::from_model(model, Some(self.pitch_baseline)))
    }

    /// Replace the learned model with a snapshot's.
    ///
    /// The pitch baseline comes from the snapshot when it carries one,
    /// otherwise from the alert-state samples held by this profile.
    /// On error the current model is kept.
    pub fn apply_snapshot(&mut self, snapshot: &ProfileSnapshot) -> Result<(), CalibrationError> {
        let model = snapshot.to_model()?;
        self.pitch_baseline = match snapshot.pitch_baseline {
            Some(baseline) => baseline,
            None => mean(&self.values(CognitiveState::Alert, Metric::Pitch)),
        };
        self.model = Some(model);
        self.clear_scores();
        info!(
            "Advanced model loaded for {} metrics, pitch baseline {:.2}",
            snapshot.metrics_names.len(),
            self.pitch_baseline
        );
        Ok(())
    }

    /// Drop samples and model, restarting the warm-up at `now`
    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(self.config.clone(), now);
    }
}

/// Alert thresholds derived from the learned model use each metric's `enter_hi`
impl ThresholdSource for AdvancedProfile {
    fn ear_threshold(&self) -> Option<f64> {
        self.threshold(Metric::Ear).map(|t| t.enter_hi)
    }

    fn mar_threshold(&self) -> Option<f64> {
        self.threshold(Metric::Mar).map(|t| t.enter_hi)
    }

    fn pitch_threshold(&self) -> Option<f64> {
        self.threshold(Metric::Pitch).map(|t| t.enter_hi)
    }
}

/// An advanced calibration session, advanced by `tick`
#[derive(Debug)]
pub struct AdvancedCalibration {
    profile: AdvancedProfile,
    collector: PhaseCollector<CognitiveState, MetricSample>,
    next: usize,
}

impl AdvancedCalibration {
    pub fn new(config: AdvancedCalibrationConfig, now: Instant) -> Self {
        Self {
            collector: PhaseCollector::new(config.sample_interval()),
            profile: AdvancedProfile::new(config, now),
            next: 0,
        }
    }

    pub fn next_phase(&self) -> Option<CognitiveState> {
        CognitiveState::ORDER.get(self.next).copied()
    }

    /// Start sampling the next cognitive state
    pub fn start_next_phase(&mut self, now: Instant) -> Result<CognitiveState, CalibrationError> {
        let state = self.next_phase().ok_or(CalibrationError::NoPendingPhase)?;
        let duration = self.profile.config().phase_duration();
        self.collector.start(state, duration, now)?;
        self.next += 1;
        Ok(state)
    }

    /// Feed the current metrics; returns the state whose phase just completed
    pub fn tick(&mut self, now: Instant, metrics: Option<&MetricSample>) -> Option<CognitiveState> {
        let (state, samples) = self.collector.tick(now, metrics.copied())?;
        self.profile.record(state, samples);
        Some(state)
    }

    pub fn is_collecting(&self) -> bool {
        self.collector.is_collecting()
    }

    pub fn is_complete(&self) -> bool {
        self.next_phase().is_none() && !self.collector.is_collecting()
    }

    pub fn profile(&self) -> &AdvancedProfile {
        &self.profile
    }

    /// Learn the model and hand over the profile
    pub fn finish(mut self) -> Result<AdvancedProfile, CalibrationError> {
        self.profile.compute_thresholds_and_weights()?;
        Ok(self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    fn sample(ear: f64, mar: f64, perclos: f64, pitch: f64) -> MetricSample {
        MetricSample::new(ear, mar, pitch, perclos)
    }

    fn trained(now: Instant) -> AdvancedProfile {
        let mut profile = AdvancedProfile::new(AdvancedCalibrationConfig::default(), now);
        profile.record(
            CognitiveState::Alert,
            [sample(0.32, 0.10, 2.0, 4.0), sample(0.30, 0.12, 4.0, 6.0)],
        );
        profile.record(
            CognitiveState::Moderate,
            [sample(0.26, 0.20, 10.0, 9.0), sample(0.24, 0.22, 14.0, 11.0)],
        );
        profile.record(
            CognitiveState::Tired,
            [sample(0.18, 0.40, 30.0, 15.0), sample(0.16, 0.44, 34.0, 19.0)],
        );
        profile.compute_thresholds_and_weights().unwrap();
        profile
    }

    #[test]
    fn test_thresholds_are_state_means() {
        let profile = trained(Instant::now());

        let ear = profile.threshold(Metric::Ear).unwrap();
        assert!((ear.enter_hi - 0.25).abs() < 1e-9);
        assert!((ear.exit_lo - 0.31).abs() < 1e-9);
        assert!((profile.pitch_baseline() - 5.0).abs() < 1e-9);
        assert_eq!(profile.ear_threshold(), Some(ear.enter_hi));
    }

    #[test]
    fn test_weights_sum_to_one() {
        let profile = trained(Instant::now());
        let total: f64 = profile.weights().values().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(profile.has_model());
    }

    #[test]
    fn test_missing_state_fails() {
        let mut profile = AdvancedProfile::new(AdvancedCalibrationConfig::default(), Instant::now());
        profile.record(CognitiveState::Alert, [sample(0.3, 0.1, 2.0, 5.0)]);
        profile.record(CognitiveState::Tired, [sample(0.2, 0.4, 30.0, 15.0)]);

        let err = profile.compute_thresholds_and_weights().unwrap_err();
        assert!(matches!(err, CalibrationError::InsufficientSamples(_)));
        assert!(!profile.has_model());
        assert_eq!(profile.ear_threshold(), None);
    }

    #[test]
    fn test_identical_states_use_uniform_weights() {
        let mut profile = AdvancedProfile::new(AdvancedCalibrationConfig::default(), Instant::now());
        for state in CognitiveState::ORDER {
            profile.record(state, [sample(0.3, 0.2, 5.0, 3.0)]);
        }
        profile.compute_thresholds_and_weights().unwrap();

        for weight in profile.weights().values() {
            assert!((weight - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn test_warmup_returns_zero() {
        let start = Instant::now();
        let profile = trained(start);
        let tired = sample(0.17, 0.42, 32.0, 17.0);

        assert_eq!(profile.score_state(&tired, 60, start + Duration::from_secs(2)), 0.0);
        assert!(profile.score_state(&tired, 60, start + Duration::from_secs(6)) > 0.5);
    }

    #[test]
    fn test_short_perclos_window_ignored() {
        let start = Instant::now();
        let later = start + Duration::from_secs(10);
        let profile = trained(start);
        let only_perclos = sample(0.2, 0.05, 80.0, 5.0);

        let guarded = profile.score_state(&only_perclos, 3, later);
        assert_eq!(guarded, 0.0);

        let other = trained(start);
        assert!(other.score_state(&only_perclos, 30, later) > 0.0);
    }

    #[test]
    fn test_score_averages_recent_window() {
        let start = Instant::now();
        let later = start + Duration::from_secs(10);
        let profile = trained(start);
        let saturated = sample(0.4, 1.0, 100.0, 90.0);
        let quiet = sample(0.2, 0.0, 0.0, 0.0);

        assert!((profile.score_state(&saturated, 60, later) - 1.0).abs() < 1e-9);
        assert!((profile.score_state(&quiet, 60, later) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_snapshot_round_trip_scores_identically() {
        let start = Instant::now();
        let later = start + Duration::from_secs(30);
        let original = trained(start);
        let snapshot = original.to_snapshot().unwrap();
        let restored =
            AdvancedProfile::from_snapshot(&snapshot, AdvancedCalibrationConfig::default(), start).unwrap();

        assert_eq!(restored.thresholds(), original.thresholds());
        assert_eq!(restored.weights(), original.weights());
        assert_eq!(restored.pitch_baseline(), original.pitch_baseline());

        for s in [sample(0.2, 0.3, 20.0, 12.0), sample(0.28, 0.15, 8.0, 7.0)] {
            assert_eq!(restored.score_state(&s, 60, later), original.score_state(&s, 60, later));
        }
    }

    #[test]
    fn test_snapshot_without_baseline_recomputes() {
        let start = Instant::now();
        let mut snapshot = trained(start).to_snapshot().unwrap();
        snapshot.pitch_baseline = None;

        let restored =
            AdvancedProfile::from_snapshot(&snapshot, AdvancedCalibrationConfig::default(), start).unwrap();
        assert_eq!(restored.pitch_baseline(), 0.0);
    }

    #[test]
    fn test_session_collects_each_state() {
        let config = AdvancedCalibrationConfig {
            phase_duration_s: 5.0,
            ..Default::default()
        };
        let start = Instant::now();
        let mut session = AdvancedCalibration::new(config, start);
        let mut now = start;

        while let Ok(state) = session.start_next_phase(now) {
            let reading = match state {
                CognitiveState::Alert => sample(0.31, 0.1, 2.0, 5.0),
                CognitiveState::Moderate => sample(0.25, 0.2, 12.0, 10.0),
                CognitiveState::Tired => sample(0.17, 0.4, 32.0, 17.0),
            };
            loop {
                now += Duration::from_millis(100);
                if session.tick(now, Some(&reading)) == Some(state) {
                    break;
                }
            }
        }

        assert!(session.is_complete());
        assert_eq!(session.profile().samples(CognitiveState::Tired).len(), 5);
        let profile = session.finish().unwrap();
        assert!(profile.has_model());
    }

    proptest! {
        #[test]
        fn prop_weights_normalized(
            alert in prop::collection::vec((0.0f64..0.5, 0.0f64..1.0, 0.0f64..100.0, 0.0f64..60.0), 1..20),
            moderate in prop::collection::vec((0.0f64..0.5, 0.0f64..1.0, 0.0f64..100.0, 0.0f64..60.0), 1..20),
            tired in prop::collection::vec((0.0f64..0.5, 0.0f64..1.0, 0.0f64..100.0, 0.0f64..60.0), 1..20),
        ) {
            let to_samples = |v: Vec<(f64, f64, f64, f64)>| {
                v.into_iter().map(|(e, m, p, h)| sample(e, m, p, h)).collect::<Vec<_>>()
            };
            let mut profile = AdvancedProfile::new(AdvancedCalibrationConfig::default(), Instant::now());
            profile.record(CognitiveState::Alert, to_samples(alert));
            profile.record(CognitiveState::Moderate, to_samples(moderate));
            profile.record(CognitiveState::Tired, to_samples(tired));
            profile.compute_thresholds_and_weights().unwrap();

            let weights = profile.weights();
            prop_assert!(weights.values().all(|w| *w >= 0.0));
            prop_assert!((weights.values().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }
}
