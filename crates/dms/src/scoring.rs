//! Fatigue scoring
//!
//! Fuses the per-frame metrics into a 0-100 score, smooths it, and classifies
//! risk (with hysteresis) and trend (least-squares slope over recent history).

use crate::risk::{RiskLevel, TrendLevel};
use calibration::ActiveProfile;
use feature_engine::normalize::{normalize_ear, normalize_mar, normalize_micro, normalize_perclos, normalize_pitch};
use feature_engine::{linear_slope, Ema, MetricSample};
use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

/// Weights of the static blend, summing to 1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendWeights {
    pub ear: f64,
    pub mar: f64,
    pub perclos: f64,
    pub microsleep: f64,
    pub pitch: f64,
}

impl Default for BlendWeights {
    fn default() -> Self {
        Self {
            ear: 0.25,
            mar: 0.10,
            perclos: 0.30,
            microsleep: 0.20,
            pitch: 0.15,
        }
    }
}

/// Scoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// EMA factor of the fatigue score
    pub score_alpha: f64,
    /// EMA factor of head pitch fed to the learned scorer
    pub pitch_alpha: f64,
    /// Raw scores at or above this bypass smoothing
    pub critical_bypass: f64,
    /// Score history entries kept for the trend
    pub history_capacity: usize,
    /// History points needed before a trend is fitted
    pub min_trend_points: usize,
    pub weights: BlendWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            score_alpha: 0.4,
            pitch_alpha: 0.3,
            critical_bypass: 80.0,
            history_capacity: 600,
            min_trend_points: 3,
            weights: BlendWeights::default(),
        }
    }
}

/// Inputs for one scoring step
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreInput {
    pub sample: MetricSample,
    pub microsleep_count: u32,
    /// Samples currently backing the PERCLOS value
    pub perclos_samples: usize,
}

/// Result of one scoring step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FatigueScore {
    pub raw: f64,
    pub smoothed: f64,
    pub risk: RiskLevel,
    pub trend: TrendLevel,
    /// Score points per second
    pub slope: f64,
    /// Computed by the learned advanced model
    pub learned: bool,
}

/// Stateful fatigue scorer
#[derive(Debug, Clone)]
pub struct FatigueScorer {
    config: ScoringConfig,
    pitch_ema: Ema,
    score_ema: Ema,
    previous_risk: Option<RiskLevel>,
    history: RingBuffer<(Instant, f64)>,
}

impl FatigueScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self {
            pitch_ema: Ema::new(config.pitch_alpha),
            score_ema: Ema::new(config.score_alpha),
            previous_risk: None,
            history: RingBuffer::new(config.history_capacity),
            config,
        }
    }

    /// Score one frame against the active profile
    pub fn score(&mut self, input: &ScoreInput, profile: &ActiveProfile, now: Instant) -> FatigueScore {
        let sample = input.sample;
        let pitch_smoothed = if sample.pitch_deg.is_finite() {
            self.pitch_ema.update(sample.pitch_deg)
        } else {
            self.pitch_ema.value().unwrap_or(0.0)
        };

        let (raw, learned) = match profile.learned_scorer() {
            Some(scorer) => {
                let smoothed_sample = MetricSample {
                    pitch_deg: pitch_smoothed,
                    ..sample
                };
                (100.0 * scorer.score_state(&smoothed_sample, input.perclos_samples, now), true)
            }
            None => (100.0 * self.static_blend(input), false),
        };
        let raw = if raw.is_finite() { raw } else { 0.0 };

        let smoothed = if raw >= self.config.critical_bypass {
            self.score_ema.snap(raw)
        } else {
            self.score_ema.update(raw)
        };

        self.history.push((now, smoothed));
        let slope = self.slope();
        let risk = RiskLevel::classify(smoothed, self.previous_risk);
        self.previous_risk = Some(risk);
        let trend = TrendLevel::classify(slope);

        debug!(raw, smoothed, learned, risk = %risk, trend = %trend, "Fatigue score");
        FatigueScore {
            raw,
            smoothed,
            risk,
            trend,
            slope,
            learned,
        }
    }

    fn static_blend(&self, input: &ScoreInput) -> f64 {
        let w = &self.config.weights;
        let s = &input.sample;
        w.ear * normalize_ear(s.ear)
            + w.mar * normalize_mar(s.mar)
            + w.perclos * normalize_perclos(s.perclos_pct)
            + w.microsleep * normalize_micro(input.microsleep_count)
            + w.pitch * normalize_pitch(s.pitch_deg)
    }

    /// Least-squares slope of the smoothed score against elapsed seconds
    fn slope(&self) -> f64 {
        if self.history.len() < self.config.min_trend_points.max(2) {
            return 0.0;
        }
        let Some((t0, _)) = self.history.front().copied() else {
            return 0.0;
        };
        let points: Vec<(f64, f64)> = self
            .history
            .iter()
            .map(|(t, v)| (t.saturating_duration_since(t0).as_secs_f64(), *v))
            .collect();
        linear_slope(&points).filter(|s| s.is_finite()).unwrap_or(0.0)
    }

    pub fn previous_risk(&self) -> Option<RiskLevel> {
        self.previous_risk
    }

    pub fn smoothed(&self) -> Option<f64> {
        self.score_ema.value()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Forget smoothing state, previous risk and history
    pub fn reset(&mut self) {
        self.pitch_ema.reset();
        self.score_ema.reset();
        self.previous_risk = None;
        self.history.clear();
    }
}

impl Default for FatigueScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}
