//! Simple four-phase calibration
//!
//! Samples EAR with eyes open and closed, MAR with mouth closed and open, and
//! places each threshold 60% of the way from the closed mean to the open mean.

use crate::collector::PhaseCollector;
use crate::config::{secs, SimpleCalibrationConfig};
use crate::CalibrationError;
use feature_engine::{mean, MetricSample, ThresholdSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Simple calibration phases, in collection order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimplePhase {
    EyesOpen,
    EyesClosed,
    MouthClosed,
    MouthOpen,
}

impl SimplePhase {
    pub const ORDER: [SimplePhase; 4] = [
        SimplePhase::EyesOpen,
        SimplePhase::EyesClosed,
        SimplePhase::MouthClosed,
        SimplePhase::MouthOpen,
    ];

    /// Prompt shown to the driver before the phase starts
    pub fn instruction(self) -> &'static str {
        match self {
            SimplePhase::EyesOpen => "Keep your eyes OPEN, mouth closed, and hold still.",
            SimplePhase::EyesClosed => "Close your EYES completely and hold still.",
            SimplePhase::MouthClosed => "Keep your mouth CLOSED (do not talk) and hold still.",
            SimplePhase::MouthOpen => "Open your mouth wide as in a yawn and hold it.",
        }
    }

    /// The reading this phase records
    fn reading(self, sample: &MetricSample) -> f64 {
        match self {
            SimplePhase::EyesOpen | SimplePhase::EyesClosed => sample.ear,
            SimplePhase::MouthClosed | SimplePhase::MouthOpen => sample.mar,
        }
    }

    fn duration(self, config: &SimpleCalibrationConfig) -> Duration {
        secs(match self {
            SimplePhase::EyesOpen => config.eyes_open_s,
            SimplePhase::EyesClosed => config.eyes_closed_s,
            SimplePhase::MouthClosed => config.mouth_closed_s,
            SimplePhase::MouthOpen => config.mouth_open_s,
        })
    }
}

impl fmt::Display for SimplePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SimplePhase::EyesOpen => "eyes_open",
            SimplePhase::EyesClosed => "eyes_closed",
            SimplePhase::MouthClosed => "mouth_closed",
            SimplePhase::MouthOpen => "mouth_open",
        })
    }
}

/// Samples and derived thresholds of a simple calibration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimpleProfile {
    ear_open: Vec<f64>,
    ear_closed: Vec<f64>,
    mar_closed: Vec<f64>,
    mar_open: Vec<f64>,
    ear_threshold: Option<f64>,
    mar_threshold: Option<f64>,
}

impl SimpleProfile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self, phase: SimplePhase) -> &[f64] {
        match phase {
            SimplePhase::EyesOpen => &self.ear_open,
            SimplePhase::EyesClosed => &self.ear_closed,
            SimplePhase::MouthClosed => &self.mar_closed,
            SimplePhase::MouthOpen => &self.mar_open,
        }
    }

    fn samples_mut(&mut self, phase: SimplePhase) -> &mut Vec<f64> {
        match phase {
            SimplePhase::EyesOpen => &mut self.ear_open,
            SimplePhase::EyesClosed => &mut self.ear_closed,
            SimplePhase::MouthClosed => &mut self.mar_closed,
            SimplePhase::MouthOpen => &mut self.mar_open,
        }
    }

    /// Replace a phase's samples, dropping non-finite readings
    pub fn set_samples(&mut self, phase: SimplePhase, values: impl IntoIterator<Item = f64>) {
        let list = self.samples_mut(phase);
        list.clear();
        list.extend(values.into_iter().filter(|v| v.is_finite()));
    }

    /// Derive thresholds with the default 0.6 interpolation
    pub fn compute_thresholds(&mut self) {
        self.compute_thresholds_with(SimpleCalibrationConfig::default().interpolation);
    }

    /// Derive `closed_mean + k * (open_mean - closed_mean)` for EAR and MAR.
    ///
    /// A threshold whose sample sets are incomplete is left unset.
    pub fn compute_thresholds_with(&mut self, k: f64) {
        self.ear_threshold = interpolate(&self.ear_closed, &self.ear_open, k);
        self.mar_threshold = interpolate(&self.mar_closed, &self.mar_open, k);

        match self.ear_threshold {
            Some(t) => info!("Calibrated EAR threshold: {:.3}", t),
            None => warn!("EAR calibration incomplete, keeping configured default"),
        }
        match self.mar_threshold {
            Some(t) => info!("Calibrated MAR threshold: {:.3}", t),
            None => warn!("MAR calibration incomplete, keeping configured default"),
        }
    }
}

fn interpolate(closed: &[f64], open: &[f64], k: f64) -> Option<f64> {
    if closed.is_empty() || open.is_empty() {
        return None;
    }
    let mean_closed = mean(closed);
    Some(mean_closed + k * (mean(open) - mean_closed))
}

impl ThresholdSource for SimpleProfile {
    fn ear_threshold(&self) -> Option<f64> {
        self.ear_threshold
    }

    fn mar_threshold(&self) -> Option<f64> {
        self.mar_threshold
    }

    fn pitch_threshold(&self) -> Option<f64> {
        None
    }
}

/// A simple calibration session, advanced by `tick`
#[derive(Debug)]
pub struct SimpleCalibration {
    config: SimpleCalibrationConfig,
    profile: SimpleProfile,
    collector: PhaseCollector<SimplePhase, f64>,
    next: usize,
}

impl SimpleCalibration {
    pub fn new(config: SimpleCalibrationConfig) -> Self {
        Self {
            collector: PhaseCollector::new(config.poll_interval()),
            profile: SimpleProfile::new(),
            next: 0,
            config,
        }
    }

    /// Phase that `start_next_phase` would begin
    pub fn next_phase(&self) -> Option<SimplePhase> {
        SimplePhase::ORDER.get(self.next).copied()
    }

    /// Start the next phase, clearing its previous samples
    pub fn start_next_phase(&mut self, now: Instant) -> Result<SimplePhase, CalibrationError> {
        let phase = self.next_phase().ok_or(CalibrationError::NoPendingPhase)?;
        self.collector.start(phase, phase.duration(&self.config), now)?;
        self.profile.samples_mut(phase).clear();
        self.next += 1;
        Ok(phase)
    }

    /// Feed the current metrics; returns the phase that just completed
    pub fn tick(&mut self, now: Instant, metrics: Option<&MetricSample>) -> Option<SimplePhase> {
        let reading = self
            .collector
            .current_phase()
            .zip(metrics)
            .map(|(phase, m)| phase.reading(m))
            .filter(|v| v.is_finite());

        let (phase, samples) = self.collector.tick(now, reading)?;
        self.profile.samples_mut(phase).extend(samples);
        Some(phase)
    }

    pub fn is_collecting(&self) -> bool {
        self.collector.is_collecting()
    }

    /// All four phases collected
    pub fn is_complete(&self) -> bool {
        self.next_phase().is_none() && !self.collector.is_collecting()
    }

    pub fn profile(&self) -> &SimpleProfile {
        &self.profile
    }

    /// Compute thresholds and hand over the profile
    pub fn finish(mut self) -> SimpleProfile {
        self.profile.compute_thresholds_with(self.config.interpolation);
        self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ear: f64, mar: f64) -> MetricSample {
        MetricSample::new(ear, mar, 0.0, 0.0)
    }

    #[test]
    fn test_ear_threshold_interpolation() {
        let mut profile = SimpleProfile::new();
        profile.set_samples(SimplePhase::EyesOpen, [0.34, 0.36, 0.35]);
        profile.set_samples(SimplePhase::EyesClosed, [0.14, 0.16]);
        profile.compute_thresholds();

        let t = profile.ear_threshold().unwrap();
        assert!((t - 0.27).abs() < 1e-9);
    }

    #[test]
    fn test_missing_phase_leaves_threshold_unset() {
        let mut profile = SimpleProfile::new();
        profile.set_samples(SimplePhase::EyesOpen, [0.35]);
        profile.set_samples(SimplePhase::MouthClosed, [0.1]);
        profile.set_samples(SimplePhase::MouthOpen, [0.6]);
        profile.compute_thresholds();

        assert_eq!(profile.ear_threshold(), None);
        assert!((profile.mar_threshold().unwrap() - 0.4).abs() < 1e-9);
        assert_eq!(profile.pitch_threshold(), None);
    }

    #[test]
    fn test_session_runs_all_phases() {
        let mut session = SimpleCalibration::new(SimpleCalibrationConfig::quick());
        let mut now = Instant::now();
        let frame = Duration::from_millis(33);

        let mut finished = Vec::new();
        while let Ok(phase) = session.start_next_phase(now) {
            let reading = match phase {
                SimplePhase::EyesOpen => sample(0.35, 0.1),
                SimplePhase::EyesClosed => sample(0.15, 0.1),
                SimplePhase::MouthClosed => sample(0.3, 0.1),
                SimplePhase::MouthOpen => sample(0.3, 0.7),
            };
            loop {
                now += frame;
                if let Some(done) = session.tick(now, Some(&reading)) {
                    finished.push(done);
                    break;
                }
            }
        }

        assert_eq!(finished, SimplePhase::ORDER.to_vec());
        assert!(session.is_complete());
        let profile = session.finish();
        assert!((profile.ear_threshold().unwrap() - 0.27).abs() < 1e-9);
        assert!((profile.mar_threshold().unwrap() - 0.46).abs() < 1e-9);
        assert!(!profile.samples(SimplePhase::EyesOpen).is_empty());
    }

    #[test]
    fn test_phase_cannot_restart_while_running() {
        let mut session = SimpleCalibration::new(SimpleCalibrationConfig::default());
        let now = Instant::now();
        session.start_next_phase(now).unwrap();

        let err = session.start_next_phase(now).unwrap_err();
        assert!(matches!(err, CalibrationError::AlreadyCollecting(_)));
        assert_eq!(session.next_phase(), Some(SimplePhase::EyesClosed));
    }

    #[test]
    fn test_no_face_frames_not_collected() {
        let mut session = SimpleCalibration::new(SimpleCalibrationConfig::quick());
        let start = Instant::now();
        session.start_next_phase(start).unwrap();

        session.tick(start, None);
        session.tick(start + Duration::from_millis(60), Some(&sample(0.33, 0.1)));
        let done = session.tick(start + Duration::from_secs(2), None);

        assert_eq!(done, Some(SimplePhase::EyesOpen));
        assert_eq!(session.profile().samples(SimplePhase::EyesOpen), &[0.33]);
    }
}
