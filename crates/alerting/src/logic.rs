//! Alert Logic Implementation

use feature_engine::{FaceMetrics, ThresholdSet, ThresholdSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Yawn must hold this long before it counts
pub const YAWN_DURATION_S: f64 = 0.6;

/// Alert event kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Eyes closed for the configured number of frames
    EyeClosed,
    /// Mouth open wide for the configured number of frames
    Yawn,
    /// Head pitched down past threshold for the hold time
    HeadDown,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertKind::EyeClosed => "eye_closed",
            AlertKind::Yawn => "yawn",
            AlertKind::HeadDown => "head_down",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Static thresholds used when no calibration supplies a value
    pub thresholds: ThresholdSet,
    /// Consecutive closed-eye frames before an eye alert
    pub ear_consec_frames: u32,
    /// Consecutive open-mouth frames before a yawn alert
    pub mar_consec_frames: u32,
    /// Continuous head-down time before an alert (seconds)
    pub head_down_hold_s: f64,
    /// Minimum time between alerts of any kind (seconds)
    pub cooldown_seconds: f64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdSet::default(),
            ear_consec_frames: 15,
            mar_consec_frames: yawn_frames_for_rate(30.0),
            head_down_hold_s: 2.0,
            cooldown_seconds: 5.0,
        }
    }
}

impl AlertConfig {
    /// Re-derive the yawn debounce from the camera frame rate
    pub fn with_frame_rate(mut self, fps: f64) -> Self {
        self.mar_consec_frames = yawn_frames_for_rate(fps);
        self
    }

    fn cooldown(&self) -> Duration {
        // NaN maxes to zero; infinite or overflowing cooldowns never expire
        Duration::try_from_secs_f64(self.cooldown_seconds.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Frames needed to cover [`YAWN_DURATION_S`], never fewer than 2
fn yawn_frames_for_rate(fps: f64) -> u32 {
    let frames = (YAWN_DURATION_S * fps).floor();
    if frames.is_finite() {
        (frames as u32).max(2)
    } else {
        2
    }
}

/// Debounce counters and cooldown bookkeeping
#[derive(Debug, Clone, Default)]
pub struct AlertLogicState {
    /// Consecutive frames with EAR below threshold
    pub eye_frames: u32,
    /// Consecutive frames with MAR above threshold
    pub yawn_frames: u32,
    /// When pitch first exceeded its threshold in the current episode
    pub pitch_high_since: Option<Instant>,
    /// Last time any alert was emitted
    pub last_alert_time: Option<Instant>,
}

/// Debounced alert detector with a global cooldown
pub struct AlertLogic {
    config: AlertConfig,
    state: AlertLogicState,
    total_fired: usize,
}

impl AlertLogic {
    /// Create a new alert logic
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert logic with config: {:?}", config);
        Self {
            config,
            state: AlertLogicState::default(),
            total_fired: 0,
        }
    }

    /// Evaluate one frame.
    ///
    /// Thresholds resolve per metric from `calibration`, falling back to the
    /// configured defaults. Counters advance on every call; emission is
    /// suppressed while the cooldown since the last emitted alert is running.
    pub fn evaluate<S: ThresholdSource + ?Sized>(
        &mut self,
        metrics: &FaceMetrics,
        distracted: bool,
        calibration: &S,
        now: Instant,
    ) -> Vec<AlertKind> {
        let thresholds = ThresholdSet::resolve(calibration, &self.config.thresholds);
        debug!(
            ear = metrics.ear,
            mar = metrics.mar,
            pitch = metrics.pitch_deg,
            ear_thr = thresholds.ear,
            mar_thr = thresholds.mar,
            pitch_thr = thresholds.pitch,
            "Evaluating alert thresholds"
        );
        if distracted {
            trace!("Distraction flag set");
        }

        let mut tripped = Vec::new();

        if metrics.ear < thresholds.ear {
            self.state.eye_frames = self.state.eye_frames.saturating_add(1);
        } else {
            self.state.eye_frames = 0;
        }
        if self.state.eye_frames >= self.config.ear_consec_frames {
            tripped.push(AlertKind::EyeClosed);
        }

        if metrics.mar > thresholds.mar {
            self.state.yawn_frames = self.state.yawn_frames.saturating_add(1);
        } else {
            self.state.yawn_frames = 0;
        }
        if self.state.yawn_frames >= self.config.mar_consec_frames {
            tripped.push(AlertKind::Yawn);
        }

        if metrics.pitch_deg > thresholds.pitch {
            let since = *self.state.pitch_high_since.get_or_insert(now);
            if now.saturating_duration_since(since).as_secs_f64() > self.config.head_down_hold_s {
                tripped.push(AlertKind::HeadDown);
            }
        } else {
            self.state.pitch_high_since = None;
        }

        if tripped.is_empty() {
            return tripped;
        }

        if self.in_cooldown(now) {
            debug!("Alerts {:?} suppressed: in cooldown period", tripped);
            return Vec::new();
        }

        self.state.last_alert_time = Some(now);
        self.total_fired += tripped.len();
        tripped
    }

    /// Whether an alert was emitted less than `cooldown_seconds` ago
    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.state
            .last_alert_time
            .is_some_and(|last| now.saturating_duration_since(last) < self.config.cooldown())
    }

    /// Re-derive frame-count debounces from the camera frame rate
    pub fn set_frame_rate(&mut self, fps: f64) {
        self.config.mar_consec_frames = yawn_frames_for_rate(fps);
        info!(
            "Yawn debounce set to {} frames at {:.2} fps",
            self.config.mar_consec_frames, fps
        );
    }

    pub fn state(&self) -> &AlertLogicState {
        &self.state
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }

    /// Get total alerts emitted
    pub fn total_fired(&self) -> usize {
        self.total_fired
    }

    /// Clear counters and cooldown
    pub fn reset(&mut self) {
        self.state = AlertLogicState::default();
        self.total_fired = 0;
    }
}

impl Default for AlertLogic {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
