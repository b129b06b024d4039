//! Microsleep detector

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sustained eye-closure episode detector.
///
/// `active` latches once an episode reaches `threshold_frames` and clears only
/// when the eye reopens, so each episode is counted once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicrosleepDetector {
    duration_s: f64,
    threshold_frames: u32,
    consecutive_frames: u32,
    active: bool,
    count: u32,
}

impl MicrosleepDetector {
    /// Detector for closures lasting `duration_s` at `fps`
    pub fn new(duration_s: f64, fps: f64) -> Self {
        Self {
            duration_s,
            threshold_frames: frames_for(duration_s, fps),
            consecutive_frames: 0,
            active: false,
            count: 0,
        }
    }

    /// Feed one frame; true exactly once per new episode
    pub fn update(&mut self, ear: f64, threshold: f64) -> bool {
        if ear < threshold {
            self.consecutive_frames = self.consecutive_frames.saturating_add(1);
            if self.consecutive_frames >= self.threshold_frames && !self.active {
                self.active = true;
                self.count += 1;
                warn!(
                    count = self.count,
                    frames = self.consecutive_frames,
                    "Microsleep detected"
                );
                return true;
            }
        } else {
            self.consecutive_frames = 0;
            self.active = false;
        }
        false
    }

    /// Recompute the frame threshold for a new frame rate
    pub fn set_frame_rate(&mut self, fps: f64) {
        self.threshold_frames = frames_for(self.duration_s, fps);
    }

    pub fn threshold_frames(&self) -> u32 {
        self.threshold_frames
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn reset(&mut self) {
        self.consecutive_frames = 0;
        self.active = false;
        self.count = 0;
    }
}

fn frames_for(duration_s: f64, fps: f64) -> u32 {
    let frames = (duration_s * fps).round();
    if frames.is_finite() && frames >= 1.0 {
        frames as u32
    } else {
        1
    }
}
