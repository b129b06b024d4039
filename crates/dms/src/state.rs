//! Session statistics

use alerting::AlertKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

/// Counters for one monitoring session
#[derive(Debug, Clone)]
pub struct SessionStats {
    started_at: DateTime<Utc>,
    started: Instant,
    total_frames: u64,
    frames_with_face: u64,
    eye_closed_events: u32,
    yawn_events: u32,
    head_down_events: u32,
    microsleeps: u32,
    score_sum: f64,
    score_count: u64,
}

impl SessionStats {
    pub fn new(now: Instant) -> Self {
        Self {
            started_at: Utc::now(),
            started: now,
            total_frames: 0,
            frames_with_face: 0,
            eye_closed_events: 0,
            yawn_events: 0,
            head_down_events: 0,
            microsleeps: 0,
            score_sum: 0.0,
            score_count: 0,
        }
    }

    pub fn record_frame(&mut self, face_detected: bool) {
        self.total_frames += 1;
        if face_detected {
            self.frames_with_face += 1;
        }
    }

    pub fn record_alert(&mut self, kind: AlertKind) {
        match kind {
            AlertKind::EyeClosed => self.eye_closed_events += 1,
            AlertKind::Yawn => self.yawn_events += 1,
            AlertKind::HeadDown => self.head_down_events += 1,
        }
    }

    pub fn record_microsleep(&mut self) {
        self.microsleeps += 1;
    }

    pub fn record_score(&mut self, smoothed: f64) {
        if smoothed.is_finite() {
            self.score_sum += smoothed;
            self.score_count += 1;
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn frames_with_face(&self) -> u64 {
        self.frames_with_face
    }

    pub fn alert_count(&self, kind: AlertKind) -> u32 {
        match kind {
            AlertKind::EyeClosed => self.eye_closed_events,
            AlertKind::Yawn => self.yawn_events,
            AlertKind::HeadDown => self.head_down_events,
        }
    }

    /// Summary as of `now`
    pub fn summary(&self, now: Instant) -> SessionSummary {
        let face_visible_pct = if self.total_frames > 0 {
            100.0 * self.frames_with_face as f64 / self.total_frames as f64
        } else {
            0.0
        };
        let mean_score = if self.score_count > 0 {
            self.score_sum / self.score_count as f64
        } else {
            0.0
        };
        SessionSummary {
            started_at: self.started_at,
            duration_s: now.saturating_duration_since(self.started).as_secs_f64(),
            total_frames: self.total_frames,
            face_visible_pct,
            eye_closed_events: self.eye_closed_events,
            yawn_events: self.yawn_events,
            head_down_events: self.head_down_events,
            mean_score,
            microsleeps: self.microsleeps,
        }
    }
}

/// End-of-session report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub started_at: DateTime<Utc>,
    pub duration_s: f64,
    pub total_frames: u64,
    /// Share of frames with a detected face (0-100)
    pub face_visible_pct: f64,
    pub eye_closed_events: u32,
    pub yawn_events: u32,
    pub head_down_events: u32,
    /// Mean smoothed fatigue score over the session
    pub mean_score: f64,
    pub microsleeps: u32,
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.duration_s.max(0.0) as u64;
        writeln!(f, "SESSION SUMMARY")?;
        writeln!(f, "  Started:            {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "  Duration:           {} min {} sec", secs / 60, secs % 60)?;
        writeln!(f, "  Face detected:      {:.0}% of frames", self.face_visible_pct)?;
        writeln!(f, "  Eyes closed alerts: {}", self.eye_closed_events)?;
        writeln!(f, "  Yawns:              {}", self.yawn_events)?;
        writeln!(f, "  Head down events:   {}", self.head_down_events)?;
        writeln!(f, "  Mean fatigue score: {:.0}%", self.mean_score)?;
        write!(f, "  Microsleeps:        {}", self.microsleeps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_summary_counts() {
        let start = Instant::now();
        let mut stats = SessionStats::new(start);
        for face in [true, true, false, true] {
            stats.record_frame(face);
        }
        stats.record_alert(AlertKind::Yawn);
        stats.record_alert(AlertKind::EyeClosed);
        stats.record_alert(AlertKind::Yawn);
        stats.record_microsleep();
        stats.record_score(20.0);
        stats.record_score(40.0);
        stats.record_score(f64::NAN);

        let summary = stats.summary(start + Duration::from_secs(125));
        assert_eq!(summary.total_frames, 4);
        assert_eq!(summary.face_visible_pct, 75.0);
        assert_eq!(summary.yawn_events, 2);
        assert_eq!(summary.eye_closed_events, 1);
        assert_eq!(summary.microsleeps, 1);
        assert_eq!(summary.mean_score, 30.0);
        assert_eq!(summary.duration_s, 125.0);
        assert!(summary.to_string().contains("2 min 5 sec"));
    }

    #[test]
    fn test_empty_session() {
        let start = Instant::now();
        let summary = SessionStats::new(start).summary(start);
        assert_eq!(summary.face_visible_pct, 0.0);
        assert_eq!(summary.mean_score, 0.0);
    }
}
