//! Driver Monitoring System (DMS)
//!
//! Real-time fatigue decision engine over per-frame face metrics:
//! - PERCLOS over a rolling window
//! - Microsleep episode detection
//! - Debounced eye-closed / yawn / head-down alerts with a global cooldown
//! - Fatigue score with EMA smoothing, hysteretic risk bands and trend
//! - Calibration profiles swapped at runtime without pausing the frame loop

pub mod analysis;
pub mod config;
pub mod microsleep;
pub mod perclos;
pub mod risk;
pub mod scoring;
pub mod state;

pub use analysis::FrameAnalysis;
pub use config::DmsConfig;
pub use microsleep::MicrosleepDetector;
pub use perclos::{PerclosConfig, PerclosWindow};
pub use risk::{RiskBand, RiskLevel, TrendLevel};
pub use scoring::{BlendWeights, FatigueScore, FatigueScorer, ScoreInput, ScoringConfig};
pub use state::{SessionStats, SessionSummary};

use alerting::{AlertLogic, AlertSink, LogAlertSink};
use calibration::ProfileReader;
use camera_capture::{CameraError, Frame};
use feature_engine::{FaceMetrics, LandmarkSet, MetricSample, ThresholdSet};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Landmark extraction failed: {0}")]
    Landmarks(String),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Produces facial landmarks for a frame
pub trait LandmarkExtractor {
    /// `Ok(None)` when no face is detected
    fn landmarks(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, DmsError>;
}

/// Uses the landmarks recorded with each frame
#[derive(Debug, Default, Clone, Copy)]
pub struct RecordedLandmarks;

impl LandmarkExtractor for RecordedLandmarks {
    fn landmarks(&mut self, frame: &Frame) -> Result<Option<LandmarkSet>, DmsError> {
        Ok(frame.landmarks.clone())
    }
}

/// Driver monitoring module
pub struct DmsModule {
    config: DmsConfig,
    perclos: PerclosWindow,
    microsleep: MicrosleepDetector,
    alerts: AlertLogic,
    scorer: FatigueScorer,
    profile: ProfileReader,
    metrics_tx: watch::Sender<Option<MetricSample>>,
    sink: Box<dyn AlertSink>,
    session: SessionStats,
}

impl DmsModule {
    /// Create a new DMS module reading calibration from `profile`
    pub fn new(config: DmsConfig, profile: ProfileReader) -> Self {
        let (metrics_tx, _) = watch::channel(None);
        info!(
            "DMS engine ready: PERCLOS window {} samples, microsleep {} frames",
            config.perclos.capacity(),
            (config.microsleep_duration_s * config.frame_rate).round()
        );
        Self {
            perclos: PerclosWindow::new(&config.perclos),
            microsleep: MicrosleepDetector::new(config.microsleep_duration_s, config.frame_rate),
            alerts: AlertLogic::new(config.alert.clone()),
            scorer: FatigueScorer::new(config.scoring.clone()),
            profile,
            metrics_tx,
            sink: Box::new(LogAlertSink),
            session: SessionStats::new(Instant::now()),
            config,
        }
    }

    /// Replace the alert side-effect hook
    pub fn with_sink(mut self, sink: Box<dyn AlertSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Receiver of the current metrics, `None` while no face is visible
    pub fn metrics_receiver(&self) -> watch::Receiver<Option<MetricSample>> {
        self.metrics_tx.subscribe()
    }

    pub fn current_metrics(&self) -> Option<MetricSample> {
        *self.metrics_tx.borrow()
    }

    /// Re-derive frame-count thresholds from the source frame rate
    pub fn set_frame_rate(&mut self, fps: f64) {
        if !(fps.is_finite() && fps > 0.0) {
            debug!("Ignoring invalid frame rate {}", fps);
            return;
        }
        self.config.frame_rate = fps;
        self.microsleep.set_frame_rate(fps);
        self.alerts.set_frame_rate(fps);
    }

    /// Extract landmarks from `frame` and process them.
    ///
    /// Frames carrying recorded measurements skip extraction. A failed
    /// extraction or an incomplete landmark set counts as a frame without a
    /// face, so the session keeps scoring.
    pub fn analyze_frame<E>(&mut self, frame: &Frame, extractor: &mut E, now: Instant) -> FrameAnalysis
    where
        E: LandmarkExtractor + ?Sized,
    {
        let face = match frame.metrics {
            Some(metrics) => Some(metrics),
            None => extract_face(frame, extractor),
        };
        self.process(face, false, now)
    }

    /// Run every detector on one frame's metrics.
    ///
    /// Without a face the EAR is replaced by its own threshold and MAR and
    /// pitch by zero, so no detector fires, and no metrics are published to
    /// calibration.
    pub fn process(&mut self, face: Option<FaceMetrics>, distracted: bool, now: Instant) -> FrameAnalysis {
        // One profile for the whole frame
        let profile = self.profile.current();
        let thresholds = ThresholdSet::resolve(&*profile, &self.config.alert.thresholds);

        let face_detected = face.is_some();
        self.session.record_frame(face_detected);
        metrics::counter!("dms.frames_processed").increment(1);

        let observed = face.unwrap_or(FaceMetrics {
            ear: thresholds.ear,
            mar: 0.0,
            pitch_deg: 0.0,
        });

        let new_microsleep = face_detected && self.microsleep.update(observed.ear, thresholds.ear);
        if new_microsleep {
            self.session.record_microsleep();
            metrics::counter!("dms.microsleeps").increment(1);
        }

        self.perclos.update(observed.ear, thresholds.ear);
        let perclos_pct = self.perclos.compute();
        let sample = MetricSample::new(observed.ear, observed.mar, observed.pitch_deg, perclos_pct);
        self.metrics_tx.send_replace(face_detected.then_some(sample));

        let alerts = self.alerts.evaluate(&observed, distracted, &*profile, now);
        for kind in &alerts {
            self.sink.notify(*kind);
            self.session.record_alert(*kind);
            metrics::counter!("dms.alerts", "kind" => kind.as_str()).increment(1);
        }

        let score = self.scorer.score(
            &ScoreInput {
                sample,
                microsleep_count: self.microsleep.count(),
                perclos_samples: self.perclos.len(),
            },
            &profile,
            now,
        );
        self.session.record_score(score.smoothed);

        FrameAnalysis {
            face_detected,
            metrics: sample,
            perclos_high: perclos_pct >= self.config.perclos_high_pct,
            microsleep_count: self.microsleep.count(),
            new_microsleep,
            score,
            alerts,
            profile: profile.kind(),
        }
    }

    /// Begin a monitoring session, clearing its counters
    pub fn start_session(&mut self, now: Instant) {
        info!("Monitoring session started");
        self.session = SessionStats::new(now);
    }

    /// End the monitoring session and report it
    pub fn stop_session(&mut self, now: Instant) -> SessionSummary {
        let summary = self.session.summary(now);
        info!(
            frames = summary.total_frames,
            mean_score = summary.mean_score,
            "Monitoring session stopped"
        );
        summary
    }

    /// Clear counters and every detector's history
    pub fn reset_session(&mut self, now: Instant) {
        self.session = SessionStats::new(now);
        self.perclos.reset();
        self.microsleep.reset();
        self.alerts.reset();
        self.scorer.reset();
        self.metrics_tx.send_replace(None);
        info!("Monitoring session reset");
    }

    pub fn session(&self) -> &SessionStats {
        &self.session
    }

    pub fn config(&self) -> &DmsConfig {
        &self.config
    }
}

fn extract_face<E>(frame: &Frame, extractor: &mut E) -> Option<FaceMetrics>
where
    E: LandmarkExtractor + ?Sized,
{
    let landmarks = match extractor.landmarks(frame) {
        Ok(landmarks) => landmarks?,
        Err(e) => {
            warn!(sequence = frame.sequence, error = %e, "Landmark extraction failed, treating frame as no face");
            metrics::counter!("dms.frames_dropped").increment(1);
            return None;
        }
    };
    match FaceMetrics::from_landmarks(&landmarks, frame.width, frame.height) {
        Ok(face) => Some(face),
        Err(e) => {
            warn!(sequence = frame.sequence, error = %e, "Unusable landmarks, treating frame as no face");
            metrics::counter!("dms.frames_dropped").increment(1);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::{AlertKind, RecordingSink};
    use calibration::{ActiveProfile, ProfileHandle, SimplePhase, SimpleProfile};
    use feature_engine::Point;
    use std::sync::Arc;
    use std::time::Duration;

    const FRAME: Duration = Duration::from_millis(50);

    fn open() -> FaceMetrics {
        FaceMetrics {
            ear: 0.32,
            mar: 0.2,
            pitch_deg: 3.0,
        }
    }

    fn closed() -> FaceMetrics {
        FaceMetrics { ear: 0.1, ..open() }
    }

    fn engine() -> (DmsModule, ProfileHandle, Arc<RecordingSink>) {
        let handle = ProfileHandle::default();
        let sink = Arc::new(RecordingSink::new());
        let module = DmsModule::new(DmsConfig::default(), handle.subscribe()).with_sink(Box::new(sink.clone()));
        (module, handle, sink)
    }

    #[test]
    fn test_sustained_closure_alerts_once_per_cooldown() {
        let (mut dms, _handle, sink) = engine();
        let start = Instant::now();

        // 15 frames to trip, then 3 s more of closure inside the 5 s cooldown
        for i in 0..75u32 {
            dms.process(Some(closed()), false, start + FRAME * i);
        }
        assert_eq!(sink.received(), vec![AlertKind::EyeClosed]);
        assert_eq!(dms.session().alert_count(AlertKind::EyeClosed), 1);

        // Counters kept advancing, so the alert repeats as soon as cooldown ends
        let after = dms.process(Some(closed()), false, start + FRAME * 14 + Duration::from_secs(5));
        assert_eq!(after.alerts, vec![AlertKind::EyeClosed]);
    }

    #[test]
    fn test_no_face_substitutes_threshold() {
        let (mut dms, _handle, sink) = engine();
        let rx = dms.metrics_receiver();
        let start = Instant::now();

        let mut last = None;
        for i in 0..100u32 {
            last = Some(dms.process(None, false, start + FRAME * i));
        }
        let last = last.unwrap();

        assert!(!last.face_detected);
        assert_eq!(last.metrics.ear, 0.21);
        assert_eq!(last.perclos_pct(), 0.0);
        assert_eq!(last.microsleep_count, 0);
        assert!(sink.received().is_empty());
        assert_eq!(*rx.borrow(), None);
        assert_eq!(dms.session().frames_with_face(), 0);
    }

    #[test]
    fn test_metrics_published_with_face() {
        let (mut dms, _handle, _sink) = engine();
        let rx = dms.metrics_receiver();
        dms.process(Some(open()), false, Instant::now());

        let published = rx.borrow().unwrap();
        assert_eq!(published.ear, 0.32);
        assert_eq!(dms.current_metrics(), Some(published));
    }

    #[test]
    fn test_microsleep_counted() {
        let (mut dms, _handle, _sink) = engine();
        let start = Instant::now();

        // 1.5 s at 20 fps = 30 frames
        let mut detections = 0;
        for i in 0..40u32 {
            if dms.process(Some(closed()), false, start + FRAME * i).new_microsleep {
                detections += 1;
            }
        }
        let analysis = dms.process(Some(open()), false, start + FRAME * 40);

        assert_eq!(detections, 1);
        assert_eq!(analysis.microsleep_count, 1);
        assert!(analysis.perclos_high);
    }

    #[test]
    fn test_profile_swap_applies_next_frame() {
        let (mut dms, handle, _sink) = engine();
        let now = Instant::now();
        let borderline = FaceMetrics { ear: 0.25, ..open() };

        let before = dms.process(Some(borderline), false, now);
        assert_eq!(before.perclos_pct(), 0.0);
        assert_eq!(before.profile, calibration::ProfileKind::Static);

        let mut profile = SimpleProfile::new();
        profile.set_samples(SimplePhase::EyesOpen, [0.35]);
        profile.set_samples(SimplePhase::EyesClosed, [0.15]);
        profile.compute_thresholds();
        handle.replace(ActiveProfile::Simple(profile));

        // Calibrated EAR threshold 0.27 now classifies 0.25 as closed
        let after = dms.process(Some(borderline), false, now + FRAME);
        assert_eq!(after.perclos_pct(), 50.0);
        assert_eq!(after.profile, calibration::ProfileKind::Simple);
    }

    #[test]
    fn test_frame_rate_updates_debounce() {
        let (mut dms, _handle, _sink) = engine();
        dms.set_frame_rate(4.0);
        let start = Instant::now();
        let step = Duration::from_millis(250);

        let detections = (0..8u32)
            .filter(|i| dms.process(Some(closed()), false, start + step * *i).new_microsleep)
            .count();
        assert_eq!(detections, 1);

        dms.set_frame_rate(f64::NAN);
        assert_eq!(dms.config().frame_rate, 4.0);
    }

    #[test]
    fn test_session_summary_and_reset() {
        let (mut dms, _handle, _sink) = engine();
        let start = Instant::now();
        dms.start_session(start);

        for i in 0..10u32 {
            let face = (i % 2 == 0).then(open);
            dms.process(face, false, start + FRAME * i);
        }
        let summary = dms.stop_session(start + Duration::from_secs(1));
        assert_eq!(summary.total_frames, 10);
        assert_eq!(summary.face_visible_pct, 50.0);

        dms.reset_session(start + Duration::from_secs(1));
        assert_eq!(dms.session().total_frames(), 0);
        assert_eq!(dms.current_metrics(), None);
    }

    #[test]
    fn test_analyze_frame_paths() {
        let (mut dms, _handle, _sink) = engine();
        let now = Instant::now();

        let measured = Frame::empty(640, 480, 0, 0).with_metrics(open());
        let analysis = dms.analyze_frame(&measured, &mut RecordedLandmarks, now);
        assert!(analysis.face_detected);
        assert_eq!(analysis.metrics.ear, 0.32);

        let no_face = Frame::empty(640, 480, 50_000_000, 1);
        let analysis = dms.analyze_frame(&no_face, &mut RecordedLandmarks, now + FRAME);
        assert!(!analysis.face_detected);

        let partial = Frame::empty(640, 480, 100_000_000, 2).with_landmarks(LandmarkSet::new(vec![Point::new(0.5, 0.5)]));
        let analysis = dms.analyze_frame(&partial, &mut RecordedLandmarks, now + FRAME * 2);
        assert!(!analysis.face_detected);
        assert_eq!(analysis.metrics.ear, 0.21);
        assert_eq!(dms.session().total_frames(), 3);
        assert_eq!(dms.session().frames_with_face(), 1);
    }

    struct FailingExtractor;

    impl LandmarkExtractor for FailingExtractor {
        fn landmarks(&mut self, _frame: &Frame) -> Result<Option<LandmarkSet>, DmsError> {
            Err(DmsError::Landmarks("model not loaded".to_string()))
        }
    }

    #[test]
    fn test_extractor_failure_counts_as_no_face() {
        let (mut dms, _handle, sink) = engine();
        let start = Instant::now();

        let mut last = None;
        for i in 0..40u32 {
            let frame = Frame::empty(640, 480, u64::from(i) * 50_000_000, i);
            last = Some(dms.analyze_frame(&frame, &mut FailingExtractor, start + FRAME * i));
        }
        let last = last.unwrap();

        assert!(!last.face_detected);
        assert_eq!(last.microsleep_count, 0);
        assert!(sink.received().is_empty());
        assert_eq!(dms.session().total_frames(), 40);

        // Recorded metrics bypass the extractor entirely
        let measured = Frame::empty(640, 480, 2_000_000_000, 40).with_metrics(open());
        assert!(dms.analyze_frame(&measured, &mut FailingExtractor, start + FRAME * 40).face_detected);
    }
}
