//! Driver Fatigue Monitor
//!
//! Wires the fatigue engine to a recorded session: layered configuration,
//! structured logging, optional calibration snapshot, optional live
//! calibration and an end-of-session report.

use anyhow::Context;
use calibration::{CalibrationController, CalibrationEvent, CalibrationPhase, ProfileHandle, ProfileKind};
use camera_capture::{CameraError, DeviceSettings, FrameSource, ReplaySource};
use dms::{DmsConfig, DmsModule, RecordedLandmarks, RiskLevel, SessionSummary};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Config file looked up when `FATIGUE_CONFIG` is unset
pub const DEFAULT_CONFIG: &str = "config/settings";

/// Environment prefix; nested keys use `__`, e.g. `FATIGUE__DMS__FRAME_RATE=15`
pub const ENV_PREFIX: &str = "FATIGUE";

/// Logging options
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// One of trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggingSettings {
    pub fn max_level(&self) -> Level {
        self.level.parse().unwrap_or(Level::INFO)
    }
}

/// Calibration to run while the recording plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CalibrationMode {
    Simple,
    Advanced,
}

/// Monitor settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub logging: LoggingSettings,
    pub dms: DmsConfig,
    pub camera: DeviceSettings,
    /// Recorded session to play (JSON lines)
    pub replay_path: Option<PathBuf>,
    /// Load the advanced profile from `dms.calibration.snapshot_path` at startup
    pub load_snapshot: bool,
    /// Calibration started together with playback
    pub calibrate: Option<CalibrationMode>,
    /// Pace frames by their recorded timestamps
    pub realtime: bool,
}

/// Load settings from an optional config file, then `FATIGUE__*` environment variables
pub fn load_settings(path: &str) -> anyhow::Result<MonitorSettings> {
    let raw = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read configuration {}", path))?;

    raw.try_deserialize()
        .with_context(|| format!("invalid configuration {}", path))
}

/// Initialize logging
pub fn init_logging(settings: &LoggingSettings) {
    let builder = FmtSubscriber::builder()
        .with_max_level(settings.max_level())
        .with_target(true);

    if settings.json {
        tracing::subscriber::set_global_default(builder.json().finish())
            .expect("Failed to set tracing subscriber");
    } else {
        tracing::subscriber::set_global_default(builder.finish())
            .expect("Failed to set tracing subscriber");
    }
}

/// Outcome of one monitored session
#[derive(Debug, Clone)]
pub struct MonitorReport {
    pub summary: SessionSummary,
    /// Profile active when playback ended
    pub profile: ProfileKind,
    /// Highest risk level reached
    pub peak_risk: RiskLevel,
}

fn log_calibration_event(event: CalibrationEvent) {
    match event {
        CalibrationEvent::PhaseStarted(CalibrationPhase::Simple(phase)) => {
            info!(%phase, instruction = phase.instruction(), "Calibration phase started")
        }
        CalibrationEvent::PhaseStarted(phase) => info!(%phase, "Calibration phase started"),
        CalibrationEvent::PhaseFinished { phase, samples } => {
            info!(%phase, samples, "Calibration phase finished")
        }
        CalibrationEvent::Completed(kind) => info!(profile = kind.as_str(), "Calibration complete"),
        CalibrationEvent::Failed(reason) => warn!(%reason, "Calibration failed"),
    }
}

fn restore_snapshot(handle: &ProfileHandle, settings: &MonitorSettings) {
    let calibration = &settings.dms.calibration;
    match calibration.snapshot_path.as_deref() {
        Some(path) => {
            // The handle logs the failure and keeps the static profile
            if handle
                .load_snapshot(path, calibration.advanced.clone(), Instant::now().into_std())
                .is_ok()
            {
                info!("Restored calibration snapshot {}", path.display());
            }
        }
        None => warn!("load_snapshot is set but dms.calibration.snapshot_path is not"),
    }
}

fn start_calibration(
    controller: &CalibrationController,
    dms: &DmsModule,
    settings: &MonitorSettings,
) -> anyhow::Result<Option<JoinHandle<()>>> {
    let Some(mode) = settings.calibrate else {
        return Ok(None);
    };
    if !settings.realtime {
        warn!("Calibration needs realtime playback, skipping");
        return Ok(None);
    }

    let task = match mode {
        CalibrationMode::Simple => controller.start_simple(dms.metrics_receiver(), log_calibration_event)?,
        CalibrationMode::Advanced => controller.start_advanced(dms.metrics_receiver(), log_calibration_event)?,
    };
    Ok(Some(task))
}

/// Play the configured recording through the engine
pub async fn run(settings: MonitorSettings) -> anyhow::Result<MonitorReport> {
    let path = settings
        .replay_path
        .clone()
        .context("no recording configured (set replay_path or pass a file)")?;
    let source = ReplaySource::open(&path, settings.camera.clone())?;
    run_source(source, settings).await
}

/// Drive `source` until it ends
pub async fn run_source<S: FrameSource>(mut source: S, settings: MonitorSettings) -> anyhow::Result<MonitorReport> {
    let handle = ProfileHandle::default();
    if settings.load_snapshot {
        restore_snapshot(&handle, &settings);
    }

    let mut dms = DmsModule::new(settings.dms.clone(), handle.subscribe());
    dms.set_frame_rate(source.max_frame_rate());

    let controller = CalibrationController::new(handle.clone(), settings.dms.calibration.clone());
    let calibration = start_calibration(&controller, &dms, &settings)?;

    let base = Instant::now();
    dms.start_session(base.into_std());
    let status_every = source.max_frame_rate().round().max(1.0) as u32;
    let mut extractor = RecordedLandmarks;
    let mut peak_risk = RiskLevel::VeryLow;
    let mut last_at = base;

    loop {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tokio::task::yield_now().await;
                continue;
            }
            Err(CameraError::EndOfStream) => break,
            Err(CameraError::Decode { line, reason }) => {
                warn!(line, %reason, "Skipping undecodable frame");
                continue;
            }
            Err(CameraError::Timeout) => {
                debug!("Frame source timed out, waiting for the next frame");
                tokio::task::yield_now().await;
                continue;
            }
            Err(e) => return Err(e).context("frame source failed"),
        };

        let at = base + Duration::from_nanos(frame.timestamp_ns);
        if settings.realtime {
            tokio::time::sleep_until(at).await;
        }
        last_at = last_at.max(at);

        let analysis = dms.analyze_frame(&frame, &mut extractor, at.into_std());
        peak_risk = peak_risk.max(analysis.score.risk);

        if analysis.new_microsleep {
            warn!(count = analysis.microsleep_count, "Microsleep detected");
        }
        if frame.sequence % status_every == 0 {
            info!(
                t = frame.timestamp_secs(),
                score = analysis.score.smoothed,
                risk = %analysis.score.risk,
                trend = %analysis.score.trend,
                perclos = analysis.perclos_pct(),
                profile = analysis.profile.as_str(),
                "Fatigue status"
            );
        } else {
            debug!(sequence = frame.sequence, score = analysis.score.raw, "Frame analyzed");
        }
    }

    if let Some(task) = calibration {
        if task.is_finished() {
            task.await.context("calibration task panicked")?;
        } else {
            warn!("Recording ended before calibration completed");
            task.abort();
        }
    }

    let summary = dms.stop_session(last_at.into_std());
    info!(
        frames = summary.total_frames,
        microsleeps = summary.microsleeps,
        mean_score = summary.mean_score,
        "Session finished"
    );

    Ok(MonitorReport {
        summary,
        profile: handle.current().kind(),
        peak_risk,
    })
}
