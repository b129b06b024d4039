//! Replay of recorded sessions
//!
//! One JSON object per line:
//! `{"t_ms": 33, "metrics": {"ear": 0.3, "mar": 0.2, "pitch_deg": 4.0}}`,
//! `{"t_ms": 66, "landmarks": [{"x": 0.41, "y": 0.37}, ...]}` or
//! `{"t_ms": 99}` for a frame without a face. Blank lines and lines starting
//! with `#` are skipped.

use crate::{CameraError, DeviceSettings, Frame, FrameSource};
use feature_engine::{FaceMetrics, LandmarkSet};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;
use tracing::{debug, info};

/// One recorded frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// Milliseconds since the start of the recording
    pub t_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FaceMetrics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub landmarks: Option<LandmarkSet>,
}

/// Frame source over a recorded session
pub struct ReplaySource<R> {
    lines: Lines<R>,
    line_no: usize,
    sequence: u32,
    settings: DeviceSettings,
}

impl ReplaySource<BufReader<File>> {
    /// Open a recording on disk
    pub fn open<P: AsRef<Path>>(path: P, settings: DeviceSettings) -> Result<Self, CameraError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| CameraError::Open(format!("{}: {}", path.display(), e)))?;
        info!("Replaying recorded session from {}", path.display());
        Ok(Self::from_reader(BufReader::new(file), settings))
    }
}

impl<R: BufRead> ReplaySource<R> {
    pub fn from_reader(reader: R, settings: DeviceSettings) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            sequence: 0,
            settings,
        }
    }

    /// Next record, skipping blank and comment lines
    fn next_record(&mut self) -> Result<ReplayRecord, CameraError> {
        loop {
            let line = self
                .lines
                .next()
                .ok_or(CameraError::EndOfStream)?
                .map_err(|e| CameraError::Stream(e.to_string()))?;
            self.line_no += 1;

            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            return serde_json::from_str(trimmed).map_err(|e| CameraError::Decode {
                line: self.line_no,
                reason: e.to_string(),
            });
        }
    }
}

impl<R: BufRead + Send> FrameSource for ReplaySource<R> {
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let record = self.next_record()?;
        let mut frame = Frame::empty(
            self.settings.width,
            self.settings.height,
            record.t_ms.saturating_mul(1_000_000),
            self.sequence,
        );
        frame.landmarks = record.landmarks;
        frame.metrics = record.metrics;
        self.sequence = self.sequence.wrapping_add(1);

        if frame.landmarks.is_none() && frame.metrics.is_none() {
            debug!("Recorded frame {} has no face", frame.sequence);
        }
        Ok(Some(frame))
    }

    fn max_frame_rate(&self) -> f64 {
        self.settings.effective_fps()
    }

    fn settings(&self) -> &DeviceSettings {
        &self.settings
    }

    fn configure(&mut self, settings: DeviceSettings) -> Result<(), CameraError> {
        if settings.width == 0 || settings.height == 0 {
            return Err(CameraError::Open(format!(
                "invalid resolution {}x{}",
                settings.width, settings.height
            )));
        }
        self.settings = settings;
        Ok(())
    }
}
