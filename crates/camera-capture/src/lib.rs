//! Camera Capture for Driver Monitoring
//!
//! Frame source contract consumed by the fatigue engine.
//! Supports:
//! - Cabin camera device settings (resolution, frame rate, exposure, gain)
//! - Replay of recorded sessions (per-frame landmarks or measurements)

pub mod frame;
pub mod replay;

pub use frame::{Frame, PixelFormat};
pub use replay::{ReplayRecord, ReplaySource};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Capture timeout")]
    Timeout,

    #[error("Frame decode failed at line {line}: {reason}")]
    Decode { line: usize, reason: String },

    #[error("End of stream")]
    EndOfStream,
}

/// Device configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Requested frame rate
    pub fps: f64,
    /// Upper bound the device accepts
    pub max_fps: f64,
    /// Exposure time (microseconds), `None` for auto
    pub exposure_us: Option<f64>,
    /// Analog gain (dB), `None` for auto
    pub gain_db: Option<f64>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 20.0,
            max_fps: 30.0,
            exposure_us: None,
            gain_db: None,
        }
    }
}

impl DeviceSettings {
    /// Frame rate the device will actually deliver
    pub fn effective_fps(&self) -> f64 {
        if self.fps.is_finite() && self.fps > 0.0 {
            self.fps.min(self.max_fps)
        } else {
            self.max_fps
        }
    }
}

/// Anything that yields successive frames
pub trait FrameSource: Send {
    /// Next frame; `Ok(None)` means nothing is ready yet, retry later
    fn next_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Highest frame rate the source can deliver
    fn max_frame_rate(&self) -> f64;

    fn settings(&self) -> &DeviceSettings;

    /// Apply new device settings
    fn configure(&mut self, settings: DeviceSettings) -> Result<(), CameraError>;
}
