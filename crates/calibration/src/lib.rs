//! Driver Calibration
//!
//! Personalizes fatigue thresholds for the current driver:
//! - Simple profile: four short phases, EAR/MAR thresholds by interpolation
//! - Advanced profile: three cognitive states, per-metric thresholds and
//!   discriminative weights, learned scoring function
//! - Tick-driven phase collection, deterministic under test
//! - Background runners on the tokio runtime
//! - Atomically swappable active profile shared with the engine
//! - JSON snapshot persistence of the advanced model

pub mod advanced;
pub mod collector;
pub mod config;
pub mod profile;
pub mod runner;
pub mod simple;
pub mod snapshot;

pub use advanced::{AdvancedCalibration, AdvancedProfile, CognitiveState, ThresholdPair};
pub use collector::{CollectionStatus, PhaseCollector};
pub use config::{AdvancedCalibrationConfig, CalibrationConfig, SimpleCalibrationConfig};
pub use profile::{ActiveProfile, ProfileHandle, ProfileKind, ProfileReader};
pub use runner::{CalibrationController, CalibrationEvent, CalibrationPhase};
pub use simple::{SimpleCalibration, SimplePhase, SimpleProfile};
pub use snapshot::ProfileSnapshot;

use thiserror::Error;

/// Calibration error types
#[derive(Error, Debug)]
pub enum CalibrationError {
    #[error("Phase {0} is already collecting")]
    AlreadyCollecting(String),

    #[error("A calibration session is already in progress")]
    SessionInProgress,

    #[error("No calibration phase left to start")]
    NoPendingPhase,

    #[error("Insufficient calibration samples: {0}")]
    InsufficientSamples(String),

    #[error("Invalid calibration snapshot: {0}")]
    Snapshot(String),

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}
