//! Active calibration profile shared between the engine and calibration
//!
//! A single writer replaces the whole profile at once; readers take one
//! `Arc` per frame so alert logic and scoring see the same profile for the
//! whole evaluation.

use crate::advanced::AdvancedProfile;
use crate::config::AdvancedCalibrationConfig;
use crate::simple::SimpleProfile;
use crate::snapshot::ProfileSnapshot;
use crate::CalibrationError;
use feature_engine::ThresholdSource;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// Which strategy the active profile uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileKind {
    Static,
    Simple,
    Advanced,
}

impl ProfileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProfileKind::Static => "static",
            ProfileKind::Simple => "simple",
            ProfileKind::Advanced => "advanced",
        }
    }
}

/// Calibration profile in effect
#[derive(Debug, Clone, Default)]
pub enum ActiveProfile {
    /// Configured defaults only
    #[default]
    Static,
    Simple(SimpleProfile),
    Advanced(AdvancedProfile),
}

impl ActiveProfile {
    pub fn kind(&self) -> ProfileKind {
        match self {
            ActiveProfile::Static => ProfileKind::Static,
            ActiveProfile::Simple(_) => ProfileKind::Simple,
            ActiveProfile::Advanced(_) => ProfileKind::Advanced,
        }
    }

    /// The learned scorer, if this profile has a usable one
    pub fn learned_scorer(&self) -> Option<&AdvancedProfile> {
        match self {
            ActiveProfile::Advanced(profile) if profile.has_model() => Some(profile),
            _ => None,
        }
    }
}

impl ThresholdSource for ActiveProfile {
    fn ear_threshold(&self) -> Option<f64> {
        match self {
            ActiveProfile::Static => None,
            ActiveProfile::Simple(p) => p.ear_threshold(),
            ActiveProfile::Advanced(p) => p.ear_threshold(),
        }
    }

    fn mar_threshold(&self) -> Option<f64> {
        match self {
            ActiveProfile::Static => None,
            ActiveProfile::Simple(p) => p.mar_threshold(),
            ActiveProfile::Advanced(p) => p.mar_threshold(),
        }
    }

    fn pitch_threshold(&self) -> Option<f64> {
        match self {
            ActiveProfile::Static => None,
            ActiveProfile::Simple(p) => p.pitch_threshold(),
            ActiveProfile::Advanced(p) => p.pitch_threshold(),
        }
    }
}

/// Writer side of the active profile
#[derive(Debug, Clone)]
pub struct ProfileHandle {
    tx: Arc<watch::Sender<Arc<ActiveProfile>>>,
}

impl Default for ProfileHandle {
    fn default() -> Self {
        Self::new(ActiveProfile::Static)
    }
}

impl ProfileHandle {
    pub fn new(initial: ActiveProfile) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> ProfileReader {
        ProfileReader {
            rx: self.tx.subscribe(),
        }
    }

    pub fn current(&self) -> Arc<ActiveProfile> {
        self.tx.borrow().clone()
    }

    /// Atomically install a new profile
    pub fn replace(&self, profile: ActiveProfile) {
        let kind = profile.kind();
        let previous = self.tx.send_replace(Arc::new(profile));
        info!("Active calibration profile: {} -> {}", previous.kind().as_str(), kind.as_str());
    }

    /// Return to the configured static thresholds
    pub fn reset_to_defaults(&self) {
        self.replace(ActiveProfile::Static);
    }

    /// Install an advanced profile read from a snapshot file.
    ///
    /// On any error the current profile stays active.
    pub fn load_snapshot<P: AsRef<Path>>(
        &self,
        path: P,
        config: AdvancedCalibrationConfig,
        now: Instant,
    ) -> Result<(), CalibrationError> {
        let path = path.as_ref();
        let profile = ProfileSnapshot::load(path)
            .and_then(|snapshot| AdvancedProfile::from_snapshot(&snapshot, config, now))
            .map_err(|e| {
                warn!("Failed to load calibration snapshot {}: {}", path.display(), e);
                e
            })?;
        self.replace(ActiveProfile::Advanced(profile));
        Ok(())
    }
}

/// Reader side of the active profile
#[derive(Debug, Clone)]
pub struct ProfileReader {
    rx: watch::Receiver<Arc<ActiveProfile>>,
}

impl ProfileReader {
    /// Profile to use for one evaluation
    pub fn current(&self) -> Arc<ActiveProfile> {
        self.rx.borrow().clone()
    }

    /// Whether a new profile was installed since the last `mark_seen`
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    pub fn mark_seen(&mut self) {
        self.rx.borrow_and_update();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::SimplePhase;
    use std::fs;

    fn simple_profile() -> SimpleProfile {
        let mut profile = SimpleProfile::new();
        profile.set_samples(SimplePhase::EyesOpen, [0.35]);
        profile.set_samples(SimplePhase::EyesClosed, [0.15]);
        profile.compute_thresholds();
        profile
    }

    #[test]
    fn test_static_profile_has_no_thresholds() {
        let profile = ActiveProfile::Static;
        assert_eq!(profile.ear_threshold(), None);
        assert!(profile.learned_scorer().is_none());
        assert_eq!(profile.kind(), ProfileKind::Static);
    }

    #[test]
    fn test_replace_visible_to_readers() {
        let handle = ProfileHandle::default();
        let mut reader = handle.subscribe();
        let before = reader.current();

        handle.replace(ActiveProfile::Simple(simple_profile()));

        assert!(reader.has_changed());
        let after = reader.current();
        reader.mark_seen();
        assert!(!reader.has_changed());

        // The earlier snapshot is unaffected
        assert_eq!(before.kind(), ProfileKind::Static);
        assert_eq!(after.kind(), ProfileKind::Simple);
        assert!((after.ear_threshold().unwrap() - 0.27).abs() < 1e-9);
    }

    #[test]
    fn test_reset_to_defaults() {
        let handle = ProfileHandle::new(ActiveProfile::Simple(simple_profile()));
        handle.reset_to_defaults();
        assert_eq!(handle.current().kind(), ProfileKind::Static);
    }

    #[test]
    fn test_advanced_without_model_is_not_a_scorer() {
        let profile = ActiveProfile::Advanced(AdvancedProfile::new(
            AdvancedCalibrationConfig::default(),
            Instant::now(),
        ));
        assert!(profile.learned_scorer().is_none());
        assert_eq!(profile.pitch_threshold(), None);
    }

    #[test]
    fn test_bad_snapshot_keeps_previous_profile() {
        let dir = std::env::temp_dir().join(format!("calibration-profile-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        fs::write(&path, "{ not json").unwrap();

        let handle = ProfileHandle::new(ActiveProfile::Simple(simple_profile()));
        let result = handle.load_snapshot(&path, AdvancedCalibrationConfig::default(), Instant::now());

        assert!(result.is_err());
        assert_eq!(handle.current().kind(), ProfileKind::Simple);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unnormalized_snapshot_keeps_previous_profile() {
        let dir = std::env::temp_dir().join(format!("calibration-profile-weights-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("advanced.json");
        fs::write(
            &path,
            r#"{
                "thresholds": {
                    "ear": {"enter_hi": 0.24, "exit_lo": 0.3},
                    "mar": {"enter_hi": 0.3, "exit_lo": 0.1}
                },
                "weights": {"ear": 3.0, "mar": 2.0},
                "metrics_names": ["ear", "mar"]
            }"#,
        )
        .unwrap();

        let handle = ProfileHandle::new(ActiveProfile::Simple(simple_profile()));
        let result = handle.load_snapshot(&path, AdvancedCalibrationConfig::default(), Instant::now());

        assert!(matches!(result, Err(CalibrationError::Snapshot(_))));
        assert_eq!(handle.current().kind(), ProfileKind::Simple);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_snapshot_installs_advanced_profile() {
        let dir = std::env::temp_dir().join(format!("calibration-profile-ok-{}", std::process::id()));
        let path = dir.join("advanced.json");
        let snapshot = ProfileSnapshot::from_json(
            r#"{
                "thresholds": {"ear": {"enter_hi": 0.24, "exit_lo": 0.3}},
                "weights": {"ear": 1.0},
                "metrics_names": ["ear"],
                "pitch_baseline": 3.0
            }"#,
        )
        .unwrap();
        snapshot.save(&path).unwrap();

        let handle = ProfileHandle::default();
        handle
            .load_snapshot(&path, AdvancedCalibrationConfig::default(), Instant::now())
            .unwrap();

        let current = handle.current();
        assert_eq!(current.kind(), ProfileKind::Advanced);
        assert!(current.learned_scorer().is_some());
        assert_eq!(current.ear_threshold(), Some(0.24));
        assert_eq!(current.mar_threshold(), None);
        fs::remove_dir_all(&dir).unwrap();
    }
}
