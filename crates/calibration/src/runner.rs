//! Background calibration runners
//!
//! Each session runs as one tokio task that ticks the session state machine
//! at the poll interval, reading the engine's published metrics. On
//! completion the resulting profile is installed through the
//! [`ProfileHandle`]. Only one session may run at a time.

use crate::advanced::{AdvancedCalibration, CognitiveState};
use crate::config::CalibrationConfig;
use crate::profile::{ActiveProfile, ProfileHandle, ProfileKind};
use crate::simple::{SimpleCalibration, SimplePhase};
use crate::CalibrationError;
use feature_engine::MetricSample;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

/// A phase of either calibration flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    Simple(SimplePhase),
    Advanced(CognitiveState),
}

impl fmt::Display for CalibrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationPhase::Simple(phase) => write!(f, "simple/{}", phase),
            CalibrationPhase::Advanced(state) => write!(f, "advanced/{}", state),
        }
    }
}

/// Progress notifications from a running session
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationEvent {
    PhaseStarted(CalibrationPhase),
    PhaseFinished { phase: CalibrationPhase, samples: usize },
    /// The new profile is active
    Completed(ProfileKind),
    /// The session ended without installing a profile
    Failed(String),
}

/// Common surface of the two calibration sessions
trait TimedSession {
    type Phase: Copy;

    fn start_next_phase(&mut self, now: Instant) -> Result<Self::Phase, CalibrationError>;
    fn tick(&mut self, now: Instant, metrics: Option<&MetricSample>) -> Option<Self::Phase>;
    fn collected(&self, phase: Self::Phase) -> usize;
    fn label(phase: Self::Phase) -> CalibrationPhase;
}

impl TimedSession for SimpleCalibration {
    type Phase = SimplePhase;

    fn start_next_phase(&mut self, now: Instant) -> Result<SimplePhase, CalibrationError> {
        SimpleCalibration::start_next_phase(self, now)
    }

    fn tick(&mut self, now: Instant, metrics: Option<&MetricSample>) -> Option<SimplePhase> {
        SimpleCalibration::tick(self, now, metrics)
    }

    fn collected(&self, phase: SimplePhase) -> usize {
        self.profile().samples(phase).len()
    }

    fn label(phase: SimplePhase) -> CalibrationPhase {
        CalibrationPhase::Simple(phase)
    }
}

impl TimedSession for AdvancedCalibration {
    type Phase = CognitiveState;

    fn start_next_phase(&mut self, now: Instant) -> Result<CognitiveState, CalibrationError> {
        AdvancedCalibration::start_next_phase(self, now)
    }

    fn tick(&mut self, now: Instant, metrics: Option<&MetricSample>) -> Option<CognitiveState> {
        AdvancedCalibration::tick(self, now, metrics)
    }

    fn collected(&self, state: CognitiveState) -> usize {
        self.profile().samples(state).len()
    }

    fn label(state: CognitiveState) -> CalibrationPhase {
        CalibrationPhase::Advanced(state)
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Drive every phase of `session` to completion
async fn run_phases<S, F>(
    session: &mut S,
    poll: Duration,
    metrics: &watch::Receiver<Option<MetricSample>>,
    on_event: &mut F,
) where
    S: TimedSession,
    F: FnMut(CalibrationEvent),
{
    let mut ticker = interval(poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while let Ok(phase) = session.start_next_phase(now()) {
        on_event(CalibrationEvent::PhaseStarted(S::label(phase)));
        loop {
            ticker.tick().await;
            let current = *metrics.borrow();
            if let Some(done) = session.tick(now(), current.as_ref()) {
                on_event(CalibrationEvent::PhaseFinished {
                    phase: S::label(done),
                    samples: session.collected(done),
                });
                break;
            }
        }
    }
}

/// Clears the busy flag when the session task ends
struct SessionGuard(Arc<AtomicBool>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Starts calibration sessions and installs their profiles
#[derive(Debug, Clone)]
pub struct CalibrationController {
    handle: ProfileHandle,
    config: CalibrationConfig,
    busy: Arc<AtomicBool>,
}

impl CalibrationController {
    pub fn new(handle: ProfileHandle, config: CalibrationConfig) -> Self {
        Self {
            handle,
            config,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    pub fn handle(&self) -> &ProfileHandle {
        &self.handle
    }

    fn acquire(&self) -> Result<SessionGuard, CalibrationError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| CalibrationError::SessionInProgress)?;
        Ok(SessionGuard(self.busy.clone()))
    }

    /// Run the four-phase simple calibration in the background
    pub fn start_simple<F>(
        &self,
        metrics: watch::Receiver<Option<MetricSample>>,
        mut on_event: F,
    ) -> Result<JoinHandle<()>, CalibrationError>
    where
        F: FnMut(CalibrationEvent) + Send + 'static,
    {
        let guard = self.acquire()?;
        let handle = self.handle.clone();
        let config = self.config.simple.clone();

        Ok(tokio::spawn(async move {
            let _guard = guard;
            info!("Simple calibration started");

            let mut session = SimpleCalibration::new(config.clone());
            run_phases(&mut session, config.poll_interval(), &metrics, &mut on_event).await;

            let profile = session.finish();
            handle.replace(ActiveProfile::Simple(profile));
            on_event(CalibrationEvent::Completed(ProfileKind::Simple));
        }))
    }

    /// Run the three-state advanced calibration in the background.
    ///
    /// The learned model is saved to `snapshot_path` when one is configured.
    pub fn start_advanced<F>(
        &self,
        metrics: watch::Receiver<Option<MetricSample>>,
        mut on_event: F,
    ) -> Result<JoinHandle<()>, CalibrationError>
    where
        F: FnMut(CalibrationEvent) + Send + 'static,
    {
        let guard = self.acquire()?;
        let handle = self.handle.clone();
        let config = self.config.clone();

        Ok(tokio::spawn(async move {
            let _guard = guard;
            info!("Advanced calibration started");

            let mut session = AdvancedCalibration::new(config.advanced.clone(), now());
            let poll = config.advanced.sample_interval().max(Duration::from_millis(1));
            run_phases(&mut session, poll, &metrics, &mut on_event).await;

            let profile = match session.finish() {
                Ok(profile) => profile,
                Err(e) => {
                    error!("Advanced calibration failed: {}", e);
                    on_event(CalibrationEvent::Failed(e.to_string()));
                    return;
                }
            };

            if let Some(path) = config.snapshot_path.as_ref() {
                if let Err(e) = profile.to_snapshot().and_then(|s| s.save(path)) {
                    warn!("Could not save calibration snapshot {}: {}", path.display(), e);
                }
            }

            handle.replace(ActiveProfile::Advanced(profile));
            on_event(CalibrationEvent::Completed(ProfileKind::Advanced));
        }))
    }
}
