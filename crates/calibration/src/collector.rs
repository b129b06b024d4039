//! Tick-driven timed sample collection
//!
//! A collection phase runs for a fixed duration and polls the current metrics
//! every `interval`. The collector is advanced by explicit `tick` calls, so the
//! same state machine serves the per-frame engine loop and the async runners.

use crate::CalibrationError;
use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Collection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus<P> {
    Idle,
    Collecting(P),
    Done(P),
}

/// Timed sample collector for one phase at a time
#[derive(Debug)]
pub struct PhaseCollector<P, S> {
    status: CollectionStatus<P>,
    interval: Duration,
    duration: Duration,
    started_at: Option<Instant>,
    next_poll: Option<Instant>,
    samples: Vec<S>,
}

impl<P: Copy + PartialEq + Display, S> PhaseCollector<P, S> {
    /// Create an idle collector polling every `interval`
    pub fn new(interval: Duration) -> Self {
        Self {
            status: CollectionStatus::Idle,
            interval: interval.max(Duration::from_millis(1)),
            duration: Duration::ZERO,
            started_at: None,
            next_poll: None,
            samples: Vec::new(),
        }
    }

    /// Begin collecting `phase` for `duration`.
    ///
    /// Fails while any phase is still collecting.
    pub fn start(&mut self, phase: P, duration: Duration, now: Instant) -> Result<(), CalibrationError> {
        if let CollectionStatus::Collecting(current) = self.status {
            return Err(CalibrationError::AlreadyCollecting(current.to_string()));
        }

        info!("Collecting calibration phase {} for {:?}", phase, duration);
        self.status = CollectionStatus::Collecting(phase);
        self.duration = duration;
        self.started_at = Some(now);
        self.next_poll = Some(now);
        self.samples.clear();
        Ok(())
    }

    /// Advance the collector.
    ///
    /// `sample` is the current metric reading, `None` when unavailable (no
    /// face). Returns the finished phase and its samples once the duration has
    /// elapsed.
    pub fn tick(&mut self, now: Instant, sample: Option<S>) -> Option<(P, Vec<S>)> {
        let CollectionStatus::Collecting(phase) = self.status else {
            return None;
        };
        let started_at = self.started_at?;

        if now.saturating_duration_since(started_at) >= self.duration {
            self.status = CollectionStatus::Done(phase);
            self.started_at = None;
            self.next_poll = None;
            let samples = std::mem::take(&mut self.samples);
            info!("Calibration phase {} collected {} samples", phase, samples.len());
            return Some((phase, samples));
        }

        // No further polls once the schedule runs past the end of time
        let next_poll = self.next_poll?;
        if now >= next_poll {
            match sample {
                Some(s) => self.samples.push(s),
                None => debug!("No metrics available, skipping calibration sample"),
            }
            let mut next = next_poll.checked_add(self.interval);
            while let Some(at) = next.filter(|at| *at <= now) {
                next = at.checked_add(self.interval);
            }
            self.next_poll = next;
        }
        None
    }

    pub fn status(&self) -> CollectionStatus<P> {
        self.status
    }

    /// Phase currently being collected
    pub fn current_phase(&self) -> Option<P> {
        match self.status {
            CollectionStatus::Collecting(phase) => Some(phase),
            _ => None,
        }
    }

    pub fn is_collecting(&self) -> bool {
        matches!(self.status, CollectionStatus::Collecting(_))
    }

    /// Samples gathered so far in the running phase
    pub fn pending_samples(&self) -> usize {
        self.samples.len()
    }

    /// Time left in the running phase
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let started_at = self.started_at?;
        Some(self.duration.saturating_sub(now.saturating_duration_since(started_at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Phase;

    impl Display for Phase {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("phase")
        }
    }

    #[test]
    fn test_collects_at_poll_interval() {
        let mut collector = PhaseCollector::<Phase, f64>::new(Duration::from_millis(50));
        let start = Instant::now();
        collector.start(Phase, Duration::from_secs(1), start).unwrap();

        // Ticked every 10 ms: only one sample per 50 ms is taken
        let mut finished = None;
        for i in 0..=100u32 {
            if let Some(done) = collector.tick(start + Duration::from_millis(10) * i, Some(0.3)) {
                finished = Some(done);
                break;
            }
        }

        let (phase, samples) = finished.unwrap();
        assert_eq!(phase, Phase);
        assert_eq!(samples.len(), 20);
        assert_eq!(collector.status(), CollectionStatus::Done(Phase));
    }

    #[test]
    fn test_missing_metrics_are_skipped() {
        let mut collector = PhaseCollector::<Phase, f64>::new(Duration::from_millis(100));
        let start = Instant::now();
        collector.start(Phase, Duration::from_millis(500), start).unwrap();

        for i in 0..5u32 {
            let sample = (i % 2 == 0).then_some(1.0);
            collector.tick(start + Duration::from_millis(100) * i, sample);
        }
        assert_eq!(collector.pending_samples(), 3);

        let (_, samples) = collector.tick(start + Duration::from_millis(500), Some(1.0)).unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn test_cannot_restart_while_collecting() {
        let mut collector = PhaseCollector::<Phase, f64>::new(Duration::from_millis(50));
        let start = Instant::now();
        collector.start(Phase, Duration::from_secs(1), start).unwrap();

        let err = collector.start(Phase, Duration::from_secs(1), start).unwrap_err();
        assert!(matches!(err, CalibrationError::AlreadyCollecting(_)));

        collector.tick(start + Duration::from_secs(1), None);
        assert!(collector.start(Phase, Duration::from_secs(1), start).is_ok());
    }

    #[test]
    fn test_unbounded_interval_polls_once() {
        let mut collector = PhaseCollector::<Phase, f64>::new(Duration::MAX);
        let start = Instant::now();
        collector.start(Phase, Duration::from_secs(1), start).unwrap();

        for i in 0..10u32 {
            collector.tick(start + Duration::from_millis(100) * i, Some(0.5));
        }
        assert_eq!(collector.pending_samples(), 1);

        let (_, samples) = collector.tick(start + Duration::from_secs(1), Some(0.5)).unwrap();
        assert_eq!(samples, vec![0.5]);
    }

    #[test]
    fn test_idle_tick_is_noop() {
        let mut collector = PhaseCollector::<Phase, f64>::new(Duration::from_millis(50));
        assert!(collector.tick(Instant::now(), Some(1.0)).is_none());
        assert_eq!(collector.status(), CollectionStatus::Idle);
        assert_eq!(collector.remaining(Instant::now()), None);
    }
}
