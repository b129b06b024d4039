//! PERCLOS estimator
//!
//! Percentage of eye closure over a rolling window of binary closed/open
//! samples.

use ring_buffer::RingBuffer;
use serde::{Deserialize, Serialize};

/// PERCLOS window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerclosConfig {
    /// Window length (seconds)
    pub window_s: f64,
    /// Expected sample rate (Hz)
    pub sample_rate_hz: f64,
}

impl Default for PerclosConfig {
    fn default() -> Self {
        Self {
            window_s: 60.0,
            sample_rate_hz: 20.0,
        }
    }
}

impl PerclosConfig {
    /// `window_s × sample_rate_hz`, at least one sample
    pub fn capacity(&self) -> usize {
        let samples = (self.window_s * self.sample_rate_hz).floor();
        if samples.is_finite() && samples >= 1.0 {
            samples as usize
        } else {
            1
        }
    }
}

/// Rolling eye-closure window
#[derive(Debug, Clone)]
pub struct PerclosWindow {
    samples: RingBuffer<bool>,
}

impl PerclosWindow {
    pub fn new(config: &PerclosConfig) -> Self {
        Self {
            samples: RingBuffer::new(config.capacity()),
        }
    }

    /// Record one frame: closed when `ear < threshold`
    pub fn update(&mut self, ear: f64, threshold: f64) {
        self.samples.push(ear < threshold);
    }

    /// Closed percentage over the window, 0.0 when empty
    pub fn compute(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let closed = self.samples.iter().filter(|closed| **closed).count();
        100.0 * closed as f64 / self.samples.len() as f64
    }

    /// Samples currently in the window
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.samples.capacity()
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
