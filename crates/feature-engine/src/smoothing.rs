//! Exponential smoothing

use serde::{Deserialize, Serialize};

/// One-pole exponential moving average, seeded with the first sample
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ema {
    /// Weight of the newest sample (0-1)
    alpha: f64,
    /// Current estimate, `None` until the first sample
    value: Option<f64>,
}

impl Ema {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            value: None,
        }
    }

    /// Feed a sample and return the smoothed value
    pub fn update(&mut self, sample: f64) -> f64 {
        let next = match self.value {
            Some(prev) => self.alpha * sample + (1.0 - self.alpha) * prev,
            None => sample,
        };
        self.value = Some(next);
        next
    }

    /// Force the estimate to a value (bypassing the filter)
    pub fn snap(&mut self, sample: f64) -> f64 {
        self.value = Some(sample);
        sample
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_with_first_sample() {
        let mut ema = Ema::new(0.4);
        assert_eq!(ema.value(), None);
        assert_eq!(ema.update(50.0), 50.0);
    }

    #[test]
    fn test_recursive_update() {
        let mut ema = Ema::new(0.4);
        ema.update(50.0);
        let v = ema.update(0.0);
        assert!((v - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_snap_and_reset() {
        let mut ema = Ema::new(0.3);
        ema.update(10.0);
        assert_eq!(ema.snap(90.0), 90.0);
        assert!((ema.update(80.0) - 87.0).abs() < 1e-9);
        ema.reset();
        assert_eq!(ema.value(), None);
    }
}
