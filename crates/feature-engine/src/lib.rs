//! Face Metric Feature Engine
//!
//! Per-frame scalar metrics derived from facial landmarks and the pure
//! functions that turn them into fatigue features:
//! - Metric types shared by alert logic, calibration and scoring
//! - Normalizers mapping raw metrics to a [0, 1] badness score
//! - Descriptive statistics and least-squares slope
//! - One-pole exponential smoothing
//! - Landmark geometry (EAR, MAR, head pitch)

pub mod geometry;
pub mod normalize;
pub mod smoothing;
pub mod statistics;

mod metric;

pub use geometry::{FaceMetrics, GeometryError, LandmarkSet, Point};
pub use metric::{Metric, MetricSample, ThresholdSet, ThresholdSource};
pub use smoothing::Ema;
pub use statistics::{linear_slope, mean, std_dev, StatisticalFeatures};
