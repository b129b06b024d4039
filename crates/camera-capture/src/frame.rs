//! Video frame types

use feature_engine::{FaceMetrics, LandmarkSet};

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mono8,
    BayerRg8,
    Rgb24,
    /// No pixel payload (replayed frame)
    None,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Mono8 | PixelFormat::BayerRg8 => 1,
            PixelFormat::Rgb24 => 3,
            PixelFormat::None => 0,
        }
    }
}

/// Captured video frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data
    pub data: Vec<u8>,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// Capture timestamp (nanoseconds since stream start)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
    /// Landmarks recorded with the frame
    pub landmarks: Option<LandmarkSet>,
    /// Measurements recorded with the frame
    pub metrics: Option<FaceMetrics>,
}

impl Frame {
    /// Create a frame from raw pixel data
    pub fn new(data: Vec<u8>, format: PixelFormat, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            format,
            width,
            height,
            timestamp_ns,
            sequence,
            landmarks: None,
            metrics: None,
        }
    }

    /// Frame without pixels, as produced by replay
    pub fn empty(width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self::new(Vec::new(), PixelFormat::None, width, height, timestamp_ns, sequence)
    }

    pub fn with_landmarks(mut self, landmarks: LandmarkSet) -> Self {
        self.landmarks = Some(landmarks);
        self
    }

    pub fn with_metrics(mut self, metrics: FaceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pixel data matches the declared geometry
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Capture time in seconds since stream start
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ns as f64 / 1e9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_completeness() {
        let frame = Frame::new(vec![0; 640 * 480], PixelFormat::Mono8, 640, 480, 0, 0);
        assert!(frame.is_complete());

        let truncated = Frame::new(vec![0; 100], PixelFormat::Rgb24, 640, 480, 0, 1);
        assert!(!truncated.is_complete());

        assert!(Frame::empty(640, 480, 0, 2).is_complete());
    }

    #[test]
    fn test_timestamp_secs() {
        let frame = Frame::empty(640, 480, 1_500_000_000, 0);
        assert!((frame.timestamp_secs() - 1.5).abs() < 1e-12);
    }
}
