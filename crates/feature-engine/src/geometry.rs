//! Landmark geometry
//!
//! Pure coordinate geometry turning a face-mesh landmark set into the per-frame
//! scalar metrics. Landmark indices follow the 468-point face mesh topology.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Left eye: P1 (outer corner), P2, P3 (upper lid), P4 (inner corner), P5, P6 (lower lid)
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
/// Right eye, same point order as [`LEFT_EYE`]
pub const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];
/// Mouth corners (horizontal span)
pub const MOUTH_LEFT: usize = 61;
pub const MOUTH_RIGHT: usize = 291;
/// Inner lip midpoints (vertical span)
pub const LIP_UPPER: usize = 13;
pub const LIP_LOWER: usize = 14;
pub const NOSE_TIP: usize = 1;
pub const CHIN: usize = 152;

/// Geometry errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    #[error("Landmark {index} missing (set has {len} points)")]
    MissingLandmark { index: usize, len: usize },
}

/// 2-D point
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Normalized landmark coordinates (0-1 in both axes) for one detected face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LandmarkSet {
    points: Vec<Point>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Point, GeometryError> {
        self.points
            .get(index)
            .copied()
            .ok_or(GeometryError::MissingLandmark {
                index,
                len: self.points.len(),
            })
    }

    /// Point scaled to pixel coordinates.
    ///
    /// Coordinates stay fractional and are not snapped to whole pixels, so
    /// small eye and mouth spans keep sub-pixel precision.
    fn pixel(&self, index: usize, width: f64, height: f64) -> Result<Point, GeometryError> {
        let p = self.get(index)?;
        Ok(Point::new(p.x * width, p.y * height))
    }
}

/// Per-frame metrics derived from landmarks
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceMetrics {
    /// Mean of both eyes' aspect ratio
    pub ear: f64,
    pub mar: f64,
    pub pitch_deg: f64,
}

impl FaceMetrics {
    /// Compute EAR (averaged over both eyes), MAR and pitch for a frame
    pub fn from_landmarks(
        landmarks: &LandmarkSet,
        width: u32,
        height: u32,
    ) -> Result<Self, GeometryError> {
        let left = eye_aspect_ratio(landmarks, &LEFT_EYE, width, height)?;
        let right = eye_aspect_ratio(landmarks, &RIGHT_EYE, width, height)?;
        Ok(Self {
            ear: (left + right) / 2.0,
            mar: mouth_aspect_ratio(landmarks, width, height)?,
            pitch_deg: head_pitch(landmarks, width, height)?,
        })
    }
}

/// EAR = (|P2-P6| + |P3-P5|) / (2 |P1-P4|), 0 when the eye has no width
pub fn eye_aspect_ratio(
    landmarks: &LandmarkSet,
    eye: &[usize; 6],
    width: u32,
    height: u32,
) -> Result<f64, GeometryError> {
    let (w, h) = (width as f64, height as f64);
    let mut p = [Point::default(); 6];
    for (slot, &index) in p.iter_mut().zip(eye) {
        *slot = landmarks.pixel(index, w, h)?;
    }

    let horizontal = p[0].distance(&p[3]);
    if horizontal == 0.0 {
        return Ok(0.0);
    }
    Ok((p[1].distance(&p[5]) + p[2].distance(&p[4])) / (2.0 * horizontal))
}

/// MAR = inner-lip vertical distance / mouth-corner horizontal distance
pub fn mouth_aspect_ratio(
    landmarks: &LandmarkSet,
    width: u32,
    height: u32,
) -> Result<f64, GeometryError> {
    let (w, h) = (width as f64, height as f64);
    let horizontal = landmarks
        .pixel(MOUTH_LEFT, w, h)?
        .distance(&landmarks.pixel(MOUTH_RIGHT, w, h)?);
    let vertical = landmarks
        .pixel(LIP_UPPER, w, h)?
        .distance(&landmarks.pixel(LIP_LOWER, w, h)?);

    if horizontal == 0.0 {
        return Ok(0.0);
    }
    Ok(vertical / horizontal)
}

/// Angle in degrees between the nose→chin vector and the image's vertical axis
pub fn head_pitch(landmarks: &LandmarkSet, width: u32, height: u32) -> Result<f64, GeometryError> {
    let (w, h) = (width as f64, height as f64);
    let nose = landmarks.pixel(NOSE_TIP, w, h)?;
    let chin = landmarks.pixel(CHIN, w, h)?;

    let dx = chin.x - nose.x;
    let dy = chin.y - nose.y;
    let magnitude = dx.hypot(dy);
    if magnitude == 0.0 {
        return Ok(0.0);
    }

    let cos_angle = (dy / magnitude).clamp(-1.0, 1.0);
    Ok(cos_angle.acos().to_degrees())
}
