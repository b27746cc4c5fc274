use image::DynamicImage;
use thiserror::Error;

use crate::geometry::{Rect, Size};

/// Detection speed/accuracy trade-off requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PerformanceMode {
    #[default]
    Fast,
    Accurate,
}

/// Options handed through to the detection backend unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorOptions {
    pub performance: PerformanceMode,
    pub landmarks: bool,
    pub contours: bool,
    /// Ask the backend for a smiling probability per face.
    pub classification: bool,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            performance: PerformanceMode::Fast,
            landmarks: false,
            contours: false,
            classification: true,
        }
    }
}

/// One face reported by a detector, in the submitted bitmap's pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFace {
    pub bounds: Rect,
    /// Smiling probability in `[0, 1]`, `None` when the backend could not
    /// classify the face.
    pub smiling: Option<f32>,
}

impl RawFace {
    pub fn new(bounds: Rect, smiling: Option<f32>) -> Self {
        Self { bounds, smiling }
    }

    /// Build from a backend that reports `-1` for an unavailable score.
    pub fn with_raw_score(bounds: Rect, score: f32) -> Self {
        let smiling = (0.0..=1.0).contains(&score).then_some(score);
        Self { bounds, smiling }
    }
}

/// Faces found in one detection call together with the resolution of the
/// bitmap they were found in.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionResult {
    pub size: Size,
    pub faces: Vec<RawFace>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DetectorError {
    #[error("detection cancelled")]
    Cancelled,

    #[error("detection failed: {0}")]
    Failed(String),
}

/// Pluggable face detection backend.
///
/// Implement this trait to plug in any vision service (on-device model,
/// platform SDK, remote API) and pass it to
/// [`crate::DetectionSession::new`]. Calls happen on the session's worker
/// thread.
pub trait FaceDetector: Send + Sync {
    /// Detect faces in `image`. Bounding boxes are in `image` pixel space.
    fn detect(
        &self,
        image: &DynamicImage,
        options: &DetectorOptions,
    ) -> Result<Vec<RawFace>, DetectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_score_is_unavailable() {
        let face = RawFace::with_raw_score(Rect::new(0, 0, 10, 10), -1.0);
        assert_eq!(face.smiling, None);
    }

    #[test]
    fn valid_score_is_kept() {
        let face = RawFace::with_raw_score(Rect::new(0, 0, 10, 10), 0.75);
        assert_eq!(face.smiling, Some(0.75));
        let edge = RawFace::with_raw_score(Rect::new(0, 0, 10, 10), 0.0);
        assert_eq!(edge.smiling, Some(0.0));
    }

    #[test]
    fn default_options_request_classification() {
        let options = DetectorOptions::default();
        assert!(options.classification);
        assert_eq!(options.performance, PerformanceMode::Fast);
    }
}
