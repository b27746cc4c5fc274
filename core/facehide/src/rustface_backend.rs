use std::io::Cursor;
use std::path::Path;

use image::DynamicImage;
use log::debug;

use crate::detector::{DetectorError, DetectorOptions, FaceDetector, PerformanceMode, RawFace};
use crate::error::FaceHideError;
use crate::geometry::Rect;

/// Face detector backed by the `rustface` crate (SeetaFace engine).
///
/// SeetaFace only finds bounding boxes, so every face it reports has no
/// smiling score and is classified with the fallback glyph.
pub struct RustfaceDetector {
    model: rustface::Model,
}

impl RustfaceDetector {
    /// Load a SeetaFace model from its serialized bytes.
    pub fn from_bytes(model: &[u8]) -> Result<Self, FaceHideError> {
        let model = rustface::read_model(Cursor::new(model))
            .map_err(|e| FaceHideError::Detection(format!("failed to load model: {e}")))?;
        Ok(Self { model })
    }

    /// Load a SeetaFace model file such as `seeta_fd_frontal_v1.0.bin`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, FaceHideError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| FaceHideError::Detection(format!("{}: {e}", path.display())))?;
        Self::from_bytes(&bytes)
    }
}

impl FaceDetector for RustfaceDetector {
    fn detect(
        &self,
        image: &DynamicImage,
        options: &DetectorOptions,
    ) -> Result<Vec<RawFace>, DetectorError> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();

        let mut detector = rustface::create_detector_with_model(self.model.clone());
        detector.set_min_face_size(20);
        detector.set_score_thresh(2.0);
        detector.set_pyramid_scale_factor(0.8);
        match options.performance {
            PerformanceMode::Fast => detector.set_slide_window_step(4, 4),
            PerformanceMode::Accurate => detector.set_slide_window_step(2, 2),
        }

        let faces = detector.detect(&rustface::ImageData::new(gray.as_raw(), width, height));
        debug!("rustface: {} faces in {width}x{height}", faces.len());

        Ok(faces
            .iter()
            .map(|face| {
                let bbox = face.bbox();
                let rect = Rect::new(
                    bbox.x(),
                    bbox.y(),
                    bbox.x() + bbox.width() as i32,
                    bbox.y() + bbox.height() as i32,
                );
                RawFace::new(rect, None)
            })
            .collect())
    }
}
