//! Detect faces in a photo and cover them with emoji masks.
//!
//! A [`DetectionSession`] decodes and detects on a worker thread; a
//! [`CanvasController`] shows the photo, outlines the faces, lets the user
//! pick a mask per face and hands back a [`MaskExport`] that the session
//! burns into the full-resolution photo.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use facehide::{
//!     CanvasConfig, CanvasController, DetectionSession, FaceDetector, GlyphCatalog,
//!     SessionConfig, SessionEvent, Size,
//! };
//!
//! fn run(detector: Arc<dyn FaceDetector>) -> Result<(), facehide::FaceHideError> {
//!     let catalog = Arc::new(GlyphCatalog::load_dir("glyphs")?);
//!     let session = DetectionSession::new(detector, SessionConfig::new("Pictures"));
//!     let mut canvas = CanvasController::new(Size::new(1080, 1920), CanvasConfig::default());
//!
//!     session.submit_file("photo.jpg");
//!     for event in session.events().iter() {
//!         match event {
//!             SessionEvent::OriginalPhoto { image, .. } => canvas.set_photo(&image)?,
//!             SessionEvent::Faces { result, .. } => {
//!                 canvas.show_faces(&result)?;
//!                 break;
//!             }
//!             _ => {}
//!         }
//!     }
//!     if let Some(export) = canvas.prepare_results() {
//!         session.save("masked", export, catalog);
//!     }
//!     Ok(())
//! }
//! ```

pub mod canvas;
pub mod detector;
mod error;
pub mod geometry;
pub mod orientation;
pub mod overlay;
mod preferences;
pub mod render;
#[cfg(feature = "rustface")]
/// Built-in SeetaFace-based face detector backend.
pub mod rustface_backend;
pub mod session;

pub use canvas::{CanvasConfig, CanvasController, CanvasEvent, Photo, PointerEvent};
pub use detector::{
    DetectionResult, DetectorError, DetectorOptions, FaceDetector, PerformanceMode, RawFace,
};
pub use error::{ErrorKind, FaceHideError};
pub use geometry::{
    centered_offset, detection_scale_factor, detection_size, fit_to_box, map_rect, scale_factor,
    Point, Rect, Size,
};
pub use orientation::{load_oriented, read_rotation, Rotation};
pub use overlay::{ClassificationPolicy, Emoji, FaceOverlay, FaceRegion, MaskExport, PlacedMask};
pub use preferences::Preferences;
pub use render::{composite_masks, frame_color, render, DrawCommand, GlyphCatalog};
#[cfg(feature = "rustface")]
pub use rustface_backend::RustfaceDetector;
pub use session::{
    detect_image, DetectionOutcome, DetectionSession, SaveFormat, SessionConfig, SessionError,
    SessionEvent, Task,
};
