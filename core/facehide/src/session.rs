//! Background detection and saving.
//!
//! A [`DetectionSession`] owns one worker thread. Callers submit photos from
//! the interactive thread and drain [`SessionEvent`]s and [`SessionError`]s
//! from two channels, applying them to a [`crate::CanvasController`] on the
//! same interactive thread.
//!
//! Every submission gets a generation number. A newer submission (or
//! [`DetectionSession::clear`]) makes older generations stale: stale work
//! that has not started is skipped, and results of stale work already in
//! the detector are dropped. Each submission still publishes exactly one
//! `Loading { active: false }`.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, RgbImage, RgbaImage};
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::detector::{DetectionResult, DetectorError, DetectorOptions, FaceDetector};
use crate::error::{ErrorKind, FaceHideError};
use crate::geometry::{detection_size, Size};
use crate::orientation::load_oriented;
use crate::overlay::MaskExport;
use crate::render::{composite_masks, GlyphCatalog};

/// Smaller-side limit of the bitmap handed to the detector.
const DEFAULT_MAX_DETECTION_SIDE: u32 = 1024;

/// Sub-directory of the pictures directory that receives saved photos.
const DEFAULT_APP_DIR: &str = "FaceHide";

const JPEG_QUALITY: u8 = 100;

/// File format of saved photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Jpeg,
    Png,
}

impl SaveFormat {
    pub fn extension(self) -> &'static str {
        match self {
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Png => "png",
        }
    }
}

/// Settings for a [`DetectionSession`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    max_detection_side: u32,
    detector_options: DetectorOptions,
    pictures_dir: PathBuf,
    app_dir: String,
    format: SaveFormat,
}

impl SessionConfig {
    /// Saved photos go to `<pictures_dir>/FaceHide/` by default.
    pub fn new(pictures_dir: impl Into<PathBuf>) -> Self {
        Self {
            max_detection_side: DEFAULT_MAX_DETECTION_SIDE,
            detector_options: DetectorOptions::default(),
            pictures_dir: pictures_dir.into(),
            app_dir: DEFAULT_APP_DIR.to_string(),
            format: SaveFormat::default(),
        }
    }

    /// Limit for the smaller side of the detection bitmap (default: 1024).
    pub fn max_detection_side(mut self, side: u32) -> Self {
        self.max_detection_side = side;
        self
    }

    pub fn detector_options(mut self, options: DetectorOptions) -> Self {
        self.detector_options = options;
        self
    }

    /// Sub-directory name under the pictures directory (default: `FaceHide`).
    pub fn app_dir(mut self, name: impl Into<String>) -> Self {
        self.app_dir = name.into();
        self
    }

    /// Saved file format (default: JPEG).
    pub fn format(mut self, format: SaveFormat) -> Self {
        self.format = format;
        self
    }

    /// Directory saved photos are written to.
    pub fn output_dir(&self) -> PathBuf {
        self.pictures_dir.join(&self.app_dir)
    }
}

/// Which piece of background work a loading flag or error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Detection(u64),
    Save,
}

/// Results published by the session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Loading {
        task: Task,
        active: bool,
    },
    /// The full-resolution, upright photo of a submission.
    OriginalPhoto {
        generation: u64,
        image: Arc<DynamicImage>,
    },
    Faces {
        generation: u64,
        result: DetectionResult,
    },
    Saved {
        path: PathBuf,
    },
    Cleared,
}

/// A user-visible failure, published separately from [`SessionEvent`]s.
#[derive(Debug)]
pub struct SessionError {
    pub task: Task,
    pub error: FaceHideError,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

/// Terminal outcome of one detector call.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    Faces(DetectionResult),
    NoFaces,
    Cancelled,
    Failed(String),
}

/// Downscale `image` for detection and run `detector` on it.
///
/// The returned result carries the size of the bitmap actually submitted,
/// which is what face rectangles are relative to.
pub fn detect_image(
    detector: &dyn FaceDetector,
    image: &DynamicImage,
    max_side: u32,
    options: &DetectorOptions,
) -> DetectionOutcome {
    let source = Size::new(image.width(), image.height());
    if let Err(e) = source.ensure_positive() {
        return DetectionOutcome::Failed(e.to_string());
    }

    let size = detection_size(source, max_side);
    let scaled;
    let input = if size == source {
        image
    } else {
        scaled = image.resize_exact(size.width, size.height, FilterType::Triangle);
        &scaled
    };
    debug!(
        "detect_image: {}x{} submitted as {}x{}",
        source.width, source.height, size.width, size.height
    );

    match detector.detect(input, options) {
        Ok(faces) if faces.is_empty() => DetectionOutcome::NoFaces,
        Ok(faces) => DetectionOutcome::Faces(DetectionResult { size, faces }),
        Err(DetectorError::Cancelled) => DetectionOutcome::Cancelled,
        Err(DetectorError::Failed(cause)) => DetectionOutcome::Failed(cause),
    }
}

enum Command {
    Detect {
        generation: u64,
        image: DynamicImage,
    },
    DetectFile {
        generation: u64,
        path: PathBuf,
    },
    Save {
        file_name: String,
        original: Arc<DynamicImage>,
        export: MaskExport,
        catalog: Arc<GlyphCatalog>,
    },
    Shutdown,
}

#[derive(Clone)]
struct Publisher {
    events: Sender<SessionEvent>,
    errors: Sender<SessionError>,
}

impl Publisher {
    // Send failures only mean nobody is listening any more.
    fn event(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn error(&self, task: Task, error: FaceHideError) {
        let _ = self.errors.send(SessionError { task, error });
    }

    fn loading(&self, task: Task, active: bool) {
        self.event(SessionEvent::Loading { task, active });
    }
}

/// Runs detection and saving off the interactive thread.
pub struct DetectionSession {
    commands: Sender<Command>,
    events: Receiver<SessionEvent>,
    errors: Receiver<SessionError>,
    publisher: Publisher,
    latest: Arc<AtomicU64>,
    original: Arc<Mutex<Option<Arc<DynamicImage>>>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DetectionSession {
    /// Start the worker thread.
    pub fn new(detector: Arc<dyn FaceDetector>, config: SessionConfig) -> Self {
        let (command_tx, command_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        let (error_tx, error_rx) = unbounded();
        let publisher = Publisher {
            events: event_tx,
            errors: error_tx,
        };
        let latest = Arc::new(AtomicU64::new(0));
        let original = Arc::new(Mutex::new(None));

        let worker = Worker {
            detector,
            config,
            latest: Arc::clone(&latest),
            original: Arc::clone(&original),
            publisher: publisher.clone(),
        };
        let handle = thread::spawn(move || worker.run(command_rx));

        Self {
            commands: command_tx,
            events: event_rx,
            errors: error_rx,
            publisher,
            latest,
            original,
            worker: Some(handle),
        }
    }

    pub fn events(&self) -> Receiver<SessionEvent> {
        self.events.clone()
    }

    pub fn errors(&self) -> Receiver<SessionError> {
        self.errors.clone()
    }

    /// Generation of the most recent submission.
    pub fn latest_generation(&self) -> u64 {
        self.latest.load(Ordering::SeqCst)
    }

    /// Last published original photo, if any.
    pub fn original(&self) -> Option<Arc<DynamicImage>> {
        self.original.lock().clone()
    }

    /// Detect faces in an already decoded, upright image.
    pub fn submit(&self, image: DynamicImage) -> u64 {
        let generation = self.begin_detection();
        self.dispatch(Command::Detect { generation, image }, Task::Detection(generation));
        generation
    }

    /// Read an image file, rotate it upright from its EXIF orientation and
    /// detect faces in it.
    pub fn submit_file(&self, path: impl Into<PathBuf>) -> u64 {
        let generation = self.begin_detection();
        let path = path.into();
        self.dispatch(Command::DetectFile { generation, path }, Task::Detection(generation));
        generation
    }

    /// Burn `export`'s masks into the original photo and write it as
    /// `file_name` in the configured output directory.
    pub fn save(&self, file_name: &str, export: MaskExport, catalog: Arc<GlyphCatalog>) {
        let Some(original) = self.original() else {
            self.publisher.error(Task::Save, FaceHideError::NoImage);
            return;
        };
        self.publisher.loading(Task::Save, true);
        let command = Command::Save {
            file_name: file_name.to_string(),
            original,
            export,
            catalog,
        };
        self.dispatch(command, Task::Save);
    }

    /// Forget the current photo. Detections still in flight become stale.
    pub fn clear(&self) {
        let mut original = self.original.lock();
        self.latest.fetch_add(1, Ordering::SeqCst);
        *original = None;
        self.publisher.event(SessionEvent::Cleared);
    }

    fn begin_detection(&self) -> u64 {
        // Bumped under the photo lock so the worker never stores a photo for
        // a generation that has already been superseded.
        let generation = {
            let _original = self.original.lock();
            self.latest.fetch_add(1, Ordering::SeqCst) + 1
        };
        info!("detection {generation} submitted");
        self.publisher.loading(Task::Detection(generation), true);
        generation
    }

    fn dispatch(&self, command: Command, task: Task) {
        if self.commands.send(command).is_err() {
            warn!("worker is gone, dropping {:?}", task);
            self.publisher.loading(task, false);
        }
    }
}

impl Drop for DetectionSession {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct Worker {
    detector: Arc<dyn FaceDetector>,
    config: SessionConfig,
    latest: Arc<AtomicU64>,
    original: Arc<Mutex<Option<Arc<DynamicImage>>>>,
    publisher: Publisher,
}

impl Worker {
    fn run(self, commands: Receiver<Command>) {
        for command in commands.iter() {
            match command {
                Command::Detect { generation, image } => self.detect(generation, || Ok(image)),
                Command::DetectFile { generation, path } => {
                    self.detect(generation, || read_image_file(&path))
                }
                Command::Save {
                    file_name,
                    original,
                    export,
                    catalog,
                } => self.save(&file_name, &original, &export, &catalog),
                Command::Shutdown => break,
            }
        }
        debug!("worker stopped");
    }

    fn is_current(&self, generation: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == generation
    }

    fn detect(&self, generation: u64, load: impl FnOnce() -> Result<DynamicImage, FaceHideError>) {
        let task = Task::Detection(generation);
        if self.is_current(generation) {
            self.run_detection(generation, load);
        } else {
            debug!("detection {generation} superseded before start");
        }
        self.publisher.loading(task, false);
    }

    fn run_detection(
        &self,
        generation: u64,
        load: impl FnOnce() -> Result<DynamicImage, FaceHideError>,
    ) {
        let task = Task::Detection(generation);
        let image = match load() {
            Ok(image) => Arc::new(image),
            Err(e) => {
                warn!("detection {generation}: {e}");
                if self.is_current(generation) {
                    self.publisher.error(task, e);
                }
                return;
            }
        };

        {
            let mut original = self.original.lock();
            if !self.is_current(generation) {
                debug!("detection {generation} superseded while loading");
                return;
            }
            *original = Some(Arc::clone(&image));
            self.publisher.event(SessionEvent::OriginalPhoto {
                generation,
                image: Arc::clone(&image),
            });
        }

        let outcome = detect_image(
            self.detector.as_ref(),
            &image,
            self.config.max_detection_side,
            &self.config.detector_options,
        );
        if !self.is_current(generation) {
            debug!("detection {generation} finished after being superseded, dropping result");
            return;
        }

        match outcome {
            DetectionOutcome::Faces(result) => {
                info!("detection {generation}: {} faces", result.faces.len());
                self.publisher
                    .event(SessionEvent::Faces { generation, result });
            }
            DetectionOutcome::NoFaces => self.publisher.error(task, FaceHideError::NoFaces),
            DetectionOutcome::Cancelled => self.publisher.error(task, FaceHideError::Cancelled),
            DetectionOutcome::Failed(cause) => {
                warn!("detection {generation} failed: {cause}");
                self.publisher.error(task, FaceHideError::Detection(cause));
            }
        }
    }

    fn save(
        &self,
        file_name: &str,
        original: &DynamicImage,
        export: &MaskExport,
        catalog: &GlyphCatalog,
    ) {
        match self.write_masked(file_name, original, export, catalog) {
            Ok(path) => {
                info!("saved {}", path.display());
                self.publisher.event(SessionEvent::Saved { path });
            }
            Err(e) => {
                warn!("save failed: {e}");
                self.publisher.error(Task::Save, e);
            }
        }
        self.publisher.loading(Task::Save, false);
    }

    fn write_masked(
        &self,
        file_name: &str,
        original: &DynamicImage,
        export: &MaskExport,
        catalog: &GlyphCatalog,
    ) -> Result<PathBuf, FaceHideError> {
        check_file_name(file_name)?;
        let pictures = &self.config.pictures_dir;
        if !pictures.is_dir() {
            return Err(FaceHideError::NoStorage(format!(
                "{} is not available",
                pictures.display()
            )));
        }
        let dir = self.config.output_dir();
        fs::create_dir_all(&dir).map_err(|e| FaceHideError::NoStorage(e.to_string()))?;

        let path = dir.join(format!("{file_name}.{}", self.config.format.extension()));
        if path.exists() {
            fs::remove_file(&path).map_err(|e| FaceHideError::InsufficientSpace(e.to_string()))?;
        }

        let masked = composite_masks(original, export, catalog)?;
        if let Err(e) = encode_to_file(&masked, &path, self.config.format) {
            let _ = fs::remove_file(&path);
            return Err(e);
        }
        Ok(path)
    }
}

/// Saved photos must stay inside the output directory.
fn check_file_name(name: &str) -> Result<(), FaceHideError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(()),
        _ => Err(FaceHideError::InvalidFileName(name.to_string())),
    }
}

fn read_image_file(path: &Path) -> Result<DynamicImage, FaceHideError> {
    let bytes =
        fs::read(path).map_err(|e| FaceHideError::ImageRead(format!("{}: {e}", path.display())))?;
    load_oriented(&bytes)
}

/// Flatten alpha channel by compositing onto a white background.
fn flatten_alpha(image: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_to_file(image: &RgbaImage, path: &Path, format: SaveFormat) -> Result<(), FaceHideError> {
    let file = File::create(path).map_err(|e| FaceHideError::InsufficientSpace(e.to_string()))?;
    let mut writer = BufWriter::new(file);
    let (width, height) = image.dimensions();

    match format {
        SaveFormat::Jpeg => {
            let rgb = flatten_alpha(image);
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).write_image(
                rgb.as_raw(),
                width,
                height,
                ExtendedColorType::Rgb8,
            )
        }
        SaveFormat::Png => PngEncoder::new(&mut writer).write_image(
            image.as_raw(),
            width,
            height,
            ExtendedColorType::Rgba8,
        ),
    }
    .map_err(|e| FaceHideError::InsufficientSpace(e.to_string()))?;

    writer
        .flush()
        .map_err(|e| FaceHideError::InsufficientSpace(e.to_string()))
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::*;
    use crate::detector::RawFace;
    use crate::geometry::Rect;

    struct FixedDetector(Result<Vec<RawFace>, DetectorError>);

    impl FaceDetector for FixedDetector {
        fn detect(
            &self,
            image: &DynamicImage,
            _options: &DetectorOptions,
        ) -> Result<Vec<RawFace>, DetectorError> {
            assert!(image.width() > 0 && image.height() > 0);
            self.0.clone()
        }
    }

    fn blank(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
    }

    #[test]
    fn outcome_reports_submitted_size() {
        let detector = FixedDetector(Ok(vec![RawFace::new(Rect::new(1, 2, 3, 4), None)]));
        let options = DetectorOptions::default();
        let outcome = detect_image(&detector, &blank(2048, 1536), 1024, &options);
        match outcome {
            DetectionOutcome::Faces(result) => {
                assert_eq!(result.size, Size::new(1365, 1024));
                assert_eq!(result.faces.len(), 1);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn small_images_are_submitted_unscaled() {
        let detector = FixedDetector(Ok(vec![RawFace::new(Rect::new(1, 2, 3, 4), None)]));
        let options = DetectorOptions::default();
        let outcome = detect_image(&detector, &blank(2000, 1000), 1024, &options);
        assert!(matches!(
            outcome,
            DetectionOutcome::Faces(DetectionResult {
                size: Size {
                    width: 2000,
                    height: 1000
                },
                ..
            })
        ));
    }

    #[test]
    fn empty_detection_is_no_faces() {
        let detector = FixedDetector(Ok(Vec::new()));
        let outcome = detect_image(&detector, &blank(10, 10), 1024, &DetectorOptions::default());
        assert_eq!(outcome, DetectionOutcome::NoFaces);
    }

    #[test]
    fn detector_errors_map_to_outcomes() {
        let cancelled = FixedDetector(Err(DetectorError::Cancelled));
        assert_eq!(
            detect_image(&cancelled, &blank(10, 10), 1024, &DetectorOptions::default()),
            DetectionOutcome::Cancelled
        );
        let failed = FixedDetector(Err(DetectorError::Failed("model missing".into())));
        assert_eq!(
            detect_image(&failed, &blank(10, 10), 1024, &DetectorOptions::default()),
            DetectionOutcome::Failed("model missing".into())
        );
    }

    #[test]
    fn zero_sized_image_fails_without_calling_detector() {
        let detector = FixedDetector(Ok(Vec::new()));
        let outcome = detect_image(&detector, &blank(0, 10), 1024, &DetectorOptions::default());
        assert!(matches!(outcome, DetectionOutcome::Failed(_)));
    }

    #[test]
    fn flatten_alpha_composites_over_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([255, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([100, 150, 200, 255]));
        let rgb = flatten_alpha(&rgba);
        assert_eq!(rgb.get_pixel(0, 0), &image::Rgb([255, 255, 255]));
        assert_eq!(rgb.get_pixel(1, 0), &image::Rgb([100, 150, 200]));
    }

    /// Run one detection on a side worker sharing `session`'s state, with a
    /// loader that blocks until `during_load` has run.
    fn detect_while_loading(
        session: &DetectionSession,
        during_load: impl FnOnce(&DetectionSession),
    ) -> u64 {
        let worker = Worker {
            detector: Arc::new(FixedDetector(Ok(vec![RawFace::new(
                Rect::new(0, 0, 4, 4),
                None,
            )]))),
            config: SessionConfig::new("/unused"),
            latest: Arc::clone(&session.latest),
            original: Arc::clone(&session.original),
            publisher: session.publisher.clone(),
        };
        let generation = session.begin_detection();
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded::<()>();
        let handle = thread::spawn(move || {
            worker.detect(generation, || {
                entered_tx.send(()).unwrap();
                release_rx.recv().unwrap();
                Ok(blank(8, 8))
            })
        });

        entered_rx.recv().unwrap();
        during_load(session);
        release_tx.send(()).unwrap();
        handle.join().unwrap();
        generation
    }

    fn idle_session() -> DetectionSession {
        DetectionSession::new(
            Arc::new(FixedDetector(Ok(Vec::new()))),
            SessionConfig::new("/unused"),
        )
    }

    #[test]
    fn photo_loaded_after_clear_is_discarded() {
        let session = idle_session();
        let events = session.events();

        let generation = detect_while_loading(&session, |s| s.clear());

        assert!(session.original().is_none());
        let seen: Vec<_> = events.try_iter().collect();
        assert!(!seen
            .iter()
            .any(|e| matches!(e, SessionEvent::OriginalPhoto { .. })));
        assert!(matches!(seen[1], SessionEvent::Cleared));
        assert!(matches!(
            seen.last(),
            Some(SessionEvent::Loading {
                task: Task::Detection(g),
                active: false
            }) if *g == generation
        ));
        assert!(session.errors().try_recv().is_err());
    }

    #[test]
    fn photo_loaded_after_newer_submission_is_discarded() {
        let session = idle_session();
        let events = session.events();

        let stale = detect_while_loading(&session, |s| {
            s.begin_detection();
        });

        assert!(session.original().is_none());
        assert!(!events.try_iter().any(|e| matches!(
            e,
            SessionEvent::OriginalPhoto { generation, .. } if generation == stale
        )));
    }

    #[test]
    fn file_names_stay_in_output_dir() {
        assert!(check_file_name("masked_2024").is_ok());
        assert!(check_file_name("photo.v2").is_ok());
        for bad in ["", ".", "..", "../escape", "/tmp/x", "a/b", "a\\b", "dir/"] {
            assert!(
                matches!(check_file_name(bad), Err(FaceHideError::InvalidFileName(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn config_output_dir() {
        let config = SessionConfig::new("/pictures").app_dir("Masks");
        assert_eq!(config.output_dir(), PathBuf::from("/pictures/Masks"));
        assert_eq!(SaveFormat::default().extension(), "jpg");
    }
}
