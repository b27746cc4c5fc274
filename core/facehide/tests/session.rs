use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use facehide::{
    CanvasConfig, CanvasController, DetectionSession, DetectorError, DetectorOptions, Emoji,
    ErrorKind, FaceDetector, FaceHideError, GlyphCatalog, MaskExport, RawFace, Rect, SaveFormat,
    SessionConfig, SessionEvent, Size, Task,
};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};

const TIMEOUT: Duration = Duration::from_secs(10);

struct FixedDetector(Result<Vec<RawFace>, DetectorError>);

impl FaceDetector for FixedDetector {
    fn detect(
        &self,
        _image: &DynamicImage,
        _options: &DetectorOptions,
    ) -> Result<Vec<RawFace>, DetectorError> {
        self.0.clone()
    }
}

/// Blocks every call until released, so tests can overlap submissions.
struct GatedDetector {
    entered: Sender<()>,
    release: Receiver<()>,
    calls: AtomicUsize,
}

impl FaceDetector for GatedDetector {
    fn detect(
        &self,
        _image: &DynamicImage,
        _options: &DetectorOptions,
    ) -> Result<Vec<RawFace>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.send(()).unwrap();
        self.release.recv_timeout(TIMEOUT).unwrap();
        Ok(vec![RawFace::new(Rect::new(10, 10, 50, 50), Some(0.9))])
    }
}

fn one_face() -> FixedDetector {
    FixedDetector(Ok(vec![RawFace::new(
        Rect::new(200, 200, 400, 400),
        Some(0.9),
    )]))
}

fn blank(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
}

/// Collect events until `task` reports it is no longer loading.
fn drain_until_idle(events: &Receiver<SessionEvent>, task: Task) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(TIMEOUT)
            .unwrap_or_else(|e| panic!("timed out waiting for {task:?}: {e}; saw {seen:?}"));
        let done = matches!(event, SessionEvent::Loading { task: t, active: false } if t == task);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

fn red_catalog() -> Arc<GlyphCatalog> {
    let mut catalog = GlyphCatalog::new();
    catalog.insert(
        Emoji::Smiling,
        RgbaImage::from_pixel(16, 16, Rgba([255, 0, 0, 255])),
    );
    Arc::new(catalog)
}

#[test]
fn detection_publishes_loading_original_and_faces() {
    let dir = tempfile::tempdir().unwrap();
    let session = DetectionSession::new(Arc::new(one_face()), SessionConfig::new(dir.path()));
    let events = session.events();

    let generation = session.submit(blank(800, 600));
    let seen = drain_until_idle(&events, Task::Detection(generation));

    assert!(matches!(
        seen.first(),
        Some(SessionEvent::Loading { active: true, .. })
    ));
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::OriginalPhoto { image, .. } if image.width() == 800 && image.height() == 600
    )));
    let faces = seen
        .iter()
        .find_map(|e| match e {
            SessionEvent::Faces { result, .. } => Some(result.clone()),
            _ => None,
        })
        .expect("faces event");
    assert_eq!(faces.size, Size::new(800, 600));
    assert_eq!(faces.faces.len(), 1);
    assert!(session.errors().try_recv().is_err());
    assert!(session.original().is_some());
}

#[test]
fn large_photos_are_downscaled_for_detection() {
    let dir = tempfile::tempdir().unwrap();
    let session = DetectionSession::new(Arc::new(one_face()), SessionConfig::new(dir.path()));
    let events = session.events();

    let generation = session.submit(blank(2048, 1536));
    let seen = drain_until_idle(&events, Task::Detection(generation));
    let size = seen.iter().find_map(|e| match e {
        SessionEvent::Faces { result, .. } => Some(result.size),
        _ => None,
    });
    assert_eq!(size, Some(Size::new(1365, 1024)));
}

#[test]
fn zero_faces_is_an_error_without_faces_event() {
    let dir = tempfile::tempdir().unwrap();
    let session = DetectionSession::new(
        Arc::new(FixedDetector(Ok(Vec::new()))),
        SessionConfig::new(dir.path()),
    );
    let events = session.events();

    let generation = session.submit(blank(64, 64));
    let seen = drain_until_idle(&events, Task::Detection(generation));
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Faces { .. })));

    let error = session.errors().try_recv().unwrap();
    assert_eq!(error.task, Task::Detection(generation));
    assert_eq!(error.kind(), ErrorKind::NoFaces);
}

#[test]
fn detector_failures_and_cancellation_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let failing = DetectionSession::new(
        Arc::new(FixedDetector(Err(DetectorError::Failed("boom".into())))),
        SessionConfig::new(dir.path()),
    );
    let generation = failing.submit(blank(32, 32));
    drain_until_idle(&failing.events(), Task::Detection(generation));
    assert_eq!(
        failing.errors().try_recv().unwrap().kind(),
        ErrorKind::DetectionFailed
    );

    let cancelled = DetectionSession::new(
        Arc::new(FixedDetector(Err(DetectorError::Cancelled))),
        SessionConfig::new(dir.path()),
    );
    let generation = cancelled.submit(blank(32, 32));
    drain_until_idle(&cancelled.events(), Task::Detection(generation));
    assert_eq!(
        cancelled.errors().try_recv().unwrap().kind(),
        ErrorKind::Cancelled
    );
}

#[test]
fn unreadable_file_is_an_image_read_error() {
    let dir = tempfile::tempdir().unwrap();
    let session = DetectionSession::new(Arc::new(one_face()), SessionConfig::new(dir.path()));

    let generation = session.submit_file(dir.path().join("missing.jpg"));
    let seen = drain_until_idle(&session.events(), Task::Detection(generation));
    assert!(!seen
        .iter()
        .any(|e| matches!(e, SessionEvent::OriginalPhoto { .. })));
    assert_eq!(
        session.errors().try_recv().unwrap().kind(),
        ErrorKind::ImageRead
    );
}

#[test]
fn submit_file_decodes_the_photo() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    let img = RgbImage::from_pixel(30, 20, Rgb([10, 20, 30]));
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(img.as_raw(), 30, 20, image::ExtendedColorType::Rgb8)
        .unwrap();
    std::fs::write(&path, buffer).unwrap();

    let session = DetectionSession::new(Arc::new(one_face()), SessionConfig::new(dir.path()));
    let generation = session.submit_file(&path);
    let seen = drain_until_idle(&session.events(), Task::Detection(generation));
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::OriginalPhoto { image, .. } if image.width() == 30 && image.height() == 20
    )));
}

#[test]
fn superseded_result_is_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let detector = Arc::new(GatedDetector {
        entered: entered_tx,
        release: release_rx,
        calls: AtomicUsize::new(0),
    });
    let session = DetectionSession::new(detector.clone(), SessionConfig::new(dir.path()));
    let events = session.events();

    let first = session.submit(blank(64, 64));
    entered_rx.recv_timeout(TIMEOUT).unwrap();
    let second = session.submit(blank(64, 64));
    release_tx.send(()).unwrap();
    release_tx.send(()).unwrap();

    let mut seen = drain_until_idle(&events, Task::Detection(first));
    seen.extend(drain_until_idle(&events, Task::Detection(second)));

    let faces: Vec<u64> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Faces { generation, .. } => Some(*generation),
            _ => None,
        })
        .collect();
    assert_eq!(faces, vec![second]);
    assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn queued_stale_submission_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let detector = Arc::new(GatedDetector {
        entered: entered_tx,
        release: release_rx,
        calls: AtomicUsize::new(0),
    });
    let session = DetectionSession::new(detector.clone(), SessionConfig::new(dir.path()));
    let events = session.events();

    let first = session.submit(blank(64, 64));
    entered_rx.recv_timeout(TIMEOUT).unwrap();
    let skipped = session.submit(blank(64, 64));
    let last = session.submit(blank(64, 64));
    for _ in 0..3 {
        release_tx.send(()).unwrap();
    }

    let mut seen = drain_until_idle(&events, Task::Detection(first));
    seen.extend(drain_until_idle(&events, Task::Detection(skipped)));
    seen.extend(drain_until_idle(&events, Task::Detection(last)));

    let idle = seen
        .iter()
        .filter(|e| matches!(e, SessionEvent::Loading { active: false, .. }))
        .count();
    assert_eq!(idle, 3);
    assert_eq!(detector.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn clear_forgets_the_original() {
    let dir = tempfile::tempdir().unwrap();
    let session = DetectionSession::new(Arc::new(one_face()), SessionConfig::new(dir.path()));
    let events = session.events();
    let generation = session.submit(blank(64, 64));
    drain_until_idle(&events, Task::Detection(generation));

    session.clear();
    assert!(session.original().is_none());
    assert!(matches!(
        events.recv_timeout(TIMEOUT).unwrap(),
        SessionEvent::Cleared
    ));
}

#[test]
fn save_without_photo_reports_no_image() {
    let dir = tempfile::tempdir().unwrap();
    let session = DetectionSession::new(Arc::new(one_face()), SessionConfig::new(dir.path()));
    let export = MaskExport {
        size: Size::new(10, 10),
        masks: Vec::new(),
        padding: 0,
    };

    session.save("masked", export, red_catalog());
    let error = session.errors().recv_timeout(TIMEOUT).unwrap();
    assert_eq!(error.task, Task::Save);
    assert_eq!(error.kind(), ErrorKind::NoImage);
    assert!(session.events().try_recv().is_err());
}

/// Submit an 800x600 photo with one face, show it on a 400x400 canvas and
/// return the session plus the canvas' export.
fn detect_and_export(config: SessionConfig) -> (DetectionSession, MaskExport) {
    let session = DetectionSession::new(Arc::new(one_face()), config);
    let events = session.events();
    let mut canvas = CanvasController::new(Size::new(400, 400), CanvasConfig::default());

    let generation = session.submit(blank(800, 600));
    for event in drain_until_idle(&events, Task::Detection(generation)) {
        match event {
            SessionEvent::OriginalPhoto { image, .. } => canvas.set_photo(&image).unwrap(),
            SessionEvent::Faces { result, .. } => canvas.show_faces(&result).unwrap(),
            _ => {}
        }
    }
    let export = canvas.prepare_results().unwrap();
    assert_eq!(export.masks.len(), 1);
    (session, export)
}

#[test]
fn save_burns_masks_into_original_resolution() {
    let dir = tempfile::tempdir().unwrap();
    let config = SessionConfig::new(dir.path()).format(SaveFormat::Png);
    let (session, export) = detect_and_export(config);

    session.save("masked", export, red_catalog());
    let seen = drain_until_idle(&session.events(), Task::Save);
    let path = seen
        .iter()
        .find_map(|e| match e {
            SessionEvent::Saved { path } => Some(path.clone()),
            _ => None,
        })
        .expect("saved event");
    assert_eq!(path, dir.path().join("FaceHide").join("masked.png"));

    let saved = image::open(&path).unwrap().to_rgba8();
    assert_eq!(saved.dimensions(), (800, 600));
    // Face centre in original space is (300, 300); the corner stays black.
    let [r, g, b, _] = saved.get_pixel(300, 300).0;
    assert!(r > 250 && g < 5 && b < 5, "expected red, got {r},{g},{b}");
    assert_eq!(saved.get_pixel(5, 5), &Rgba([0, 0, 0, 255]));
}

#[test]
fn save_replaces_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("FaceHide");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("masked.jpg"), b"stale bytes").unwrap();

    let (session, export) = detect_and_export(SessionConfig::new(dir.path()));
    session.save("masked", export, red_catalog());
    drain_until_idle(&session.events(), Task::Save);

    assert!(session.errors().try_recv().is_err());
    let saved = image::open(out.join("masked.jpg")).unwrap();
    assert_eq!((saved.width(), saved.height()), (800, 600));
}

#[test]
fn missing_pictures_directory_is_no_storage() {
    let dir = tempfile::tempdir().unwrap();
    let (session, export) = detect_and_export(SessionConfig::new(dir.path().join("unmounted")));

    session.save("masked", export, red_catalog());
    let seen = drain_until_idle(&session.events(), Task::Save);
    assert!(matches!(
        seen.first(),
        Some(SessionEvent::Loading {
            task: Task::Save,
            active: true
        })
    ));
    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Saved { .. })));
    assert_eq!(
        session.errors().try_recv().unwrap().kind(),
        ErrorKind::NoStorage
    );
}

/// JPEG of `width`x`height` stored pixels tagged with EXIF orientation 6
/// (rotate 90 degrees clockwise to display).
fn rotated_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([40, 80, 120]));
    let mut jpeg = Vec::new();
    JpegEncoder::new(&mut jpeg)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();

    let tiff = [
        b'M', b'M', 0, 42, 0, 0, 0, 8, 0, 1, 0x01, 0x12, 0, 3, 0, 0, 0, 1, 0, 6, 0, 0, 0, 0, 0, 0,
    ];
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

#[test]
fn submit_file_rotates_by_exif_orientation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("portrait.jpg");
    std::fs::write(&path, rotated_jpeg(40, 24)).unwrap();

    let session = DetectionSession::new(Arc::new(one_face()), SessionConfig::new(dir.path()));
    let generation = session.submit_file(&path);
    let seen = drain_until_idle(&session.events(), Task::Detection(generation));
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::OriginalPhoto { image, .. } if image.width() == 24 && image.height() == 40
    )));
    let original = session.original().unwrap();
    assert_eq!((original.width(), original.height()), (24, 40));
}

#[test]
fn write_failure_is_insufficient_space_and_keeps_photo() {
    let dir = tempfile::tempdir().unwrap();
    // A directory squatting on the target name cannot be replaced by a file.
    std::fs::create_dir_all(dir.path().join("FaceHide").join("masked.jpg")).unwrap();

    let (session, export) = detect_and_export(SessionConfig::new(dir.path()));
    session.save("masked", export, red_catalog());
    let seen = drain_until_idle(&session.events(), Task::Save);

    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Saved { .. })));
    let error = session.errors().try_recv().unwrap();
    assert_eq!(error.task, Task::Save);
    assert_eq!(error.kind(), ErrorKind::InsufficientSpace);
    assert!(session.original().is_some());
}

#[test]
fn failed_encode_leaves_no_partial_file() {
    let dir = tempfile::tempdir().unwrap();
    let session = DetectionSession::new(Arc::new(one_face()), SessionConfig::new(dir.path()));
    // JPEG cannot encode a side longer than 65535 pixels.
    let generation = session.submit(blank(70_000, 1));
    drain_until_idle(&session.events(), Task::Detection(generation));

    let export = MaskExport {
        size: Size::new(70_000, 1),
        masks: Vec::new(),
        padding: 0,
    };
    session.save("wide", export, red_catalog());
    drain_until_idle(&session.events(), Task::Save);

    assert_eq!(
        session.errors().try_recv().unwrap().kind(),
        ErrorKind::InsufficientSpace
    );
    assert!(dir.path().join("FaceHide").is_dir());
    assert!(!dir.path().join("FaceHide").join("wide.jpg").exists());
}

#[test]
fn save_rejects_names_outside_output_dir() {
    let dir = tempfile::tempdir().unwrap();
    let pictures = dir.path().join("pictures");
    std::fs::create_dir_all(&pictures).unwrap();
    let (session, export) = detect_and_export(SessionConfig::new(&pictures));

    session.save("../escaped", export, red_catalog());
    let seen = drain_until_idle(&session.events(), Task::Save);

    assert!(!seen.iter().any(|e| matches!(e, SessionEvent::Saved { .. })));
    let error = session.errors().try_recv().unwrap();
    assert!(matches!(error.error, FaceHideError::InvalidFileName(_)));
    assert!(!pictures.join("escaped.jpg").exists());
    assert!(!dir.path().join("escaped.jpg").exists());
}
