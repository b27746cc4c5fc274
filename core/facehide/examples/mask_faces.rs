//! Detect faces in a photo, cover each with the glyph picked from its
//! smiling score and save the result.
//!
//! Usage:
//!   cargo run --example mask_faces --features rustface -- \
//!       <seeta_model.bin> <photo.jpg> <glyph_dir> <pictures_dir>

use std::error::Error;
use std::sync::Arc;

use facehide::{
    CanvasConfig, CanvasController, DetectionSession, GlyphCatalog, RustfaceDetector,
    SessionConfig, SessionEvent, Size, Task,
};

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let [model, photo, glyphs, pictures] = args.as_slice() else {
        eprintln!("usage: mask_faces <model> <photo> <glyph_dir> <pictures_dir>");
        std::process::exit(2);
    };

    let detector = Arc::new(RustfaceDetector::from_path(model)?);
    let catalog = Arc::new(GlyphCatalog::load_dir(glyphs)?);
    println!("loaded {} glyphs", catalog.len());

    let session = DetectionSession::new(detector, SessionConfig::new(pictures));
    let events = session.events();
    let errors = session.errors();
    let mut canvas = CanvasController::new(Size::new(1080, 1920), CanvasConfig::default());

    let generation = session.submit_file(photo);
    for event in events.iter() {
        match event {
            SessionEvent::OriginalPhoto { image, .. } => {
                println!("=== {photo} ({}x{}) ===", image.width(), image.height());
                canvas.set_photo(&image)?;
            }
            SessionEvent::Faces { result, .. } => {
                println!("  Found {} face(s):", result.faces.len());
                for (i, face) in result.faces.iter().enumerate() {
                    let b = face.bounds;
                    println!(
                        "    face {i}: bbox=({}, {}, {}x{})",
                        b.left,
                        b.top,
                        b.width(),
                        b.height()
                    );
                }
                canvas.show_faces(&result)?;
            }
            SessionEvent::Loading {
                task: Task::Detection(g),
                active: false,
            } if g == generation => break,
            _ => {}
        }
    }
    if let Ok(failure) = errors.try_recv() {
        return Err(failure.error.into());
    }

    let Some(export) = canvas.prepare_results() else {
        return Err("no photo loaded".into());
    };
    session.save("masked", export, catalog);
    for event in events.iter() {
        match event {
            SessionEvent::Saved { path } => println!("  saved {}", path.display()),
            SessionEvent::Loading {
                task: Task::Save,
                active: false,
            } => break,
            _ => {}
        }
    }
    if let Ok(failure) = errors.try_recv() {
        return Err(failure.error.into());
    }
    Ok(())
}
