//! Drawable commands and the compositing used both for on-screen frames
//! and for the saved image.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use log::{debug, warn};

use crate::error::FaceHideError;
use crate::geometry::{scale_factor, Point, Rect, Size};
use crate::overlay::{Emoji, MaskExport};

/// Outline colours cycled through by face index.
const FRAME_PALETTE: [[u8; 3]; 30] = [
    [0x7E, 0x10, 0x37],
    [0xC1, 0x4E, 0x76],
    [0xDF, 0x7D, 0xA6],
    [0xF7, 0xB2, 0xCF],
    [0xFF, 0xE4, 0xE1],
    [0x35, 0xBB, 0xCA],
    [0x01, 0x91, 0xB4],
    [0xF8, 0xD9, 0x0F],
    [0xD3, 0xDD, 0x18],
    [0xFE, 0x7A, 0x15],
    [0x47, 0xCA, 0xCC],
    [0x63, 0xBC, 0xC9],
    [0xCD, 0xB3, 0xD4],
    [0xE7, 0xB7, 0xC8],
    [0xFF, 0xBE, 0x88],
    [0xFC, 0x6B, 0x05],
    [0xFF, 0xB6, 0x2B],
    [0x65, 0xB0, 0x17],
    [0x99, 0xD8, 0xDB],
    [0x9B, 0xB7, 0xBB],
    [0xD6, 0xA3, 0xDC],
    [0xF7, 0xDB, 0x70],
    [0xEA, 0xBE, 0xBF],
    [0x75, 0xCC, 0xE8],
    [0xA5, 0xDE, 0xE5],
    [0x60, 0xEF, 0xDB],
    [0xBE, 0xF2, 0xE5],
    [0xC5, 0xE7, 0xF1],
    [0x79, 0xCE, 0xED],
    [0x6F, 0x89, 0xA2],
];

/// Outline colour for the face at `index`.
pub fn frame_color(index: usize) -> Rgba<u8> {
    let [r, g, b] = FRAME_PALETTE[index % FRAME_PALETTE.len()];
    Rgba([r, g, b, 0xFF])
}

/// Shared, immutable glyph bitmaps keyed by [`Emoji`].
#[derive(Debug, Clone, Default)]
pub struct GlyphCatalog {
    glyphs: HashMap<Emoji, Arc<RgbaImage>>,
}

impl GlyphCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `<stem>.png` for every emoji present in `dir`.
    ///
    /// Missing files are skipped; files that exist but cannot be decoded
    /// are an error.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, FaceHideError> {
        let dir = dir.as_ref();
        let mut catalog = Self::new();
        for emoji in Emoji::ALL {
            let path = dir.join(format!("{}.png", emoji.stem()));
            if !path.is_file() {
                continue;
            }
            let glyph = image::open(&path)
                .map_err(|e| FaceHideError::ImageRead(format!("{}: {e}", path.display())))?;
            catalog.insert(emoji, glyph.to_rgba8());
        }
        debug!("load_dir: {} glyphs from {}", catalog.len(), dir.display());
        Ok(catalog)
    }

    pub fn insert(&mut self, emoji: Emoji, glyph: RgbaImage) {
        self.glyphs.insert(emoji, Arc::new(glyph));
    }

    pub fn get(&self, emoji: Emoji) -> Option<&Arc<RgbaImage>> {
        self.glyphs.get(&emoji)
    }

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }
}

/// Part of a glyph to draw into `dest`, or `None` for the whole glyph.
///
/// A face clipped by the frame edge leaves a strip more than twice as long
/// as it is wide. Only the part of the glyph that would still be visible is
/// drawn: the half of `surface` holding the strip's centre tells which edge
/// clipped it.
pub fn glyph_source_rect(dest: Rect, glyph: Size, surface: Size) -> Option<Rect> {
    let (w, h) = (dest.width(), dest.height());
    if w <= 0 || h <= 0 || w.min(h) * 2 >= w.max(h) {
        return None;
    }
    let (gw, gh) = (glyph.width as i32, glyph.height as i32);
    let center = dest.center();

    if w > h {
        let visible = ((gh as i64 * h as i64) / w as i64).clamp(1, gh as i64) as i32;
        if center.y > surface.height as i32 / 2 {
            // clipped at the bottom edge
            Some(Rect::new(0, 0, gw, visible))
        } else {
            Some(Rect::new(0, gh - visible, gw, gh))
        }
    } else {
        let visible = ((gw as i64 * w as i64) / h as i64).clamp(1, gw as i64) as i32;
        if center.x > surface.width as i32 / 2 {
            // clipped at the right edge
            Some(Rect::new(0, 0, visible, gh))
        } else {
            Some(Rect::new(gw - visible, 0, gw, gh))
        }
    }
}

/// One drawing step of a frame.
#[derive(Debug, Clone)]
pub enum DrawCommand {
    Photo {
        image: Arc<RgbaImage>,
        offset: Point,
    },
    FaceFrame {
        rect: Rect,
        color: Rgba<u8>,
        stroke: u32,
    },
    Mask {
        emoji: Emoji,
        dest: Rect,
        source: Option<Rect>,
    },
}

/// Execute `commands` in order onto a transparent surface of `surface` size.
pub fn render(commands: &[DrawCommand], surface: Size, catalog: &GlyphCatalog) -> RgbaImage {
    let mut canvas = RgbaImage::new(surface.width, surface.height);
    for command in commands {
        match command {
            DrawCommand::Photo { image, offset } => {
                imageops::replace(&mut canvas, image.as_ref(), offset.x as i64, offset.y as i64);
            }
            DrawCommand::FaceFrame {
                rect,
                color,
                stroke,
            } => draw_frame(&mut canvas, *rect, *color, *stroke),
            DrawCommand::Mask {
                emoji,
                dest,
                source,
            } => match catalog.get(*emoji) {
                Some(glyph) => draw_glyph(&mut canvas, glyph, *dest, *source),
                None => warn!("render: no glyph loaded for {:?}", emoji),
            },
        }
    }
    canvas
}

/// Draw every exported mask onto a copy of `original`.
///
/// Mask rectangles and padding are in the displayed photo's pixel space and
/// are scaled up to the original's resolution.
pub fn composite_masks(
    original: &DynamicImage,
    export: &MaskExport,
    catalog: &GlyphCatalog,
) -> Result<RgbaImage, FaceHideError> {
    let target = Size::new(original.width(), original.height());
    let factor = scale_factor(export.size, target)?;
    debug!("composite_masks: factor {factor}, {} masks", export.masks.len());

    let padding = (export.padding as f32 * factor) as i32;
    let mut canvas = original.to_rgba8();
    for mask in &export.masks {
        let Some(glyph) = catalog.get(mask.emoji) else {
            warn!("composite_masks: no glyph loaded for {:?}", mask.emoji);
            continue;
        };
        let dest = mask.rect.scaled(factor).inset(padding);
        let glyph_size = Size::new(glyph.width(), glyph.height());
        let source = glyph_source_rect(dest, glyph_size, target);
        draw_glyph(&mut canvas, glyph, dest, source);
    }
    Ok(canvas)
}

fn draw_frame(canvas: &mut RgbaImage, rect: Rect, color: Rgba<u8>, stroke: u32) {
    for t in 0..stroke.max(1) as i32 {
        let inner = rect.inset(t);
        if inner.is_empty() {
            break;
        }
        let shape = imageproc::rect::Rect::at(inner.left, inner.top)
            .of_size(inner.width() as u32, inner.height() as u32);
        draw_hollow_rect_mut(canvas, shape, color);
    }
}

fn draw_glyph(canvas: &mut RgbaImage, glyph: &RgbaImage, dest: Rect, source: Option<Rect>) {
    if dest.is_empty() || glyph.width() == 0 || glyph.height() == 0 {
        return;
    }
    let cropped;
    let glyph = match source {
        Some(src) if !src.is_empty() => {
            cropped = imageops::crop_imm(
                glyph,
                src.left.max(0) as u32,
                src.top.max(0) as u32,
                src.width() as u32,
                src.height() as u32,
            )
            .to_image();
            &cropped
        }
        _ => glyph,
    };
    let resized = imageops::resize(
        glyph,
        dest.width() as u32,
        dest.height() as u32,
        FilterType::Triangle,
    );
    imageops::overlay(canvas, &resized, dest.left as i64, dest.top as i64);
}
