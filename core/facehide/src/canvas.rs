use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};
use log::debug;

use crate::detector::DetectionResult;
use crate::error::FaceHideError;
use crate::geometry::{centered_offset, fit_to_box, Point, Rect, Size};
use crate::overlay::{ClassificationPolicy, Emoji, FaceOverlay, MaskExport};
use crate::render::{self, frame_color, glyph_source_rect, DrawCommand, GlyphCatalog};

/// Movement in device-independent pixels after which a press becomes a drag.
const TOUCH_SLOP_DP: f32 = 30.0;

/// Width of the face outline in device-independent pixels.
const FRAME_STROKE_DP: f32 = 2.0;

/// Gap between a face outline and its mask glyph in device-independent pixels.
const MASK_PADDING_DP: f32 = 2.0;

/// The displayed photo: a display-resolution bitmap and where it sits on the
/// drawing surface.
#[derive(Debug, Clone)]
pub struct Photo {
    image: Arc<RgbaImage>,
    offset: Point,
}

impl Photo {
    pub fn new(image: Arc<RgbaImage>, offset: Point) -> Self {
        Self { image, offset }
    }

    pub fn image(&self) -> &Arc<RgbaImage> {
        &self.image
    }

    pub fn offset(&self) -> Point {
        self.offset
    }

    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    /// Surface-space rectangle covered by the photo.
    pub fn bounds(&self) -> Rect {
        Rect::from_origin(self.offset, self.size())
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        self.bounds().contains(x, y)
    }
}

/// Settings for the interactive canvas.
///
/// ```
/// use facehide::CanvasConfig;
///
/// let config = CanvasConfig::default().density(2.75).auto_mask(false);
/// assert_eq!(config.touch_slop_px(), 82.5);
/// ```
#[derive(Debug, Clone)]
pub struct CanvasConfig {
    density: f32,
    auto_mask: bool,
    policy: ClassificationPolicy,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            density: 1.0,
            auto_mask: true,
            policy: ClassificationPolicy::default(),
        }
    }
}

impl CanvasConfig {
    /// Physical pixels per device-independent pixel (default: 1.0).
    pub fn density(mut self, density: f32) -> Self {
        self.density = density;
        self
    }

    /// Pre-assign masks from smiling scores when faces arrive (default: true).
    pub fn auto_mask(mut self, enable: bool) -> Self {
        self.auto_mask = enable;
        self
    }

    /// Thresholds used when `auto_mask` is enabled.
    pub fn policy(mut self, policy: ClassificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn touch_slop_px(&self) -> f32 {
        TOUCH_SLOP_DP * self.density
    }

    fn dp_to_px(&self, dp: f32) -> i32 {
        (dp * self.density).round() as i32
    }
}

/// Pointer input in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down { x: f32, y: f32 },
    Move { x: f32, y: f32 },
    Up { x: f32, y: f32 },
    Cancel,
}

/// Selection events raised by a tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanvasEvent {
    FaceSelected { index: usize, has_mask: bool },
    PhotoTapped { x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Gesture {
    Idle,
    Pressed { x: f32, y: f32 },
    Dragging,
}

/// Owns the displayed photo and its face regions and turns pointer input
/// into selection events.
///
/// The controller never presents UI itself: callers react to the returned
/// [`CanvasEvent`]s and poll [`CanvasController::take_redraw_request`] to
/// know when to draw a new frame.
#[derive(Debug)]
pub struct CanvasController {
    viewport: Size,
    config: CanvasConfig,
    photo: Option<Photo>,
    faces: FaceOverlay,
    gesture: Gesture,
    redraw: bool,
}

impl CanvasController {
    pub fn new(viewport: Size, config: CanvasConfig) -> Self {
        Self {
            viewport,
            config,
            photo: None,
            faces: FaceOverlay::new(),
            gesture: Gesture::Idle,
            redraw: false,
        }
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    /// Resize the drawing surface. Takes effect on the next [`Self::set_photo`].
    pub fn set_viewport(&mut self, viewport: Size) {
        self.viewport = viewport;
    }

    pub fn set_auto_mask(&mut self, enable: bool) {
        self.config.auto_mask = enable;
    }

    /// Display `image`, fitted and centred in the viewport.
    ///
    /// Any existing faces are dropped, since their rectangles belong to the
    /// previous photo.
    pub fn set_photo(&mut self, image: &DynamicImage) -> Result<(), FaceHideError> {
        self.clear();

        let source = Size::new(image.width(), image.height());
        let fitted = fit_to_box(source, self.viewport)?;
        let bitmap = if fitted == source {
            image.to_rgba8()
        } else {
            image
                .resize_exact(fitted.width, fitted.height, FilterType::Triangle)
                .to_rgba8()
        };
        let offset = centered_offset(fitted, self.viewport);
        debug!(
            "set_photo: {}x{} shown as {}x{} at ({}, {})",
            source.width, source.height, fitted.width, fitted.height, offset.x, offset.y
        );

        self.photo = Some(Photo::new(Arc::new(bitmap), offset));
        self.redraw = true;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.photo = None;
        self.faces.clear();
        self.gesture = Gesture::Idle;
        self.redraw = true;
    }

    pub fn has_photo(&self) -> bool {
        self.photo.is_some()
    }

    pub fn photo(&self) -> Option<&Photo> {
        self.photo.as_ref()
    }

    pub fn faces(&self) -> &FaceOverlay {
        &self.faces
    }

    /// Replace the face regions with a fresh detection result.
    pub fn show_faces(&mut self, result: &DetectionResult) -> Result<(), FaceHideError> {
        let photo = self.photo.as_ref().ok_or(FaceHideError::NoImage)?;
        let policy = self.config.auto_mask.then_some(&self.config.policy);
        self.faces.replace_faces(result, photo, policy)?;
        self.redraw = true;
        Ok(())
    }

    pub fn assign_mask(&mut self, index: usize, emoji: Option<Emoji>) -> Result<(), FaceHideError> {
        self.faces.assign_mask(index, emoji)?;
        self.redraw = true;
        Ok(())
    }

    /// Masks to burn into the saved image, or `None` without a photo.
    pub fn prepare_results(&self) -> Option<MaskExport> {
        self.photo.as_ref().map(|photo| MaskExport {
            padding: self.mask_padding(),
            ..self.faces.export_results(photo)
        })
    }

    /// Whether something changed since the last call.
    pub fn take_redraw_request(&mut self) -> bool {
        std::mem::take(&mut self.redraw)
    }

    pub fn on_pointer(&mut self, event: PointerEvent) -> Option<CanvasEvent> {
        match event {
            PointerEvent::Down { x, y } => {
                self.gesture = Gesture::Pressed { x, y };
                None
            }
            PointerEvent::Move { x, y } => {
                if let Gesture::Pressed { x: sx, y: sy } = self.gesture {
                    if self.beyond_slop(sx, sy, x, y) {
                        self.gesture = Gesture::Dragging;
                    }
                }
                None
            }
            PointerEvent::Up { x, y } => {
                let gesture = std::mem::replace(&mut self.gesture, Gesture::Idle);
                match gesture {
                    Gesture::Pressed { x: sx, y: sy } if !self.beyond_slop(sx, sy, x, y) => {
                        self.tap(x as i32, y as i32)
                    }
                    _ => None,
                }
            }
            PointerEvent::Cancel => {
                self.gesture = Gesture::Idle;
                None
            }
        }
    }

    fn beyond_slop(&self, start_x: f32, start_y: f32, x: f32, y: f32) -> bool {
        let slop = self.config.touch_slop_px();
        (x - start_x).abs() > slop || (y - start_y).abs() > slop
    }

    fn tap(&self, x: i32, y: i32) -> Option<CanvasEvent> {
        if let Some(index) = self.faces.hit_test(x, y) {
            let has_mask = self.faces.get(index).is_some_and(|face| face.mask.is_some());
            return Some(CanvasEvent::FaceSelected { index, has_mask });
        }
        match &self.photo {
            Some(photo) if photo.contains(x, y) => Some(CanvasEvent::PhotoTapped { x, y }),
            _ => None,
        }
    }

    /// Drawing steps for the current state: photo, then each face outline
    /// followed by its mask.
    pub fn draw_commands(&self, catalog: &GlyphCatalog) -> Vec<DrawCommand> {
        let Some(photo) = &self.photo else {
            return Vec::new();
        };
        let stroke = self.config.dp_to_px(FRAME_STROKE_DP).max(1) as u32;
        let padding = self.config.dp_to_px(MASK_PADDING_DP);

        let mut commands = vec![DrawCommand::Photo {
            image: Arc::clone(photo.image()),
            offset: photo.offset(),
        }];
        for (index, face) in self.faces.iter().enumerate() {
            commands.push(DrawCommand::FaceFrame {
                rect: face.rect,
                color: frame_color(index),
                stroke,
            });
            if let Some(emoji) = face.mask {
                let dest = face.rect.inset(padding);
                let source = catalog.get(emoji).and_then(|glyph| {
                    glyph_source_rect(dest, Size::new(glyph.width(), glyph.height()), self.viewport)
                });
                commands.push(DrawCommand::Mask {
                    emoji,
                    dest,
                    source,
                });
            }
        }
        commands
    }

    /// Render the current frame at viewport size.
    pub fn render(&self, catalog: &GlyphCatalog) -> RgbaImage {
        render::render(&self.draw_commands(catalog), self.viewport, catalog)
    }

    /// Display-space padding between a face outline and its glyph.
    pub fn mask_padding(&self) -> i32 {
        self.config.dp_to_px(MASK_PADDING_DP)
    }
}
