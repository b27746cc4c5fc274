use crate::error::FaceHideError;

/// Pixel dimensions of a bitmap or drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub(crate) fn ensure_positive(self) -> Result<Self, FaceHideError> {
        if self.width == 0 || self.height == 0 {
            return Err(FaceHideError::InvalidDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(self)
    }
}

/// Integer pixel position on the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle given by its edges.
///
/// `right` and `bottom` are exclusive: a rectangle contains `(x, y)` when
/// `left <= x < right` and `top <= y < bottom`. Empty rectangles contain
/// nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Rectangle of `size` with its top-left corner at `origin`.
    pub fn from_origin(origin: Point, size: Size) -> Self {
        Self {
            left: origin.x,
            top: origin.y,
            right: origin.x + size.width as i32,
            bottom: origin.y + size.height as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.left + self.right) / 2,
            (self.top + self.bottom) / 2,
        )
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        !self.is_empty() && x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Multiply every edge by `factor`, truncating toward zero.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            left: (self.left as f32 * factor) as i32,
            top: (self.top as f32 * factor) as i32,
            right: (self.right as f32 * factor) as i32,
            bottom: (self.bottom as f32 * factor) as i32,
        }
    }

    /// Translate by `point`.
    pub fn offset(&self, point: Point) -> Self {
        Self {
            left: self.left + point.x,
            top: self.top + point.y,
            right: self.right + point.x,
            bottom: self.bottom + point.y,
        }
    }

    /// Translate by the negation of `point`.
    pub fn relative_to(&self, point: Point) -> Self {
        self.offset(Point::new(-point.x, -point.y))
    }

    /// Shrink each edge inward by `padding` pixels, collapsing to the centre
    /// when the rectangle is too small.
    pub fn inset(&self, padding: i32) -> Self {
        let max_x = self.width().max(0) / 2;
        let max_y = self.height().max(0) / 2;
        let px = padding.min(max_x);
        let py = padding.min(max_y);
        Self {
            left: self.left + px,
            top: self.top + py,
            right: self.right - px,
            bottom: self.bottom - py,
        }
    }
}

/// Averaged per-axis ratio between two copies of the same image.
///
/// The width and height ratios are computed independently and averaged,
/// which absorbs the one-pixel aspect drift introduced by integer resizing.
pub fn scale_factor(from: Size, to: Size) -> Result<f32, FaceHideError> {
    let from = from.ensure_positive()?;
    let to = to.ensure_positive()?;
    let width_factor = to.width as f32 / from.width as f32;
    let height_factor = to.height as f32 / from.height as f32;
    Ok((width_factor + height_factor) / 2.0)
}

/// Map `rect` from a bitmap of size `from` into a bitmap of size `to`,
/// then translate it by `offset`.
pub fn map_rect(rect: Rect, from: Size, to: Size, offset: Point) -> Result<Rect, FaceHideError> {
    let factor = scale_factor(from, to)?;
    Ok(rect.scaled(factor).offset(offset))
}

/// Largest size with the image's aspect ratio that fits inside `container`.
///
/// Images that already fit keep their size; nothing is scaled up.
pub fn fit_to_box(image: Size, container: Size) -> Result<Size, FaceHideError> {
    let image = image.ensure_positive()?;
    let container = container.ensure_positive()?;

    let width_factor = container.width as f32 / image.width as f32;
    let height_factor = container.height as f32 / image.height as f32;
    let scale = width_factor.min(height_factor);
    if scale >= 1.0 {
        return Ok(image);
    }

    let width = ((image.width as f32 * scale) as u32).clamp(1, container.width);
    let height = ((image.height as f32 * scale) as u32).clamp(1, container.height);
    Ok(Size::new(width, height))
}

/// Top-left placement that centres `content` inside `container`.
pub fn centered_offset(content: Size, container: Size) -> Point {
    if content == container {
        return Point::default();
    }
    let margin =
        |container: u32, content: u32| ((container as i64 - content as i64) / 2).max(0) as i32;
    Point::new(
        margin(container.width, content.width),
        margin(container.height, content.height),
    )
}

/// Factor that brings the smaller side of `size` to `max_side`.
///
/// The factor is reported even when it would enlarge the image, which
/// detection never does: use [`detection_size`] for the bitmap actually
/// submitted.
pub fn detection_scale_factor(size: Size, max_side: u32) -> f32 {
    let min_side = size.width.min(size.height).max(1);
    max_side as f32 / min_side as f32
}

/// Size of the bitmap submitted for detection.
///
/// Only images whose smaller side exceeds `max_side` are reduced; the
/// smaller side then becomes exactly `max_side` and the other follows the
/// same factor.
pub fn detection_size(size: Size, max_side: u32) -> Size {
    if size.width.min(size.height) <= max_side {
        return size;
    }
    let factor = detection_scale_factor(size, max_side);
    if size.width <= size.height {
        Size::new(max_side, ((size.height as f32 * factor) as u32).max(1))
    } else {
        Size::new(((size.width as f32 * factor) as u32).max(1), max_side)
    }
}
