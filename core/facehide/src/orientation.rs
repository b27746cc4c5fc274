use std::io::Cursor;

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};
use log::{debug, warn};

use crate::error::FaceHideError;

/// Clockwise rotation that turns the stored pixels upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => image,
            Rotation::Rotate90 => image.rotate90(),
            Rotation::Rotate180 => image.rotate180(),
            Rotation::Rotate270 => image.rotate270(),
        }
    }
}

impl From<Orientation> for Rotation {
    /// Mirrored orientations are not produced by cameras in practice and are
    /// treated as upright.
    fn from(orientation: Orientation) -> Self {
        match orientation {
            Orientation::Rotate90 => Rotation::Rotate90,
            Orientation::Rotate180 => Rotation::Rotate180,
            Orientation::Rotate270 => Rotation::Rotate270,
            Orientation::NoTransforms => Rotation::None,
            other => {
                warn!("ignoring mirrored orientation {:?}", other);
                Rotation::None
            }
        }
    }
}

/// Rotation recorded in the image's EXIF data; `Rotation::None` when the
/// data is missing or unreadable.
pub fn read_rotation(bytes: &[u8]) -> Rotation {
    let orientation = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| e.to_string())
        .and_then(|reader| reader.into_decoder().map_err(|e| e.to_string()))
        .and_then(|mut decoder| decoder.orientation().map_err(|e| e.to_string()));
    match orientation {
        Ok(orientation) => orientation.into(),
        Err(e) => {
            warn!("read_rotation: no usable orientation: {e}");
            Rotation::None
        }
    }
}

/// Decode `bytes` and rotate the result upright.
pub fn load_oriented(bytes: &[u8]) -> Result<DynamicImage, FaceHideError> {
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| FaceHideError::ImageRead(e.to_string()))?
        .into_decoder()
        .map_err(|e| FaceHideError::ImageRead(e.to_string()))?;

    let rotation = match decoder.orientation() {
        Ok(orientation) => Rotation::from(orientation),
        Err(e) => {
            warn!("load_oriented: unreadable orientation, assuming upright: {e}");
            Rotation::None
        }
    };
    debug!("load_oriented: {:?}", rotation);

    let image =
        DynamicImage::from_decoder(decoder).map_err(|e| FaceHideError::ImageRead(e.to_string()))?;
    Ok(rotation.apply(image))
}
