use log::debug;

use crate::canvas::Photo;
use crate::detector::DetectionResult;
use crate::error::FaceHideError;
use crate::geometry::{map_rect, Rect, Size};

/// The fixed catalog of mask glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Emoji {
    Wink,
    Unhappy,
    TongueOut,
    Suspicious,
    Suspicious1,
    Surprised,
    Surprised1,
    Smile,
    Smiling,
    Smart,
    Secret,
    Sad,
    Quiet,
    Ninja,
    Nerd,
    Mad,
    Kissing,
    InLove,
    Ill,
    Happy,
    Happy1,
    Happy2,
    Happy3,
    Happy4,
    Embarrassed,
    Emoticons,
    Crying,
    Crying1,
    Confused,
    Confused1,
    Bored,
    Bored1,
    Bored2,
    Angry,
    Angry1,
}

impl Emoji {
    /// Every glyph, in picker order.
    pub const ALL: [Emoji; 35] = [
        Emoji::Wink,
        Emoji::Unhappy,
        Emoji::TongueOut,
        Emoji::Suspicious,
        Emoji::Suspicious1,
        Emoji::Surprised,
        Emoji::Surprised1,
        Emoji::Smile,
        Emoji::Smiling,
        Emoji::Smart,
        Emoji::Secret,
        Emoji::Sad,
        Emoji::Quiet,
        Emoji::Ninja,
        Emoji::Nerd,
        Emoji::Mad,
        Emoji::Kissing,
        Emoji::InLove,
        Emoji::Ill,
        Emoji::Happy,
        Emoji::Happy1,
        Emoji::Happy2,
        Emoji::Happy3,
        Emoji::Happy4,
        Emoji::Embarrassed,
        Emoji::Emoticons,
        Emoji::Crying,
        Emoji::Crying1,
        Emoji::Confused,
        Emoji::Confused1,
        Emoji::Bored,
        Emoji::Bored1,
        Emoji::Bored2,
        Emoji::Angry,
        Emoji::Angry1,
    ];

    /// File stem of the glyph asset, e.g. `tongue_out` for `tongue_out.png`.
    pub fn stem(self) -> &'static str {
        match self {
            Emoji::Wink => "wink",
            Emoji::Unhappy => "unhappy",
            Emoji::TongueOut => "tongue_out",
            Emoji::Suspicious => "suspicious",
            Emoji::Suspicious1 => "suspicious_1",
            Emoji::Surprised => "surprised",
            Emoji::Surprised1 => "surprised_1",
            Emoji::Smile => "smile",
            Emoji::Smiling => "smiling",
            Emoji::Smart => "smart",
            Emoji::Secret => "secret",
            Emoji::Sad => "sad",
            Emoji::Quiet => "quiet",
            Emoji::Ninja => "ninja",
            Emoji::Nerd => "nerd",
            Emoji::Mad => "mad",
            Emoji::Kissing => "kissing",
            Emoji::InLove => "in_love",
            Emoji::Ill => "ill",
            Emoji::Happy => "happy",
            Emoji::Happy1 => "happy_1",
            Emoji::Happy2 => "happy_2",
            Emoji::Happy3 => "happy_3",
            Emoji::Happy4 => "happy_4",
            Emoji::Embarrassed => "embarrassed",
            Emoji::Emoticons => "emoticons",
            Emoji::Crying => "crying",
            Emoji::Crying1 => "crying_1",
            Emoji::Confused => "confused",
            Emoji::Confused1 => "confused_1",
            Emoji::Bored => "bored",
            Emoji::Bored1 => "bored_1",
            Emoji::Bored2 => "bored_2",
            Emoji::Angry => "angry",
            Emoji::Angry1 => "angry_1",
        }
    }
}

/// Smiling-probability thresholds used to pre-assign masks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassificationPolicy {
    /// Scores at or above this get the pleased glyph.
    pub pleased: f32,
    /// Scores at or above this (and below `pleased`) get the neutral glyph.
    pub neutral: f32,
}

impl Default for ClassificationPolicy {
    fn default() -> Self {
        Self {
            pleased: 0.7,
            neutral: 0.4,
        }
    }
}

impl ClassificationPolicy {
    pub fn glyph_for(&self, smiling: Option<f32>) -> Emoji {
        match smiling {
            Some(score) if score >= self.pleased => Emoji::Smiling,
            Some(score) if score >= self.neutral => Emoji::Confused,
            _ => Emoji::Sad,
        }
    }
}

/// One detected face on the drawing surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceRegion {
    /// Surface-space rectangle.
    pub rect: Rect,
    pub mask: Option<Emoji>,
}

/// An assigned mask placed relative to the photo's own origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacedMask {
    pub emoji: Emoji,
    pub rect: Rect,
}

/// Everything the save path needs: the displayed photo resolution and the
/// masks expressed in that photo's pixel space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskExport {
    pub size: Size,
    pub masks: Vec<PlacedMask>,
    /// Inset between a face rectangle and its glyph, in the same space.
    pub padding: i32,
}

/// Ordered face regions of the currently displayed photo.
///
/// Regions are identified by their index. A new detection result replaces
/// the whole sequence.
#[derive(Debug, Clone, Default)]
pub struct FaceOverlay {
    faces: Vec<FaceRegion>,
}

impl FaceOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all regions with the faces of `result`, mapped into the
    /// display space of `photo`.
    ///
    /// With a `policy`, each region starts with the glyph matching its
    /// smiling score. On error the current regions are left untouched.
    pub fn replace_faces(
        &mut self,
        result: &DetectionResult,
        photo: &Photo,
        policy: Option<&ClassificationPolicy>,
    ) -> Result<(), FaceHideError> {
        let faces = result
            .faces
            .iter()
            .map(|face| {
                let rect = map_rect(face.bounds, result.size, photo.size(), photo.offset())?;
                let mask = policy.map(|p| p.glyph_for(face.smiling));
                Ok(FaceRegion { rect, mask })
            })
            .collect::<Result<Vec<_>, FaceHideError>>()?;

        debug!(
            "replace_faces: {} faces from {}x{} onto {}x{}",
            faces.len(),
            result.size.width,
            result.size.height,
            photo.size().width,
            photo.size().height
        );
        self.faces = faces;
        Ok(())
    }

    /// Set (`Some`) or remove (`None`) the mask of the face at `index`.
    pub fn assign_mask(&mut self, index: usize, emoji: Option<Emoji>) -> Result<(), FaceHideError> {
        let len = self.faces.len();
        let face = self
            .faces
            .get_mut(index)
            .ok_or(FaceHideError::FaceIndexOutOfRange { index, len })?;
        face.mask = emoji;
        Ok(())
    }

    /// Assigned masks relative to `photo`'s origin, in sequence order.
    pub fn export_results(&self, photo: &Photo) -> MaskExport {
        let masks = self
            .faces
            .iter()
            .filter_map(|face| {
                face.mask.map(|emoji| PlacedMask {
                    emoji,
                    rect: face.rect.relative_to(photo.offset()),
                })
            })
            .collect();
        MaskExport {
            size: photo.size(),
            masks,
            padding: 0,
        }
    }

    /// Index of the first region containing `(x, y)`.
    ///
    /// Earlier regions win where rectangles overlap.
    pub fn hit_test(&self, x: i32, y: i32) -> Option<usize> {
        self.faces.iter().position(|face| face.rect.contains(x, y))
    }

    pub fn clear(&mut self) {
        self.faces.clear();
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FaceRegion> {
        self.faces.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FaceRegion> {
        self.faces.iter()
    }
}
