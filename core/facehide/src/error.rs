use thiserror::Error;

#[derive(Debug, Error)]
pub enum FaceHideError {
    #[error("no image loaded")]
    NoImage,

    #[error("no storage available: {0}")]
    NoStorage(String),

    #[error("not enough storage space: {0}")]
    InsufficientSpace(String),

    #[error("no faces detected")]
    NoFaces,

    #[error("failed to read image: {0}")]
    ImageRead(String),

    #[error("face detection failed: {0}")]
    Detection(String),

    #[error("face detection cancelled")]
    Cancelled,

    #[error("image dimensions must be positive, got {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("face index {index} out of range for {len} faces")]
    FaceIndexOutOfRange { index: usize, len: usize },

    #[error("file name must not contain path components: {0:?}")]
    InvalidFileName(String),

    #[error("failed to encode image: {0}")]
    Encode(String),

    #[error("failed to access preferences: {0}")]
    Preferences(String),
}

/// User-visible error categories published on the session error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NoImage,
    NoStorage,
    InsufficientSpace,
    NoFaces,
    ImageRead,
    DetectionFailed,
    Cancelled,
    /// Programming errors that a user cannot act on.
    Internal,
}

impl FaceHideError {
    /// Category shown to the user for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FaceHideError::NoImage => ErrorKind::NoImage,
            FaceHideError::NoStorage(_) => ErrorKind::NoStorage,
            FaceHideError::InsufficientSpace(_) | FaceHideError::Encode(_) => {
                ErrorKind::InsufficientSpace
            }
            FaceHideError::NoFaces => ErrorKind::NoFaces,
            FaceHideError::ImageRead(_) => ErrorKind::ImageRead,
            FaceHideError::Detection(_) => ErrorKind::DetectionFailed,
            FaceHideError::Cancelled => ErrorKind::Cancelled,
            FaceHideError::InvalidDimensions { .. }
            | FaceHideError::FaceIndexOutOfRange { .. }
            | FaceHideError::InvalidFileName(_)
            | FaceHideError::Preferences(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_failures_surface_as_storage_space() {
        let err = FaceHideError::Encode("disk full".into());
        assert_eq!(err.kind(), ErrorKind::InsufficientSpace);
    }

    #[test]
    fn display_includes_context() {
        let err = FaceHideError::FaceIndexOutOfRange { index: 3, len: 2 };
        assert_eq!(err.to_string(), "face index 3 out of range for 2 faces");
    }
}
