use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::FaceHideError;

/// Persisted user settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Pick a mask for each face from its smiling score.
    pub auto_mask: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self { auto_mask: true }
    }
}

impl Preferences {
    /// Read preferences from `path`, falling back to defaults when the file
    /// does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FaceHideError> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                debug!("preferences: {} missing, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => return Err(FaceHideError::Preferences(e.to_string())),
        };
        serde_json::from_str(&raw).map_err(|e| FaceHideError::Preferences(e.to_string()))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FaceHideError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FaceHideError::Preferences(e.to_string()))?;
        }
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| FaceHideError::Preferences(e.to_string()))?;
        fs::write(path, raw).map_err(|e| FaceHideError::Preferences(e.to_string()))
    }
}
