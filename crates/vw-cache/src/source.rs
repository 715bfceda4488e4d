//! Requested template sources and the staleness rule.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::CacheError;

/// A template requested for rendering.
///
/// Recomputed on every request, never persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TemplateSource {
    /// Absolute path of the source template.
    pub path: PathBuf,
    /// File name with its extension stripped (e.g. `home` for `home.html`).
    pub view_id: String,
    /// Last modification time of the source.
    pub mtime: SystemTime,
}

impl TemplateSource {
    /// Stat `path` and derive its view identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidSource`] if the path has no file name and
    /// [`CacheError::Io`] if the file cannot be stat'ed.
    pub fn from_path(path: &Path) -> Result<Self, CacheError> {
        let view_id = view_id(path).ok_or_else(|| CacheError::InvalidSource(path.to_path_buf()))?;
        let mtime = modified(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            view_id,
            mtime,
        })
    }
}

/// Derive the view identifier from a template path.
///
/// Only the last extension is stripped: `page.blade.html` becomes `page.blade`.
#[must_use]
pub fn view_id(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_owned)
}

/// Whether a target produced from a source must be regenerated.
///
/// Non-strict: equal timestamps count as expired.
#[must_use]
pub fn is_expired(source_mtime: SystemTime, target_mtime: SystemTime) -> bool {
    source_mtime >= target_mtime
}

pub(crate) fn modified(path: &Path) -> Result<SystemTime, CacheError> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map_err(|e| CacheError::io(path, e))
}
