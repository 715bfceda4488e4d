//! Compile cache for vw views.
//!
//! Root templates are mirrored verbatim into a view cache directory before the
//! template engine compiles them. This crate decides when a mirror is stale and
//! refreshes it:
//!
//! - [`TemplateSource`]: A requested template (path, view identifier, mtime)
//! - [`CachedArtifact`]: The mirrored copy inside the view cache
//! - [`CompileCache`]: Staleness checks and per-view serialized refreshes
//!
//! # Staleness
//!
//! An artifact is stale when it does not exist or when the source was modified
//! at or after the artifact ([`is_expired`]). The comparison is non-strict, so
//! a source saved within the same timestamp tick as its artifact is refreshed
//! again.
//!
//! # Example
//!
//! ```no_run
//! # fn main() -> Result<(), vw_cache::CacheError> {
//! use std::path::Path;
//! use vw_cache::CompileCache;
//!
//! let cache = CompileCache::new("theme/views/cache", "theme/.views_cache");
//! cache.ensure_cache_dirs()?;
//!
//! let check = cache.ensure_fresh(Path::new("theme/home.html"), false)?;
//! assert_eq!(check.render_name, "cache/home");
//! # Ok(())
//! # }
//! ```

mod compile;
mod source;

use std::path::PathBuf;

pub use compile::{CacheCheck, CachedArtifact, CompileCache};
pub use source::{TemplateSource, is_expired, view_id};

/// Namespace segment prefixed to render names of cached artifacts.
pub const CACHE_NAMESPACE: &str = "cache";

/// File extension of cached artifacts.
pub const ARTIFACT_EXTENSION: &str = "jinja";

/// Error returned by compile cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// A cache directory could not be created.
    #[error("Failed to create cache directory {}: {source}", path.display())]
    Filesystem {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// Reading a source or writing an artifact failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying OS error.
        source: std::io::Error,
    },
    /// The path has no file name to derive a view identifier from.
    #[error("Cannot derive a view identifier from {}", .0.display())]
    InvalidSource(PathBuf),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
