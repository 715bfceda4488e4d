//! File-based compile cache.
//!
//! [`CompileCache`] mirrors root templates into the view cache directory so the
//! template engine can load them by name:
//!
//! ```text
//! {views_dir}/
//! +-- cache/             # view cache (artifacts)
//!     +-- home.jinja     # mirror of {root}/home.html, rendered as "cache/home"
//! {cache_dir}/           # compiled output, owned by the engine
//! ```
//!
//! Artifacts are written to a temporary file in the view cache directory and
//! renamed into place, so a concurrent reader sees either the previous or the
//! new content, never a partial write. Refreshes of the same view are
//! serialized by a per-view mutex held across the staleness check.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use crate::source::{is_expired, modified, view_id};
use crate::{ARTIFACT_EXTENSION, CACHE_NAMESPACE, CacheError};

/// A mirrored source inside the view cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedArtifact {
    /// Name the engine renders the artifact under (e.g. `cache/home`).
    pub render_name: String,
    /// Path of the artifact file.
    pub path: PathBuf,
    /// Last modification time of the artifact.
    pub mtime: SystemTime,
    /// Bytes copied from the source at the last refresh.
    pub content: Vec<u8>,
}

/// Outcome of [`CompileCache::ensure_fresh`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheCheck {
    /// View identifier derived from the source file name.
    pub view_id: String,
    /// Name the engine renders the artifact under.
    pub render_name: String,
    /// Whether the artifact was rewritten during this check.
    pub refreshed: bool,
}

/// Compile cache rooted at a view cache directory.
pub struct CompileCache {
    view_cache_dir: PathBuf,
    cache_dir: PathBuf,
    /// One mutex per view identifier, created on first use.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CompileCache {
    /// Create a compile cache.
    ///
    /// # Arguments
    ///
    /// * `view_cache_dir` - Directory artifacts are mirrored into (`{views_dir}/cache`)
    /// * `cache_dir` - Compiled output directory owned by the engine
    #[must_use]
    pub fn new(view_cache_dir: impl Into<PathBuf>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            view_cache_dir: view_cache_dir.into(),
            cache_dir: cache_dir.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Directory artifacts are mirrored into.
    #[must_use]
    pub fn view_cache_dir(&self) -> &Path {
        &self.view_cache_dir
    }

    /// Create the compiled output directory and the view cache directory.
    ///
    /// Succeeds silently when both already exist.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Filesystem`] if the OS rejects directory creation.
    pub fn ensure_cache_dirs(&self) -> Result<(), CacheError> {
        for dir in [&self.cache_dir, &self.view_cache_dir] {
            if dir.is_dir() {
                continue;
            }
            fs::create_dir_all(dir).map_err(|source| CacheError::Filesystem {
                path: dir.clone(),
                source,
            })?;
            tracing::info!(path = %dir.display(), "Created cache directory");
        }
        Ok(())
    }

    /// Path of the artifact for a view identifier.
    #[must_use]
    pub fn artifact_path(&self, view_id: &str) -> PathBuf {
        self.view_cache_dir
            .join(format!("{view_id}.{ARTIFACT_EXTENSION}"))
    }

    /// Name the engine renders a view's artifact under.
    #[must_use]
    pub fn render_name(view_id: &str) -> String {
        format!("{CACHE_NAMESPACE}/{view_id}")
    }

    /// Check whether the artifact for `source_path` must be refreshed.
    ///
    /// Returns `true` if no artifact exists, or if the source was modified at
    /// or after the artifact.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the source or artifact cannot be stat'ed.
    pub fn is_stale(&self, source_path: &Path) -> Result<bool, CacheError> {
        let view_id = source_view_id(source_path)?;
        let artifact_path = self.artifact_path(&view_id);

        let artifact_mtime = match fs::metadata(&artifact_path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(CacheError::io(artifact_path, e)),
        };

        Ok(is_expired(modified(source_path)?, artifact_mtime))
    }

    /// Copy the source verbatim into its artifact and return the render name.
    ///
    /// If the source carries a modification time later than the write time,
    /// the artifact's mtime is raised to match it.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if reading the source or writing the
    /// artifact fails. Nothing must be rendered in that case.
    pub fn refresh(&self, source_path: &Path) -> Result<String, CacheError> {
        let view_id = source_view_id(source_path)?;
        let artifact_path = self.artifact_path(&view_id);

        let source_mtime = modified(source_path)?;
        let content = fs::read(source_path).map_err(|e| CacheError::io(source_path, e))?;

        let mut tmp = tempfile::NamedTempFile::new_in(&self.view_cache_dir)
            .map_err(|e| CacheError::io(&self.view_cache_dir, e))?;
        tmp.write_all(&content)
            .map_err(|e| CacheError::io(tmp.path().to_path_buf(), e))?;
        raise_mtime(tmp.as_file(), source_mtime)
            .map_err(|e| CacheError::io(tmp.path().to_path_buf(), e))?;
        tmp.persist(&artifact_path)
            .map_err(|e| CacheError::io(&artifact_path, e.error))?;

        tracing::debug!(
            view = %view_id,
            source = %source_path.display(),
            bytes = content.len(),
            "Refreshed cached view"
        );

        Ok(Self::render_name(&view_id))
    }

    /// Refresh the artifact for `source_path` if it is stale (or if `force`).
    ///
    /// The staleness check and refresh run under a per-view mutex, so at most
    /// one refresh per view is in flight and concurrent callers wait for it.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`is_stale`](Self::is_stale) and
    /// [`refresh`](Self::refresh).
    pub fn ensure_fresh(&self, source_path: &Path, force: bool) -> Result<CacheCheck, CacheError> {
        self.ensure_fresh_with(source_path, force, || {})
    }

    /// Like [`ensure_fresh`](Self::ensure_fresh), running `on_refresh` after a
    /// refresh while the per-view mutex is still held.
    ///
    /// Callers that see the view as fresh return only after `on_refresh` has
    /// finished, so state derived from the old artifact can be dropped there.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`is_stale`](Self::is_stale) and
    /// [`refresh`](Self::refresh). `on_refresh` is not called on error.
    pub fn ensure_fresh_with(
        &self,
        source_path: &Path,
        force: bool,
        on_refresh: impl FnOnce(),
    ) -> Result<CacheCheck, CacheError> {
        let view_id = source_view_id(source_path)?;
        let lock = self.view_lock(&view_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let refreshed = if force || self.is_stale(source_path)? {
            self.refresh(source_path)?;
            on_refresh();
            true
        } else {
            tracing::debug!(view = %view_id, "Cached view is fresh");
            false
        };

        Ok(CacheCheck {
            render_name: Self::render_name(&view_id),
            view_id,
            refreshed,
        })
    }

    /// Read the current artifact for a view identifier, if any.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Io`] if the artifact exists but cannot be read.
    pub fn artifact(&self, view_id: &str) -> Result<Option<CachedArtifact>, CacheError> {
        let path = self.artifact_path(view_id);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(path, e)),
        };
        let mtime = modified(&path)?;
        Ok(Some(CachedArtifact {
            render_name: Self::render_name(view_id),
            path,
            mtime,
            content,
        }))
    }

    fn view_lock(&self, view_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(view_id.to_owned()).or_default())
    }
}

fn source_view_id(source_path: &Path) -> Result<String, CacheError> {
    view_id(source_path).ok_or_else(|| CacheError::InvalidSource(source_path.to_path_buf()))
}

/// Keep the artifact at least as new as its source.
fn raise_mtime(file: &fs::File, source_mtime: SystemTime) -> io::Result<()> {
    let written = file.metadata()?.modified()?;
    if source_mtime > written {
        file.set_modified(source_mtime)?;
    }
    Ok(())
}
