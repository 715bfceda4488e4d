//! Directive expansion with an on-disk compiled output cache.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

use minijinja::{Error, ErrorKind};
use vw_cache::{ARTIFACT_EXTENSION, is_expired};
use vw_directives::DirectiveRegistry;

/// Loads views from the views directory and expands their directives.
///
/// Expanded text is written to `{cache_dir}/{name}.jinja` and reused while
/// it is newer than both the view and the last invalidation. Construction
/// counts as an invalidation, so output left by an earlier process is
/// expanded again with the current directives and capabilities.
pub(crate) struct ViewCompiler {
    views_dir: PathBuf,
    cache_dir: PathBuf,
    directives: DirectiveRegistry,
    invalidated_at: Mutex<SystemTime>,
    /// Source path and mtime of every view handed to the environment.
    loaded: Mutex<HashMap<String, (PathBuf, SystemTime)>>,
}

impl ViewCompiler {
    pub(crate) fn new(views_dir: PathBuf, cache_dir: PathBuf, directives: DirectiveRegistry) -> Self {
        Self {
            views_dir,
            cache_dir,
            directives,
            invalidated_at: Mutex::new(SystemTime::now()),
            loaded: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the source file for a view name.
    pub(crate) fn source_path(&self, name: &str) -> Option<PathBuf> {
        relative_path(name).map(|rel| self.views_dir.join(rel))
    }

    /// Path of the compiled output for a view name.
    pub(crate) fn compiled_path(&self, name: &str) -> Option<PathBuf> {
        relative_path(name).map(|rel| self.cache_dir.join(rel))
    }

    /// Mark every compiled output written before now as expired.
    pub(crate) fn invalidate(&self) {
        *self
            .invalidated_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = SystemTime::now();
        self.forget_loaded();
    }

    /// First loaded view whose source changed or vanished since it was loaded.
    pub(crate) fn changed_view(&self) -> Option<String> {
        let loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        loaded
            .iter()
            .find(|(_, (path, mtime))| {
                fs::metadata(path).and_then(|m| m.modified()).ok() != Some(*mtime)
            })
            .map(|(name, _)| name.clone())
    }

    /// Stop tracking loaded views; call when the environment drops them.
    pub(crate) fn forget_loaded(&self) {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Loader entry point: `Ok(None)` when the view does not exist.
    pub(crate) fn load(&self, name: &str) -> Result<Option<String>, Error> {
        let (Some(source_path), Some(compiled_path)) =
            (self.source_path(name), self.compiled_path(name))
        else {
            return Ok(None);
        };

        let source_mtime = match fs::metadata(&source_path).and_then(|m| m.modified()) {
            Ok(mtime) => mtime,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&source_path, e)),
        };

        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned(), (source_path.clone(), source_mtime));

        if let Some(compiled) = self.reusable_output(&compiled_path, source_mtime) {
            tracing::debug!(view = %name, "Using compiled view");
            return Ok(Some(compiled));
        }

        let source = fs::read_to_string(&source_path).map_err(|e| io_error(&source_path, e))?;
        let expanded = self.directives.expand(&source).map_err(|e| {
            Error::new(
                ErrorKind::SyntaxError,
                format!("failed to expand directives in {name}"),
            )
            .with_source(e)
        })?;

        if let Err(e) = write_atomic(&compiled_path, &expanded) {
            tracing::warn!(
                view = %name,
                path = %compiled_path.display(),
                error = %e,
                "Failed to write compiled view"
            );
        } else {
            tracing::debug!(view = %name, path = %compiled_path.display(), "Compiled view");
        }

        Ok(Some(expanded))
    }

    fn reusable_output(&self, compiled_path: &Path, source_mtime: SystemTime) -> Option<String> {
        let compiled_mtime = fs::metadata(compiled_path)
            .and_then(|m| m.modified())
            .ok()?;
        let invalidated_at = *self
            .invalidated_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let newest_input = invalidated_at.max(source_mtime);

        if is_expired(newest_input, compiled_mtime) {
            return None;
        }
        fs::read_to_string(compiled_path).ok()
    }
}

/// Map a view name to a relative file path, rejecting traversal.
fn relative_path(name: &str) -> Option<PathBuf> {
    let segments: Vec<&str> = name.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == ".." || s.contains('\\'))
    {
        return None;
    }

    let (file, dirs) = segments.split_last()?;
    let mut path: PathBuf = dirs.iter().collect();
    path.push(format!("{file}.{ARTIFACT_EXTENSION}"));
    Some(path)
}

fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn io_error(path: &Path, err: io::Error) -> Error {
    Error::new(
        ErrorKind::InvalidOperation,
        format!("failed to read {}", path.display()),
    )
    .with_source(err)
}
