//! `minijinja` implementation of [`TemplateEngine`].

use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use minijinja::{AutoEscape, Environment, Value};
use vw_directives::DirectiveRegistry;

use crate::compiler::ViewCompiler;
use crate::{Context, RenderError, TemplateEngine};

/// Filter name the `var` directive pipes values through by default.
pub const DEFAULT_SANITIZE_FILTER: &str = "sanitize";

/// Template engine backed by a `minijinja` environment.
///
/// Renders take a read lock on the environment; [`invalidate`] and
/// [`configure`] take the write lock. Before each render the sources of
/// every parsed view are checked, and parsed views are dropped when one of
/// them changed, so edits to includes and layouts show up on the next render.
///
/// [`invalidate`]: TemplateEngine::invalidate
/// [`configure`]: JinjaEngine::configure
pub struct JinjaEngine {
    env: RwLock<Environment<'static>>,
    compiler: Arc<ViewCompiler>,
}

impl JinjaEngine {
    /// Create an engine loading views from `views_dir`.
    ///
    /// Expanded views are written under `cache_dir`. Output is HTML-escaped
    /// unless marked safe. An identity
    /// [`DEFAULT_SANITIZE_FILTER`] filter and a no-op `reset_query` function
    /// are installed; hosts replace them through [`configure`](Self::configure).
    pub fn new(
        views_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        directives: DirectiveRegistry,
    ) -> Self {
        let compiler = Arc::new(ViewCompiler::new(
            views_dir.into(),
            cache_dir.into(),
            directives,
        ));

        let mut env = Environment::new();
        env.set_loader({
            let compiler = Arc::clone(&compiler);
            move |name: &str| compiler.load(name)
        });
        env.set_auto_escape_callback(|_name: &str| AutoEscape::Html);
        env.add_filter(DEFAULT_SANITIZE_FILTER, |value: Value| value);
        env.add_function("reset_query", String::new);

        Self {
            env: RwLock::new(env),
            compiler,
        }
    }

    /// Install an identity filter under `name` for the `var` directive.
    ///
    /// Used when the sanitize filter is renamed in configuration and the host
    /// does not supply its own.
    #[must_use]
    pub fn with_sanitize_filter(self, name: &str) -> Self {
        if name != DEFAULT_SANITIZE_FILTER {
            let filter = name.to_owned();
            self.configure(|env| env.add_filter(filter, |value: Value| value));
        }
        self
    }

    /// Modify the environment, e.g. to add host functions and filters.
    ///
    /// Templates already compiled are dropped so the change applies to every
    /// view.
    pub fn configure<R>(&self, f: impl FnOnce(&mut Environment<'static>) -> R) -> R {
        let mut env = self.env.write().unwrap_or_else(PoisonError::into_inner);
        let result = f(&mut env);
        self.compiler.forget_loaded();
        env.clear_templates();
        result
    }

    /// Directory expanded views are written to.
    #[must_use]
    pub fn cache_dir(&self) -> &std::path::Path {
        self.compiler.cache_dir()
    }

    /// Path of the expanded output for view `name`, if the name is valid.
    #[must_use]
    pub fn compiled_path(&self, name: &str) -> Option<PathBuf> {
        self.compiler.compiled_path(name)
    }

    /// Drop parsed views if any of their sources changed on disk.
    fn reload_changed(&self) {
        if let Some(view) = self.compiler.changed_view() {
            let mut env = self.env.write().unwrap_or_else(PoisonError::into_inner);
            self.compiler.forget_loaded();
            env.clear_templates();
            tracing::debug!(view = %view, "View changed on disk, reloading");
        }
    }
}

impl TemplateEngine for JinjaEngine {
    fn render(&self, name: &str, data: &Context) -> Result<String, RenderError> {
        self.reload_changed();
        let env = self.env.read().unwrap_or_else(PoisonError::into_inner);
        let template = env
            .get_template(name)
            .map_err(|e| RenderError::from_engine(name, e))?;
        template
            .render(data)
            .map_err(|e| RenderError::from_engine(name, e))
    }

    fn exists(&self, name: &str) -> bool {
        self.reload_changed();
        let env = self.env.read().unwrap_or_else(PoisonError::into_inner);
        match env.get_template(name) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(view = %name, error = %e, "View is not renderable");
                false
            }
        }
    }

    fn invalidate(&self) {
        let mut env = self.env.write().unwrap_or_else(PoisonError::into_inner);
        self.compiler.invalidate();
        env.clear_templates();
        tracing::debug!("Cleared compiled views");
    }
}

impl fmt::Debug for JinjaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JinjaEngine")
            .field("cache_dir", &self.compiler.cache_dir())
            .finish_non_exhaustive()
    }
}
