//! Template engine adapter for vw.
//!
//! [`TemplateEngine`] is the seam between the render pipeline and the
//! template compiler. [`JinjaEngine`] implements it on top of `minijinja`:
//!
//! - Views are loaded by slash-separated name relative to the views
//!   directory (`cache/home` loads `{views_dir}/cache/home.jinja`)
//! - Directives are expanded before compilation and the expanded text is
//!   written to the compiled output directory, where it is reused until the
//!   view changes
//! - Parsed templates are kept in memory until [`TemplateEngine::invalidate`]
//!   or until the source of any loaded view changes on disk
//!
//! # Example
//!
//! ```no_run
//! use vw_directives::DirectiveRegistry;
//! use vw_engine::{Context, JinjaEngine, TemplateEngine};
//!
//! let engine = JinjaEngine::new("theme/views", "theme/.views_cache", DirectiveRegistry::new());
//! engine.configure(|env| env.add_function("posts", || Vec::<String>::new()));
//!
//! let html = engine.render("cache/home", &Context::new()).unwrap();
//! ```

mod compiler;
mod jinja;

use std::error::Error as _;

pub use jinja::{DEFAULT_SANITIZE_FILTER, JinjaEngine};
use vw_directives::DirectiveError;

/// Data passed to a template render.
pub type Context = serde_json::Map<String, serde_json::Value>;

/// Renders named views.
///
/// Implementations must be shareable across request threads.
pub trait TemplateEngine: Send + Sync {
    /// Render view `name` with `data`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError`] if the view is missing, fails to compile, or
    /// fails during rendering.
    fn render(&self, name: &str, data: &Context) -> Result<String, RenderError>;

    /// Whether view `name` can be loaded and compiled.
    fn exists(&self, name: &str) -> bool;

    /// Drop compiled templates held in memory.
    ///
    /// Called after a view's source has been refreshed.
    fn invalidate(&self);
}

/// Error returned by template rendering.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// No view with this name exists.
    #[error("View not found: {0}")]
    NotFound(String),
    /// A directive in the view could not be expanded.
    #[error("Directive error in view {name}: {source}")]
    Directive {
        /// View name.
        name: String,
        /// Expansion error.
        #[source]
        source: DirectiveError,
    },
    /// The view failed to compile or render.
    #[error("Failed to render view {name}: {source}")]
    Template {
        /// View name.
        name: String,
        /// Engine error.
        #[source]
        source: minijinja::Error,
    },
}

impl RenderError {
    /// Classify an engine error for view `name`.
    pub(crate) fn from_engine(name: &str, err: minijinja::Error) -> Self {
        if err.kind() == minijinja::ErrorKind::TemplateNotFound {
            return Self::NotFound(name.to_owned());
        }
        if let Some(directive) = err
            .source()
            .and_then(|source| source.downcast_ref::<DirectiveError>())
        {
            return Self::Directive {
                name: name.to_owned(),
                source: directive.clone(),
            };
        }
        Self::Template {
            name: name.to_owned(),
            source: err,
        }
    }
}
