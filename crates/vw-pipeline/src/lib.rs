//! Request-time render pipeline for vw.
//!
//! [`RenderPipeline::handle`] is called by the host for every template
//! candidate it is about to include. Candidates outside the template root,
//! or requests the host does not hand to the engine, pass through unchanged.
//! Everything else is rendered here:
//!
//! 1. The candidate's mirror in the view cache is refreshed if stale
//! 2. Compiled templates are invalidated after a refresh
//! 3. Controllers bound to the view produce its data
//! 4. The view is rendered and emitted through [`Host::emit`]; a failed
//!    emit fails the request
//! 5. An empty string is returned so the host skips its own include
//!
//! Errors abort the request; no failure is turned into empty output.
//!
//! # Example
//!
//! ```no_run
//! use std::io::Write;
//! use std::sync::Arc;
//! use vw_config::Config;
//! use vw_pipeline::{Host, PipelineBuilder};
//!
//! struct Stdout;
//!
//! impl Host for Stdout {
//!     fn engine_active(&self) -> bool {
//!         true
//!     }
//!
//!     fn emit(&self, output: &str) -> std::io::Result<()> {
//!         let mut stdout = std::io::stdout().lock();
//!         stdout.write_all(output.as_bytes())?;
//!         stdout.flush()
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load(None, None)?;
//! let pipeline = PipelineBuilder::from_config(&config)?.build(Arc::new(Stdout))?;
//! let rest = pipeline.handle("/srv/theme/home.html")?;
//! assert!(rest.is_empty() || rest == "/srv/theme/home.html");
//! # Ok(())
//! # }
//! ```

mod builder;
mod hooks;
mod pipeline;

pub use builder::PipelineBuilder;
pub use hooks::{Host, NoHooks, RenderHooks};
pub use pipeline::{PipelineConfig, RenderPipeline};

use vw_cache::CacheError;
use vw_controllers::ControllerError;
use vw_directives::DirectiveError;
use vw_engine::RenderError;

/// Error taxonomy exposed to hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Startup configuration is invalid. Fatal.
    Configuration,
    /// A cache directory or file operation failed. Request-scoped.
    Filesystem,
    /// Data binding or rendering failed. Request-scoped.
    Render,
}

/// Error returned by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Compile cache failure.
    #[error(transparent)]
    Cache(#[from] CacheError),
    /// Controller construction or data failure.
    #[error(transparent)]
    Controller(#[from] ControllerError),
    /// Directive registration failure.
    #[error(transparent)]
    Directive(#[from] DirectiveError),
    /// Template engine failure.
    #[error(transparent)]
    Render(#[from] RenderError),
    /// The host could not take the rendered output.
    #[error("Failed to emit rendered view: {0}")]
    Emit(#[source] std::io::Error),
}

impl PipelineError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cache(_) => ErrorKind::Filesystem,
            Self::Controller(ControllerError::Configuration { .. }) | Self::Directive(_) => {
                ErrorKind::Configuration
            }
            Self::Controller(_) | Self::Render(_) | Self::Emit(_) => ErrorKind::Render,
        }
    }
}
