//! Host integration points.

use std::io;
use std::path::Path;

use vw_controllers::ViewData;

/// The application embedding the pipeline.
pub trait Host: Send + Sync {
    /// Whether the engine should handle the current request at all.
    fn engine_active(&self) -> bool;

    /// Receive rendered output.
    ///
    /// # Errors
    ///
    /// Returns an error if the output could not be delivered; the request
    /// then fails instead of reporting the include as handled.
    fn emit(&self, output: &str) -> io::Result<()>;
}

/// Optional rewrites applied around every render.
///
/// Every method defaults to leaving its input unchanged.
pub trait RenderHooks: Send + Sync {
    /// Rewrite the view name before rendering.
    fn template(&self, name: String, _data: &ViewData) -> String {
        name
    }

    /// Rewrite the data passed to the view.
    fn arguments(&self, data: ViewData, _name: &str) -> ViewData {
        data
    }

    /// Rewrite the rendered output.
    fn html(&self, html: String, _name: &str, _data: &ViewData) -> String {
        html
    }

    /// Return `true` to refresh the candidate's mirror even if it is fresh.
    fn force_recompile(&self, _source: &Path) -> bool {
        false
    }
}

/// Hooks that change nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl RenderHooks for NoHooks {}
