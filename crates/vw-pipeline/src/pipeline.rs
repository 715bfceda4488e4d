//! Render pipeline state machine.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use vw_cache::CompileCache;
use vw_config::{Config, VIEW_CACHE_SEGMENT};
use vw_controllers::{ControllerRegistry, ViewData};
use vw_engine::{DEFAULT_SANITIZE_FILTER, TemplateEngine};

use crate::PipelineError;
use crate::hooks::{Host, RenderHooks};

/// Locations and switches the pipeline runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Candidates outside this directory pass through.
    pub template_root: PathBuf,
    /// Directory the engine loads views from.
    pub views_dir: PathBuf,
    /// Directory the engine writes compiled output to.
    pub cache_dir: PathBuf,
    /// Refresh mirrors on every request.
    pub force_recompile: bool,
    /// Filter the `var` directive pipes values through.
    pub sanitize_filter: String,
    /// Capabilities available at startup.
    pub capabilities: Vec<String>,
}

impl PipelineConfig {
    /// Defaults for a template root: `views` and `.views_cache` beneath it.
    #[must_use]
    pub fn new(template_root: impl Into<PathBuf>) -> Self {
        let template_root = template_root.into();
        Self {
            views_dir: template_root.join("views"),
            cache_dir: template_root.join(".views_cache"),
            template_root,
            force_recompile: false,
            sanitize_filter: DEFAULT_SANITIZE_FILTER.to_owned(),
            capabilities: Vec::new(),
        }
    }

    /// View cache directory holding source mirrors.
    #[must_use]
    pub fn view_cache_dir(&self) -> PathBuf {
        self.views_dir.join(VIEW_CACHE_SEGMENT)
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        let templates = &config.templates_resolved;
        Self {
            template_root: templates.root.clone(),
            views_dir: templates.views_dir.clone(),
            cache_dir: templates.cache_dir.clone(),
            force_recompile: config.engine.force_recompile,
            sanitize_filter: config.engine.sanitize_filter.clone(),
            capabilities: config.engine.capabilities.clone(),
        }
    }
}

/// Decides, per request, whether to render a candidate and renders it.
///
/// Built with [`PipelineBuilder`](crate::PipelineBuilder). Safe to share
/// across request threads.
pub struct RenderPipeline {
    template_root: PathBuf,
    force_recompile: bool,
    cache: CompileCache,
    controllers: Arc<ControllerRegistry>,
    engine: Arc<dyn TemplateEngine>,
    host: Arc<dyn Host>,
    hooks: Arc<dyn RenderHooks>,
}

impl RenderPipeline {
    pub(crate) fn new(
        config: &PipelineConfig,
        cache: CompileCache,
        controllers: Arc<ControllerRegistry>,
        engine: Arc<dyn TemplateEngine>,
        host: Arc<dyn Host>,
        hooks: Arc<dyn RenderHooks>,
    ) -> Self {
        Self {
            template_root: config.template_root.clone(),
            force_recompile: config.force_recompile,
            cache,
            controllers,
            engine,
            host,
            hooks,
        }
    }

    /// Handle a template candidate from the host.
    ///
    /// Returns the candidate unchanged when it is empty, lies outside the
    /// template root, or the host reports the engine inactive. No filesystem
    /// or controller work happens in that case. Otherwise the view is
    /// rendered, emitted through [`Host::emit`], and an empty string is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if refreshing the mirror, resolving
    /// controller data, or rendering fails; nothing is emitted then. A
    /// failed [`Host::emit`] is returned as [`PipelineError::Emit`].
    pub fn handle(&self, candidate: &str) -> Result<String, PipelineError> {
        if candidate.is_empty() {
            return Ok(String::new());
        }

        let source = Path::new(candidate);
        if !is_within(source, &self.template_root) {
            tracing::debug!(candidate, "Candidate outside template root, passing through");
            return Ok(candidate.to_owned());
        }
        if !self.host.engine_active() {
            tracing::debug!(candidate, "Engine inactive, passing through");
            return Ok(candidate.to_owned());
        }

        let force = self.force_recompile || self.hooks.force_recompile(source);
        let check = self
            .cache
            .ensure_fresh_with(source, force, || self.engine.invalidate())?;

        let data = self.controllers.resolve(&check.view_id)?;
        let html = self.view(&check.render_name, data)?;

        self.host.emit(&html).map_err(PipelineError::Emit)?;
        tracing::debug!(view = %check.view_id, bytes = html.len(), "Rendered view");
        Ok(String::new())
    }

    /// Render view `name` with `data`, applying the render hooks.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Render`] if the engine fails.
    pub fn view(&self, name: &str, data: ViewData) -> Result<String, PipelineError> {
        let name = self.hooks.template(name.to_owned(), &data);
        let data = self.hooks.arguments(data, &name);
        let html = self.engine.render(&name, &data)?;
        Ok(self.hooks.html(html, &name, &data))
    }

    /// Whether the compiled form of view `name` can be loaded.
    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.engine.exists(name)
    }

    /// Directory candidates must live under.
    #[must_use]
    pub fn template_root(&self) -> &Path {
        &self.template_root
    }

    /// The compile cache.
    #[must_use]
    pub fn cache(&self) -> &CompileCache {
        &self.cache
    }

    /// The controller registry.
    #[must_use]
    pub fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }
}

/// Whether `candidate` lies under `root` without leaving it through `..`.
fn is_within(candidate: &Path, root: &Path) -> bool {
    candidate.starts_with(root)
        && !candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
}

impl fmt::Debug for RenderPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderPipeline")
            .field("template_root", &self.template_root)
            .field("force_recompile", &self.force_recompile)
            .field("controllers", &self.controllers)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::Path;

    #[test]
    fn test_pipeline_config_defaults() {
        let config = PipelineConfig::new("/theme");
        assert_eq!(config.views_dir, PathBuf::from("/theme/views"));
        assert_eq!(config.view_cache_dir(), PathBuf::from("/theme/views/cache"));
        assert_eq!(config.cache_dir, PathBuf::from("/theme/.views_cache"));
        assert_eq!(config.sanitize_filter, "sanitize");
    }

    #[test]
    fn test_pipeline_config_from_config() {
        let mut config = Config::default();
        config.engine.force_recompile = true;
        config.engine.capabilities = vec!["get_field".to_owned()];

        let pipeline = PipelineConfig::from(&config);
        assert_eq!(pipeline.template_root, Path::new("."));
        assert!(pipeline.force_recompile);
        assert_eq!(pipeline.capabilities, vec!["get_field"]);
    }

    #[test]
    fn test_is_within() {
        let root = Path::new("/srv/theme");
        assert!(is_within(Path::new("/srv/theme/home.html"), root));
        assert!(is_within(Path::new("/srv/theme/./parts/nav.html"), root));
        assert!(!is_within(Path::new("/srv/other/home.html"), root));
        assert!(!is_within(Path::new("/srv/theme/../secret/passwd.html"), root));
        assert!(!is_within(Path::new("/srv/theme/parts/../../x.html"), root));
    }
}
