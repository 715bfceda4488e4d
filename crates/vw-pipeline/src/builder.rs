//! Startup wiring for [`RenderPipeline`].

use std::sync::Arc;

use vw_cache::CompileCache;
use vw_config::Config;
use vw_controllers::{ControllerRef, ControllerRegistry, DataFileController};
use vw_directives::{Capabilities, CapabilityProbe, DirectiveRegistry, register_builtins};
use vw_engine::{JinjaEngine, TemplateEngine};

use crate::PipelineError;
use crate::hooks::{Host, NoHooks, RenderHooks};
use crate::pipeline::{PipelineConfig, RenderPipeline};

/// Collects directives, controllers, and hooks before the pipeline starts.
///
/// Registries are mutable only here; the built pipeline shares them
/// read-only.
pub struct PipelineBuilder {
    config: PipelineConfig,
    capabilities: Arc<Capabilities>,
    directives: DirectiveRegistry,
    controllers: ControllerRegistry,
    hooks: Arc<dyn RenderHooks>,
    engine: Option<Arc<dyn TemplateEngine>>,
}

impl PipelineBuilder {
    /// Start from `config` with the built-in directives registered.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Directive`] if the sanitize filter name is
    /// not an identifier.
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        let capabilities = Arc::new(Capabilities::with(config.capabilities.iter().cloned()));
        let mut directives = DirectiveRegistry::new();
        let probe = Arc::clone(&capabilities) as Arc<dyn CapabilityProbe>;
        register_builtins(&mut directives, probe, &config.sanitize_filter)?;

        Ok(Self {
            config,
            capabilities,
            directives,
            controllers: ControllerRegistry::new(),
            hooks: Arc::new(NoHooks),
            engine: None,
        })
    }

    /// Start from a loaded configuration, registering its data-file
    /// controllers.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Directive`] for an invalid sanitize filter and
    /// [`PipelineError::Controller`] for an invalid controller entry.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let mut builder = Self::new(PipelineConfig::from(config))?;
        let controllers = config
            .controllers_resolved
            .iter()
            .map(|c| {
                DataFileController::new(c.views.clone(), &c.data).map(ControllerRef::instance)
            })
            .collect::<Result<Vec<_>, _>>()?;
        builder.controllers.register(controllers)?;
        Ok(builder)
    }

    /// Capability set consulted by gated directives.
    ///
    /// Changes take effect the next time a view is compiled.
    #[must_use]
    pub fn capabilities(&self) -> Arc<Capabilities> {
        Arc::clone(&self.capabilities)
    }

    /// Directive registry, for host directives.
    pub fn directives_mut(&mut self) -> &mut DirectiveRegistry {
        &mut self.directives
    }

    /// Controller registry, for host controllers.
    pub fn controllers_mut(&mut self) -> &mut ControllerRegistry {
        &mut self.controllers
    }

    /// Replace the render hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: impl RenderHooks + 'static) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    /// Use `engine` instead of the default [`JinjaEngine`].
    #[must_use]
    pub fn engine(mut self, engine: Arc<dyn TemplateEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Build a [`JinjaEngine`] with the directives registered so far.
    ///
    /// Use this to add host functions before passing the engine to
    /// [`engine`](Self::engine).
    #[must_use]
    pub fn jinja_engine(&self) -> JinjaEngine {
        JinjaEngine::new(
            &self.config.views_dir,
            &self.config.cache_dir,
            self.directives.clone(),
        )
        .with_sanitize_filter(&self.config.sanitize_filter)
    }

    /// Create the cache directories and build the pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Cache`] if a cache directory cannot be
    /// created.
    pub fn build(mut self, host: Arc<dyn Host>) -> Result<RenderPipeline, PipelineError> {
        let cache = CompileCache::new(self.config.view_cache_dir(), &self.config.cache_dir);
        cache.ensure_cache_dirs()?;

        let engine: Arc<dyn TemplateEngine> = match self.engine.take() {
            Some(engine) => engine,
            None => Arc::new(self.jinja_engine()),
        };

        tracing::info!(
            root = %self.config.template_root.display(),
            directives = self.directives.len(),
            controllers = self.controllers.len(),
            "Render pipeline ready"
        );

        Ok(RenderPipeline::new(
            &self.config,
            cache,
            Arc::new(self.controllers),
            engine,
            host,
            self.hooks,
        ))
    }
}
