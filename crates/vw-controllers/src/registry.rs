//! Ordered controller registry.

use std::fmt;
use std::sync::Arc;

use crate::{BoxError, Controller, ControllerError, ViewData};

/// Deferred controller constructor.
pub type Factory = Box<dyn FnOnce() -> Result<Arc<dyn Controller>, BoxError> + Send>;
type BootHook = Box<dyn Fn(&dyn Controller) + Send + Sync>;

/// A controller to register: an existing instance or a factory.
///
/// Factories run once, at registration.
pub enum ControllerRef {
    /// Already constructed controller.
    Instance(Arc<dyn Controller>),
    /// Deferred construction.
    Factory(Factory),
}

impl ControllerRef {
    /// Wrap a constructed controller.
    pub fn instance<C: Controller + 'static>(controller: C) -> Self {
        Self::Instance(Arc::new(controller))
    }

    /// Wrap a fallible constructor.
    pub fn factory<C, F>(factory: F) -> Self
    where
        C: Controller + 'static,
        F: FnOnce() -> Result<C, BoxError> + Send + 'static,
    {
        let factory: Factory = Box::new(move || {
            let controller: Arc<dyn Controller> = Arc::new(factory()?);
            Ok(controller)
        });
        Self::Factory(factory)
    }

    fn build(self) -> Result<Arc<dyn Controller>, ControllerError> {
        match self {
            Self::Instance(controller) => Ok(controller),
            Self::Factory(factory) => factory().map_err(|e| ControllerError::Configuration {
                message: "controller factory failed".to_owned(),
                source: Some(e),
            }),
        }
    }
}

impl fmt::Debug for ControllerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(c) => f.debug_tuple("Instance").field(&c.name()).finish(),
            Self::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// One or many controllers accepted by [`ControllerRegistry::register`].
pub trait IntoControllerRefs {
    /// Convert into an ordered list.
    fn into_controller_refs(self) -> Vec<ControllerRef>;
}

impl IntoControllerRefs for ControllerRef {
    fn into_controller_refs(self) -> Vec<ControllerRef> {
        vec![self]
    }
}

impl IntoControllerRefs for Vec<ControllerRef> {
    fn into_controller_refs(self) -> Vec<ControllerRef> {
        self
    }
}

impl<const N: usize> IntoControllerRefs for [ControllerRef; N] {
    fn into_controller_refs(self) -> Vec<ControllerRef> {
        self.into()
    }
}

/// Registry of controllers, in registration order.
///
/// Populated during startup and read-only afterwards.
#[derive(Default)]
pub struct ControllerRegistry {
    controllers: Vec<Arc<dyn Controller>>,
    boot_hooks: Vec<BootHook>,
}

impl ControllerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `hook` for every controller registered from now on.
    pub fn on_boot<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&dyn Controller) + Send + Sync + 'static,
    {
        self.boot_hooks.push(Box::new(hook));
        self
    }

    /// Register one controller or a sequence of them.
    ///
    /// Factories are invoked immediately. Controllers registered before a
    /// failing factory stay registered.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Configuration`] if a factory fails.
    pub fn register(
        &mut self,
        controllers: impl IntoControllerRefs,
    ) -> Result<&mut Self, ControllerError> {
        for controller in controllers.into_controller_refs() {
            let controller = controller.build()?;
            if controller.views().is_empty() {
                tracing::warn!(
                    controller = %controller.name(),
                    "Controller declares no views and will never be bound"
                );
            }
            for hook in &self.boot_hooks {
                hook(&*controller);
            }
            self.controllers.push(controller);
        }
        Ok(self)
    }

    /// All controllers in registration order.
    #[must_use]
    pub fn controllers(&self) -> &[Arc<dyn Controller>] {
        &self.controllers
    }

    /// Controllers bound to `view_id`, in registration order.
    pub fn bound_controllers<'a>(
        &'a self,
        view_id: &'a str,
    ) -> impl Iterator<Item = &'a Arc<dyn Controller>> + 'a {
        self.controllers
            .iter()
            .filter(move |c| c.views().iter().any(|v| v == view_id))
    }

    /// Merge the data of every controller bound to `view_id`.
    ///
    /// Later controllers overwrite keys set by earlier ones. Returns an empty
    /// mapping when no controller is bound.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::Process`] for the first controller that
    /// fails; no partial data is returned.
    pub fn resolve(&self, view_id: &str) -> Result<ViewData, ControllerError> {
        let mut merged = ViewData::new();
        let mut bound = 0usize;

        for controller in self.bound_controllers(view_id) {
            let data = controller
                .process()
                .map_err(|source| ControllerError::Process {
                    controller: controller.name().to_owned(),
                    view: view_id.to_owned(),
                    source,
                })?;
            merged.extend(data);
            bound += 1;
        }

        tracing::debug!(view = %view_id, controllers = bound, "Resolved view data");
        Ok(merged)
    }

    /// Number of registered controllers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Whether no controllers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

impl fmt::Debug for ControllerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerRegistry")
            .field(
                "controllers",
                &self.controllers.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("boot_hooks", &self.boot_hooks.len())
            .finish()
    }
}
