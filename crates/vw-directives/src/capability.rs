//! Runtime capability checks for gated directives.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

/// Reports whether a named external capability is available.
///
/// Gated directives consult the probe every time a template is compiled,
/// not when they are registered, since availability may change in between.
pub trait CapabilityProbe: Send + Sync {
    /// Whether the capability `name` is currently available.
    fn is_available(&self, name: &str) -> bool;
}

/// Thread-safe set of available capabilities.
///
/// # Example
///
/// ```
/// use vw_directives::{Capabilities, CapabilityProbe};
///
/// let caps = Capabilities::new();
/// assert!(!caps.is_available("get_field"));
/// caps.enable("get_field");
/// assert!(caps.is_available("get_field"));
/// ```
#[derive(Debug, Default)]
pub struct Capabilities {
    available: RwLock<HashSet<String>>,
}

impl Capabilities {
    /// Create an empty capability set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a capability set with the given capabilities available.
    #[must_use]
    pub fn with<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            available: RwLock::new(names.into_iter().map(Into::into).collect()),
        }
    }

    /// Mark a capability as available.
    pub fn enable(&self, name: impl Into<String>) {
        self.available
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into());
    }

    /// Mark a capability as unavailable.
    pub fn disable(&self, name: &str) {
        self.available
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }
}

impl CapabilityProbe for Capabilities {
    fn is_available(&self, name: &str) -> bool {
        self.available
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }
}
