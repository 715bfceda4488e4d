//! Directive rules.

use std::fmt;
use std::sync::Arc;

use crate::DirectiveError;

/// Transform from the captured expression (without its outer parentheses) to
/// the expansion text.
pub type Transform = Arc<dyn Fn(Option<&str>) -> Result<String, DirectiveError> + Send + Sync>;

/// Predicate deciding, at compile time, whether a rule is active.
pub type Predicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// A named directive with its transform and enablement predicate.
///
/// A disabled rule still consumes its occurrences but expands them to
/// nothing.
#[derive(Clone)]
pub struct DirectiveRule {
    name: String,
    transform: Transform,
    enabled_when: Predicate,
}

impl DirectiveRule {
    /// Create an always-enabled rule.
    ///
    /// # Errors
    ///
    /// Returns [`DirectiveError::InvalidName`] unless `name` is an ASCII
    /// identifier.
    pub fn new<F>(name: impl Into<String>, transform: F) -> Result<Self, DirectiveError>
    where
        F: Fn(Option<&str>) -> Result<String, DirectiveError> + Send + Sync + 'static,
    {
        let name = name.into();
        if !is_identifier(&name) {
            return Err(DirectiveError::InvalidName(name));
        }
        Ok(Self {
            name,
            transform: Arc::new(transform),
            enabled_when: Arc::new(|| true),
        })
    }

    /// Only expand while `predicate` returns `true`.
    #[must_use]
    pub fn enabled_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn() -> bool + Send + Sync + 'static,
    {
        self.enabled_when = Arc::new(predicate);
        self
    }

    /// Directive name, without the leading `@`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluate the enablement predicate.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        (self.enabled_when)()
    }

    /// Expand one occurrence.
    ///
    /// # Errors
    ///
    /// Propagates errors from the transform.
    pub fn apply(&self, expr: Option<&str>) -> Result<String, DirectiveError> {
        if !self.is_enabled() {
            return Ok(String::new());
        }
        (self.transform)(expr)
    }
}

impl fmt::Debug for DirectiveRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectiveRule")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
