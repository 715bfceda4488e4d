//! Ordered directive registry.

use crate::parser::{find_occurrences, unescape};
use crate::rule::DirectiveRule;
use crate::DirectiveError;

/// Registry of directive rules.
///
/// Rules are looked up by name and applied in registration order.
/// Registering a name again replaces the earlier rule in place, so its
/// position in the application order is unchanged.
///
/// The registry is built during startup and shared read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct DirectiveRegistry {
    rules: Vec<DirectiveRule>,
}

impl DirectiveRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, replacing any rule with the same name.
    pub fn register(&mut self, rule: DirectiveRule) -> &mut Self {
        if let Some(existing) = self.rules.iter_mut().find(|r| r.name() == rule.name()) {
            tracing::debug!(directive = %rule.name(), "Replacing directive");
            *existing = rule;
        } else {
            self.rules.push(rule);
        }
        self
    }

    /// Register an always-enabled directive from an infallible handler.
    ///
    /// This is the extension point for host-supplied directives.
    ///
    /// # Errors
    ///
    /// Returns [`DirectiveError::InvalidName`] unless `name` is an ASCII
    /// identifier.
    pub fn directive<F>(&mut self, name: &str, handler: F) -> Result<&mut Self, DirectiveError>
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        let rule = DirectiveRule::new(name, move |expr| Ok(handler(expr)))?;
        Ok(self.register(rule))
    }

    /// Look up a rule by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DirectiveRule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    /// Rule names in application order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(DirectiveRule::name)
    }

    /// Number of registered rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Expand a single directive occurrence.
    ///
    /// # Errors
    ///
    /// Returns [`DirectiveError::Unknown`] if no rule has this name, or the
    /// rule's own error.
    pub fn expand_rule(&self, name: &str, expr: Option<&str>) -> Result<String, DirectiveError> {
        self.get(name)
            .ok_or_else(|| DirectiveError::Unknown(name.to_owned()))?
            .apply(expr)
    }

    /// Rewrite every directive occurrence in `source`.
    ///
    /// Each rule is applied as its own pass over the output of the previous
    /// one. Escaped occurrences (`@@name`) are emitted as the literal `@name`.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by a rule's transform.
    pub fn expand(&self, source: &str) -> Result<String, DirectiveError> {
        let mut text = source.to_owned();

        for rule in &self.rules {
            let occurrences = find_occurrences(&text, rule.name());
            if occurrences.is_empty() {
                continue;
            }

            let mut output = String::with_capacity(text.len());
            let mut cursor = 0;
            for occurrence in &occurrences {
                output.push_str(&text[cursor..occurrence.start]);
                output.push_str(&rule.apply(occurrence.expr)?);
                cursor = occurrence.end;
            }
            output.push_str(&text[cursor..]);
            text = output;
        }

        for rule in &self.rules {
            if text.contains("@@") {
                text = unescape(&text, rule.name());
            }
        }

        Ok(text)
    }
}
