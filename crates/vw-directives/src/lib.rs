//! Pluggable directives for vw templates.
//!
//! Directives are named syntax extensions written as `@name` or
//! `@name(expression)` inside a template. Before the template engine compiles
//! a view, every registered [`DirectiveRule`] rewrites its occurrences into
//! engine syntax.
//!
//! # Architecture
//!
//! - [`DirectiveRule`]: Name, transform, and an `enabled_when` predicate
//! - [`DirectiveRegistry`]: Ordered rules, applied as independent rewrites
//! - [`CapabilityProbe`] / [`Capabilities`]: Runtime checks used by gated rules
//!
//! Rules are applied in registration order, one pass per rule. Each transform
//! is a pure function from the captured expression to its expansion, so rules
//! can be tested without a template engine.
//!
//! # Example
//!
//! ```
//! use vw_directives::DirectiveRegistry;
//!
//! let mut registry = DirectiveRegistry::new();
//! registry
//!     .directive("upper", |expr| format!("{{{{ {} | upper }}}}", expr.unwrap_or("''")))
//!     .unwrap();
//!
//! let expanded = registry.expand("Hello @upper(name)!").unwrap();
//! assert_eq!(expanded, "Hello {{ name | upper }}!");
//! ```

mod builtin;
mod capability;
mod parser;
mod registry;
mod rule;

pub use builtin::{FIELD_CAPABILITY, register_builtins};
pub use capability::{Capabilities, CapabilityProbe};
pub use registry::DirectiveRegistry;
pub use rule::{DirectiveRule, Predicate, Transform};

/// Error returned by directive registration or expansion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
    /// Directive names must be ASCII identifiers.
    #[error("Invalid directive name: {0:?}")]
    InvalidName(String),
    /// The directive's expression could not be interpreted.
    #[error("Invalid arguments for @{directive}: {message}")]
    InvalidArguments {
        /// Directive name.
        directive: String,
        /// What was wrong with the expression.
        message: String,
    },
    /// No rule with this name is registered.
    #[error("Unknown directive: @{0}")]
    Unknown(String),
}

impl DirectiveError {
    pub(crate) fn invalid_arguments(directive: &str, message: impl Into<String>) -> Self {
        Self::InvalidArguments {
            directive: directive.to_owned(),
            message: message.into(),
        }
    }
}
