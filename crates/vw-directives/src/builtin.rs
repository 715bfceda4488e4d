//! Built-in query, custom-field and variable directives.
//!
//! Expansions use minijinja syntax. The functions they call (`posts`,
//! `query`, `reset_query`, `rows`, `get_field`) and the sanitize filter are
//! provided by the engine host at render time.
//!
//! `@acf` and `@acfhas` both open a loop, so `@acfempty` and `@acfend` close
//! either form. `@acfhas` iterates at most once and binds the value to
//! `field` inside the block.

use std::sync::Arc;

use crate::capability::CapabilityProbe;
use crate::registry::DirectiveRegistry;
use crate::rule::{DirectiveRule, is_identifier};
use crate::DirectiveError;

/// Capability that disables the custom-field directives when present.
pub const FIELD_CAPABILITY: &str = "get_field";

/// Register the built-in directives.
///
/// The custom-field directives (`acf`, `acfempty`, `acfend`, `acffield`,
/// `acfhas`, `acfsub`) expand to nothing while `capabilities` reports
/// [`FIELD_CAPABILITY`] as available. The probe is consulted on every
/// expansion.
///
/// # Errors
///
/// Returns [`DirectiveError::InvalidName`] if `sanitize_filter` is not an
/// identifier.
pub fn register_builtins(
    registry: &mut DirectiveRegistry,
    capabilities: Arc<dyn CapabilityProbe>,
    sanitize_filter: &str,
) -> Result<(), DirectiveError> {
    if !is_identifier(sanitize_filter) {
        return Err(DirectiveError::InvalidName(sanitize_filter.to_owned()));
    }

    registry.register(DirectiveRule::new("wpposts", |_| {
        Ok("{% for post in posts() %}".to_owned())
    })?);
    registry.register(DirectiveRule::new("wpquery", |expr| {
        let expr = required("wpquery", expr)?;
        Ok(format!("{{% for post in query({expr}) %}}"))
    })?);
    registry.register(DirectiveRule::new("wpempty", |_| Ok("{% else %}".to_owned()))?);
    registry.register(DirectiveRule::new("wpend", |_| {
        Ok("{% endfor %}{{ reset_query() }}".to_owned())
    })?);

    let gated: [(&str, fn(Option<&str>) -> Result<String, DirectiveError>); 6] = [
        ("acf", |expr| {
            let expr = required("acf", expr)?;
            Ok(format!("{{% for row in rows({expr}) %}}"))
        }),
        ("acfempty", |_| Ok("{% else %}".to_owned())),
        ("acfend", |_| Ok("{% endfor %}".to_owned())),
        ("acffield", |expr| {
            let expr = required("acffield", expr)?;
            Ok(format!(
                "{{% if get_field({expr}) %}}{{{{ get_field({expr}) }}}}{{% endif %}}"
            ))
        }),
        ("acfhas", |expr| {
            let expr = required("acfhas", expr)?;
            Ok(format!("{{% for field in [get_field({expr})] if field %}}"))
        }),
        ("acfsub", |expr| {
            let expr = required("acfsub", expr)?;
            Ok(format!(
                "{{% if row[{expr}] %}}{{{{ row[{expr}] }}}}{{% endif %}}"
            ))
        }),
    ];
    for (name, transform) in gated {
        let caps = Arc::clone(&capabilities);
        registry.register(
            DirectiveRule::new(name, transform)?
                .enabled_when(move || !caps.is_available(FIELD_CAPABILITY)),
        );
    }

    let filter = sanitize_filter.to_owned();
    registry.register(DirectiveRule::new("var", move |expr| {
        let (key, value) = parse_var(expr)?;
        Ok(format!("{{% set {key} = ({value}) | {filter} %}}"))
    })?);

    Ok(())
}

fn required<'a>(directive: &str, expr: Option<&'a str>) -> Result<&'a str, DirectiveError> {
    match expr.map(str::trim) {
        Some(expr) if !expr.is_empty() => Ok(expr),
        _ => Err(DirectiveError::invalid_arguments(directive, "expected an expression")),
    }
}

/// Split `'key', value` into the bare key and the value expression.
fn parse_var(expr: Option<&str>) -> Result<(&str, &str), DirectiveError> {
    let expr = required("var", expr)?;
    let (key, value) = expr
        .split_once(',')
        .ok_or_else(|| DirectiveError::invalid_arguments("var", "expected 'key', value"))?;

    let key = key.trim();
    let unquoted = key
        .strip_prefix('\'')
        .and_then(|k| k.strip_suffix('\''))
        .or_else(|| key.strip_prefix('"').and_then(|k| k.strip_suffix('"')))
        .ok_or_else(|| DirectiveError::invalid_arguments("var", "key must be a quoted string"))?;
    if !is_identifier(unquoted) {
        return Err(DirectiveError::invalid_arguments(
            "var",
            format!("{unquoted:?} is not a valid variable name"),
        ));
    }

    let value = value.trim();
    if value.is_empty() {
        return Err(DirectiveError::invalid_arguments("var", "missing value"));
    }
    Ok((unquoted, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::Capabilities;
    use pretty_assertions::assert_eq;

    fn builtins() -> (DirectiveRegistry, Arc<Capabilities>) {
        let caps = Arc::new(Capabilities::new());
        let mut registry = DirectiveRegistry::new();
        let probe = Arc::clone(&caps) as Arc<dyn CapabilityProbe>;
        register_builtins(&mut registry, probe, "sanitize").unwrap();
        (registry, caps)
    }

    #[test]
    fn test_registers_in_order() {
        let (registry, _) = builtins();
        assert_eq!(
            registry.names().collect::<Vec<_>>(),
            vec![
                "wpposts", "wpquery", "wpempty", "wpend", "acf", "acfempty", "acfend",
                "acffield", "acfhas", "acfsub", "var"
            ]
        );
    }

    #[test]
    fn test_post_loop() {
        let (registry, _) = builtins();
        let source = "@wpposts<h2>{{ post.title }}</h2>@wpempty<p>None</p>@wpend";
        assert_eq!(
            registry.expand(source).unwrap(),
            "{% for post in posts() %}<h2>{{ post.title }}</h2>{% else %}<p>None</p>\
             {% endfor %}{{ reset_query() }}"
        );
    }

    #[test]
    fn test_query_loop() {
        let (registry, _) = builtins();
        assert_eq!(
            registry.expand("@wpquery({'post_type': 'event'})").unwrap(),
            "{% for post in query({'post_type': 'event'}) %}"
        );
    }

    #[test]
    fn test_query_requires_expression() {
        let (registry, _) = builtins();
        assert!(matches!(
            registry.expand("@wpquery").unwrap_err(),
            DirectiveError::InvalidArguments { directive, .. } if directive == "wpquery"
        ));
    }

    #[test]
    fn test_field_directives_without_capability() {
        let (registry, _) = builtins();
        assert_eq!(
            registry.expand_rule("acffield", Some("'subtitle'")).unwrap(),
            "{% if get_field('subtitle') %}{{ get_field('subtitle') }}{% endif %}"
        );
        assert_eq!(
            registry.expand_rule("acfhas", Some("'image'")).unwrap(),
            "{% for field in [get_field('image')] if field %}"
        );
        assert_eq!(
            registry.expand_rule("acfsub", Some("'label'")).unwrap(),
            "{% if row['label'] %}{{ row['label'] }}{% endif %}"
        );
        assert_eq!(
            registry.expand("@acf('slides') x @acfempty - @acfend").unwrap(),
            "{% for row in rows('slides') %} x {% else %} - {% endfor %}"
        );
    }

    #[test]
    fn test_field_guard_closes_with_acfend() {
        let (registry, _) = builtins();
        assert_eq!(
            registry
                .expand("@acfhas('image')<img>@acfempty-@acfend @acffield('title')")
                .unwrap(),
            "{% for field in [get_field('image')] if field %}<img>{% else %}-{% endfor %} \
             {% if get_field('title') %}{{ get_field('title') }}{% endif %}"
        );
    }

    #[test]
    fn test_field_directives_disabled_by_capability() {
        let (registry, caps) = builtins();
        let source = "[@acf('slides')@acfsub('label')@acfend]";
        assert_eq!(
            registry.expand(source).unwrap(),
            "[{% for row in rows('slides') %}{% if row['label'] %}{{ row['label'] }}{% endif %}{% endfor %}]"
        );

        caps.enable(FIELD_CAPABILITY);
        assert_eq!(registry.expand(source).unwrap(), "[]");
    }

    #[test]
    fn test_query_directives_ignore_capability() {
        let caps = Arc::new(Capabilities::with([FIELD_CAPABILITY]));
        let mut registry = DirectiveRegistry::new();
        register_builtins(&mut registry, caps, "sanitize").unwrap();
        assert_eq!(registry.expand("@wpempty").unwrap(), "{% else %}");
    }

    #[test]
    fn test_var() {
        let (registry, _) = builtins();
        assert_eq!(
            registry.expand("@var('total', price * qty)").unwrap(),
            "{% set total = (price * qty) | sanitize %}"
        );
        assert_eq!(
            registry.expand(r#"@var("greeting", "a, b")"#).unwrap(),
            r#"{% set greeting = ("a, b") | sanitize %}"#
        );
    }

    #[test]
    fn test_var_uses_configured_filter() {
        let mut registry = DirectiveRegistry::new();
        register_builtins(&mut registry, Arc::new(Capabilities::new()), "escape_attr").unwrap();
        assert_eq!(
            registry.expand("@var('x', 1)").unwrap(),
            "{% set x = (1) | escape_attr %}"
        );
    }

    #[test]
    fn test_var_malformed() {
        let (registry, _) = builtins();
        for source in ["@var", "@var('x')", "@var(x, 1)", "@var('a b', 1)", "@var('x', )"] {
            let err = registry.expand(source).unwrap_err();
            assert!(
                matches!(err, DirectiveError::InvalidArguments { .. }),
                "{source}: {err:?}"
            );
        }
    }

    #[test]
    fn test_invalid_sanitize_filter() {
        let mut registry = DirectiveRegistry::new();
        let err =
            register_builtins(&mut registry, Arc::new(Capabilities::new()), "not valid").unwrap_err();
        assert_eq!(err, DirectiveError::InvalidName("not valid".to_owned()));
    }
}
