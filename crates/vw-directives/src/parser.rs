//! Directive occurrence scanning.
//!
//! An occurrence is `@name`, optionally followed (after spaces or tabs) by a
//! parenthesised expression. Parentheses inside the expression must balance;
//! quoted strings are skipped so `@var('a)', x)` works.

/// One occurrence of a directive in the source text.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct Occurrence<'a> {
    /// Byte offset of the `@`.
    pub start: usize,
    /// Byte offset just past the occurrence (including any arguments).
    pub end: usize,
    /// Expression between the outer parentheses.
    pub expr: Option<&'a str>,
}

/// Find every occurrence of `@name` in `source`.
///
/// Skips escaped `@@name`, email-like `user@name`, and longer names sharing
/// the prefix (`@name_other`).
pub(crate) fn find_occurrences<'a>(source: &'a str, name: &str) -> Vec<Occurrence<'a>> {
    let needle = format!("@{name}");
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(rel) = source[cursor..].find(&needle) {
        let start = cursor + rel;
        let after = start + needle.len();
        cursor = after;

        let prev = source[..start].chars().next_back();
        let next = source[after..].chars().next();
        if prev.is_some_and(|c| c == '@' || is_ident_char(c)) || next.is_some_and(is_ident_char) {
            continue;
        }

        let (expr, end) = match parse_arguments(&source[after..]) {
            Some((expr, consumed)) => (Some(expr), after + consumed),
            None => (None, after),
        };
        found.push(Occurrence { start, end, expr });
        cursor = end;
    }

    found
}

/// Parse `( ... )` at the start of `rest`, allowing leading spaces or tabs.
///
/// Returns the inner expression and the number of bytes consumed, or `None`
/// if there is no argument list or it never closes.
fn parse_arguments(rest: &str) -> Option<(&str, usize)> {
    let offset = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    let body = &rest[offset..];
    if !body.starts_with('(') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (idx, c) in body.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some((&body[1..idx], offset + idx + 1));
                }
            }
            _ => {}
        }
    }

    None
}

/// Replace escaped `@@name` with the literal `@name`.
pub(crate) fn unescape(source: &str, name: &str) -> String {
    let needle = format!("@@{name}");
    let mut output = String::with_capacity(source.len());
    let mut cursor = 0;

    while let Some(rel) = source[cursor..].find(&needle) {
        let start = cursor + rel;
        let after = start + needle.len();
        output.push_str(&source[cursor..start]);
        if source[after..].chars().next().is_some_and(is_ident_char) {
            output.push_str(&needle);
        } else {
            output.push_str(&needle[1..]);
        }
        cursor = after;
    }
    output.push_str(&source[cursor..]);
    output
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}
