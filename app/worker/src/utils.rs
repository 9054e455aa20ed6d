//! Worker utility functions.

/// Expand `${VAR}` references from the process environment.
///
/// Unknown variables expand to nothing.
pub fn expand_env_vars(input: &str) -> String {
    expand_with(input, |name| std::env::var(name).ok())
}

/// Expand `${VAR}` references, resolving names through `lookup`.
///
/// An unterminated `${` is kept as written.
pub fn expand_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut expanded = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find("${") {
        let (literal, reference) = rest.split_at(open);
        expanded.push_str(literal);
        let Some((name, tail)) = reference[2..].split_once('}') else {
            rest = reference;
            break;
        };
        expanded.push_str(&lookup(name).unwrap_or_default());
        rest = tail;
    }
    expanded.push_str(rest);
    expanded
}
