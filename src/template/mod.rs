//! Template-variable substitution.
//!
//! Dashboard queries reference template variables in three styles: `$name`,
//! `${name}` (optionally `${name:modifier}`, whose modifier is ignored for
//! value purposes), and `[[name]]`. Substitution replaces every reference
//! whose name is present in the environment and leaves unknown names
//! untouched verbatim.
//!
//! `$name` replacement is word-boundary aware: substituting `$job` must not
//! corrupt `$jobname`. The environment is a `BTreeMap`, so variables are
//! always visited in a stable order.
//!
//! Temporal macros (`$__range`, `$__timeFilter(col)`, ...) use the reserved
//! `$__` prefix, a namespace disjoint from ordinary variable names; they are
//! expanded separately by [`macros`].

pub mod macros;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

/// `${name}` and `${name:modifier}` references.
static BRACED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::[^}]*)?\}").unwrap()
});

/// `[[name]]` references.
static BRACKETED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([a-zA-Z_][a-zA-Z0-9_]*)\]\]").unwrap());

/// Any of the three reference styles, for discovery rather than replacement.
static REFERENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\$\{([a-zA-Z_][a-zA-Z0-9_]*)(?::[^}]*)?\}|\$([a-zA-Z_][a-zA-Z0-9_]*)|\[\[([a-zA-Z_][a-zA-Z0-9_]*)\]\]",
    )
    .unwrap()
});

/// Replace every known variable reference in `text` with its value.
///
/// Unknown names are left untouched, including their modifier and wrapper
/// syntax, so a later substitution pass (or the backend itself) can still
/// see them.
pub fn substitute_variables(text: &str, variables: &BTreeMap<String, String>) -> String {
    if variables.is_empty() {
        return text.to_string();
    }

    // ${name} and ${name:modifier} first, so the plain-$ pass below never
    // sees a brace-wrapped reference.
    let mut result = BRACED_RE
        .replace_all(text, |caps: &regex::Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned();

    for (name, value) in variables {
        result = replace_dollar_var(&result, name, value);
    }

    BRACKETED_RE
        .replace_all(&result, |caps: &regex::Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Replace `$name` occurrences followed by a non-word character or the end
/// of the string. Boundary awareness keeps `$job` from matching inside
/// `$jobname`.
fn replace_dollar_var(text: &str, name: &str, value: &str) -> String {
    let pattern = format!("${name}");
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(pos) = rest.find(&pattern) {
        let after = &rest[pos + pattern.len()..];
        let at_boundary = after
            .chars()
            .next()
            .is_none_or(|c| !c.is_ascii_alphanumeric() && c != '_');

        out.push_str(&rest[..pos]);
        if at_boundary {
            out.push_str(value);
        } else {
            out.push_str(&pattern);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Substitute variables recursively through a semi-structured value.
///
/// String leaves are substituted, objects and arrays are rewritten
/// element-wise, all other scalars pass through unchanged. Used for
/// backends whose query body is a structured target rather than a single
/// string.
pub fn substitute_in_value(value: &Value, variables: &BTreeMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(substitute_variables(s, variables)),
        Value::Object(map) => Value::Object(
            map.iter().map(|(k, v)| (k.clone(), substitute_in_value(v, variables))).collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| substitute_in_value(v, variables)).collect())
        }
        other => other.clone(),
    }
}

/// The three reference syntaxes a variable can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceStyle {
    /// `$name`
    Dollar,
    /// `${name}`
    Braced,
    /// `[[name]]`
    Bracketed,
}

/// Whether a string is (or begins as) a variable reference.
pub fn is_variable_reference(s: &str) -> bool {
    s.starts_with('$') || s.starts_with("[[")
}

/// Extract the variable name from any of the three reference styles.
/// Returns the input unchanged when it is not a reference.
pub fn extract_variable_name(s: &str) -> &str {
    if let Some(inner) = s.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        // strip a ${name:modifier} modifier
        return inner.split_once(':').map_or(inner, |(name, _)| name);
    }
    if let Some(inner) = s.strip_prefix("[[").and_then(|r| r.strip_suffix("]]")) {
        return inner;
    }
    s.strip_prefix('$').unwrap_or(s)
}

/// Render a variable name in the given reference style.
pub fn wrap_reference(name: &str, style: ReferenceStyle) -> String {
    match style {
        ReferenceStyle::Dollar => format!("${name}"),
        ReferenceStyle::Braced => format!("${{{name}}}"),
        ReferenceStyle::Bracketed => format!("[[{name}]]"),
    }
}

/// List the distinct variable names referenced in `text`, in order of first
/// appearance. Macro names (leading `__`) are skipped.
pub fn find_variables(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for caps in REFERENCE_RE.captures_iter(text) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if name.is_empty() || name.starts_with("__") {
            continue;
        }
        if !seen.iter().any(|s| s == name) {
            seen.push(name.to_string());
        }
    }
    seen
}
