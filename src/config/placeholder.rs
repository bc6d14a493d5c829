//! Lazy `{{name}}` placeholder substitution

use super::params::render_value;
use super::scope::Config;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([\w_]+)\}\}").expect("placeholder pattern is valid"));

/// Resolve every placeholder in `value` against `config`.
///
/// `expanding` holds the keys currently being expanded. A placeholder that
/// refers back to one of them resolves to the empty string.
pub(super) fn resolve(config: &Config, value: Value, expanding: &mut Vec<String>) -> Value {
    let text = match value {
        Value::String(text) => text,
        other => return other,
    };

    if !PLACEHOLDER.is_match(&text) {
        return Value::String(text);
    }

    let resolved = PLACEHOLDER.replace_all(&text, |caps: &Captures<'_>| {
        let key = &caps[1];
        if expanding.iter().any(|k| k == key) {
            tracing::warn!(
                placeholder = key,
                chain = %expanding.join(" -> "),
                "cyclic placeholder reference, substituting empty string"
            );
            return String::new();
        }

        expanding.push(key.to_string());
        let replacement = config
            .lookup(key)
            .map(|raw| resolve(config, raw, expanding))
            .unwrap_or_else(|| Value::String(String::new()));
        expanding.pop();

        render_value(&replacement)
    });

    Value::String(resolved.into_owned())
}

/// Names of the placeholders referenced by `text`, in order of appearance
pub fn placeholder_names(text: &str) -> Vec<&str> {
    PLACEHOLDER
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
        .collect()
}
