//! Parameter maps, layered defaults and value rendering

use serde_json::Value;
use std::time::Duration;

/// A flat mapping of parameter names to JSON values.
pub type Params = serde_json::Map<String, Value>;

/// Convert a JSON value into a parameter map.
///
/// Objects are taken as-is; any other value yields an empty map.
pub fn to_params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

/// Merge `overrides` on top of `defaults` (overrides win per key).
pub fn merge_params(defaults: &Params, overrides: Params) -> Params {
    let mut merged = defaults.clone();
    for (key, value) in overrides {
        merged.insert(key, value);
    }
    merged
}

/// Render a parameter value as placeholder replacement text.
///
/// Strings are used verbatim and `null` renders as the empty string. Other
/// scalars and containers use compact JSON notation.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Interpret a value as a boolean.
///
/// Parameters given on the command line arrive as strings, so `"true"`,
/// `"yes"`, `"on"` and `"1"` (and their negatives) are accepted too.
pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Seconds as a `Duration`; `None` when negative, NaN or too large
pub fn duration_from_secs(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

/// Interpret a value as a list of strings; strings are split on commas
pub fn value_as_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(render_value).collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Null => Vec::new(),
        other => vec![render_value(other)],
    }
}

/// Layered default parameters for a flow type.
///
/// A derived flow starts from its base's defaults and extends them, so the
/// merged map is computed once when the flow is registered:
///
/// ```ignore
/// fn defaults() -> DefaultParams {
///     ShellFlow::defaults().extend(json!({ "repository_path": "." }))
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultParams(Params);

impl DefaultParams {
    /// Built-in base defaults shared by every flow (currently empty)
    pub fn base() -> Self {
        Self(Params::new())
    }

    /// Overlay a JSON object of defaults; later layers win.
    pub fn extend(mut self, overrides: Value) -> Self {
        match overrides {
            Value::Object(map) => {
                for (key, value) in map {
                    self.0.insert(key, value);
                }
            }
            Value::Null => {}
            other => {
                tracing::warn!(value = %other, "ignoring non-object default parameters");
            }
        }
        self
    }

    /// Set a single default
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn params(&self) -> &Params {
        &self.0
    }

    pub fn into_params(self) -> Params {
        self.0
    }
}
