//! Parent-linked parameter scopes

use super::params::Params;
use super::placeholder;
use serde_json::Value;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Handle to the mutable mapping shared by every scope of one manager.
///
/// Clones point at the same mapping. Writes are last-writer-wins.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<RwLock<Params>>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Params> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Params> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().remove(key)
    }

    /// Copy of the current contents
    pub fn snapshot(&self) -> Params {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[derive(Debug)]
enum Layer {
    Owned(Params),
    Shared(SharedContext),
}

impl Layer {
    fn get(&self, key: &str) -> Option<Value> {
        match self {
            Layer::Owned(params) => params.get(key).cloned(),
            Layer::Shared(shared) => shared.get(key),
        }
    }

    fn contains(&self, key: &str) -> bool {
        match self {
            Layer::Owned(params) => params.contains_key(key),
            Layer::Shared(shared) => shared.read().contains_key(key),
        }
    }

    fn snapshot(&self) -> Params {
        match self {
            Layer::Owned(params) => params.clone(),
            Layer::Shared(shared) => shared.snapshot(),
        }
    }
}

/// One scope of named parameters chained to an optional parent scope.
///
/// Lookup asks the parent chain first: a non-null value held by any ancestor
/// shadows this scope's own value. [`Config::all_params`] flattens the other
/// way round (this scope wins). Both behaviours are relied upon by flows.
///
/// String values are placeholder-resolved on every read; nothing is cached.
#[derive(Debug)]
pub struct Config {
    layer: Layer,
    parent: Option<Arc<Config>>,
}

impl Config {
    /// A parent-less scope holding `params`
    pub fn root(params: Params) -> Self {
        Self {
            layer: Layer::Owned(params),
            parent: None,
        }
    }

    /// A parent-less scope backed by the shared context
    pub fn shared(context: SharedContext) -> Self {
        Self {
            layer: Layer::Shared(context),
            parent: None,
        }
    }

    /// A scope holding `params` whose lookups defer to `parent` first
    pub fn child(params: Params, parent: Arc<Config>) -> Self {
        Self {
            layer: Layer::Owned(params),
            parent: Some(parent),
        }
    }

    pub fn parent(&self) -> Option<&Arc<Config>> {
        self.parent.as_ref()
    }

    /// Raw (unresolved) value: first non-null ancestor hit, else this layer.
    pub(super) fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(parent) = &self.parent {
            if let Some(value) = parent.lookup(key) {
                if !value.is_null() {
                    return Some(value);
                }
            }
        }
        self.layer.get(key)
    }

    /// Whether `key` is defined anywhere in the chain
    pub fn contains(&self, key: &str) -> bool {
        self.layer.contains(key) || self.parent.as_ref().is_some_and(|p| p.contains(key))
    }

    /// Fully resolved value for `key`, or `None` when no scope defines it
    pub fn get(&self, key: &str) -> Option<Value> {
        let raw = self.lookup(key)?;
        let mut expanding = vec![key.to_string()];
        Some(placeholder::resolve(self, raw, &mut expanding))
    }

    /// Resolved value for `key`, or `default` (returned as-is) when absent
    pub fn get_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| default.into())
    }

    /// Flattened snapshot of every key in the chain, each value resolved.
    ///
    /// Nearer scopes override ancestors here, unlike [`Config::get`].
    pub fn all_params(&self) -> Params {
        let mut merged = self
            .parent
            .as_ref()
            .map(|parent| parent.all_params())
            .unwrap_or_default();

        for (key, value) in self.layer.snapshot() {
            merged.insert(key, value);
        }

        for (key, value) in merged.iter_mut() {
            let raw = std::mem::take(value);
            let mut expanding = vec![key.clone()];
            *value = placeholder::resolve(self, raw, &mut expanding);
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::to_params;
    use serde_json::json;

    fn root(value: Value) -> Arc<Config> {
        Arc::new(Config::root(to_params(value)))
    }

    #[test]
    fn test_ancestor_precedence_and_flattened_merge() {
        let parent = root(json!({"x": "A"}));
        let child = Config::child(to_params(json!({"x": "B"})), parent);

        assert_eq!(child.get("x"), Some(json!("A")));
        assert_eq!(child.all_params()["x"], json!("B"));
    }

    #[test]
    fn test_local_value_used_when_no_ancestor_defines_key() {
        let parent = root(json!({"other": 1}));
        let child = Config::child(to_params(json!({"x": "B"})), parent);

        assert_eq!(child.get("x"), Some(json!("B")));
        assert_eq!(child.get("other"), Some(json!(1)));
    }

    #[test]
    fn test_null_ancestor_value_does_not_shadow() {
        let parent = root(json!({"x": null}));
        let child = Config::child(to_params(json!({"x": "local"})), parent.clone());
        assert_eq!(child.get("x"), Some(json!("local")));

        // A local explicit null is still a hit.
        let child = Config::child(to_params(json!({"y": null})), parent);
        assert_eq!(child.get("y"), Some(Value::Null));
        assert_eq!(child.get_or("y", "fallback"), Value::Null);
    }

    #[test]
    fn test_placeholder_resolution() {
        let config = Config::root(to_params(json!({
            "base": "http://x",
            "url": "{{base}}/path",
        })));
        assert_eq!(config.get("url"), Some(json!("http://x/path")));
    }

    #[test]
    fn test_missing_placeholder_resolves_empty() {
        let config = Config::root(to_params(json!({"m": "hi {{missing}}"})));
        assert_eq!(config.get("m"), Some(json!("hi ")));
    }

    #[test]
    fn test_nested_placeholders_expand_fully() {
        let config = Config::root(to_params(json!({
            "host": "example.com",
            "base": "https://{{host}}",
            "endpoint": "{{base}}/users/{{id}}",
            "id": 7,
        })));
        assert_eq!(
            config.get("endpoint"),
            Some(json!("https://example.com/users/7"))
        );
    }

    #[test]
    fn test_placeholder_in_child_sees_ancestor_values() {
        let root = root(json!({}));
        let flow = Config::child(to_params(json!({"who": "Ann", "name": "{{who}}"})), root);
        assert_eq!(flow.get("name"), Some(json!("Ann")));
    }

    #[test]
    fn test_cyclic_placeholders_terminate() {
        let config = Config::root(to_params(json!({"a": "{{b}}", "b": "{{a}}"})));
        assert_eq!(config.get("a"), Some(json!("")));
        assert_eq!(config.get("b"), Some(json!("")));

        let config = Config::root(to_params(json!({"a": "x{{a}}y"})));
        assert_eq!(config.get("a"), Some(json!("xy")));
    }

    #[test]
    fn test_repeated_placeholder_is_not_a_cycle() {
        let config = Config::root(to_params(json!({"v": "1", "pair": "{{v}}-{{v}}"})));
        assert_eq!(config.get("pair"), Some(json!("1-1")));
    }

    #[test]
    fn test_non_string_values_pass_through() {
        let config = Config::root(to_params(json!({
            "timeout": 30,
            "flags": ["{{x}}"],
            "enabled": false,
        })));
        assert_eq!(config.get("timeout"), Some(json!(30)));
        assert_eq!(config.get("flags"), Some(json!(["{{x}}"])));
        assert_eq!(config.get("enabled"), Some(json!(false)));
    }

    #[test]
    fn test_default_is_not_resolved() {
        let config = Config::root(to_params(json!({"x": "1"})));
        assert_eq!(config.get("missing"), None);
        assert_eq!(config.get_or("missing", "{{x}}"), json!("{{x}}"));
    }

    #[test]
    fn test_shared_context_changes_are_visible_immediately() {
        let shared = SharedContext::new();
        let shared_scope = Arc::new(Config::shared(shared.clone()));
        let flow = Config::child(to_params(json!({"msg": "count={{count}}"})), shared_scope);

        assert_eq!(flow.get("msg"), Some(json!("count=")));
        shared.set("count", 1);
        assert_eq!(flow.get("msg"), Some(json!("count=1")));
        shared.set("count", 2);
        assert_eq!(flow.get("msg"), Some(json!("count=2")));
    }

    #[test]
    fn test_all_params_resolves_each_layer() {
        let parent = root(json!({"base": "http://x", "url": "{{base}}/a"}));
        let child = Config::child(to_params(json!({"extra": "{{url}}!"})), parent);
        let all = child.all_params();

        assert_eq!(all["url"], json!("http://x/a"));
        assert_eq!(all["extra"], json!("http://x/a!"));
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_contains() {
        let parent = root(json!({"a": 1}));
        let child = Config::child(to_params(json!({"b": 2})), parent);
        assert!(child.contains("a"));
        assert!(child.contains("b"));
        assert!(!child.contains("c"));
    }
}
