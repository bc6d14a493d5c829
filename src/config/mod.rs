//! Hierarchical parameter scopes for flows
//!
//! Every flow invocation runs inside a [`Config`] scope chained to its
//! caller's scope, ending at the manager's [`SharedContext`]. String values
//! may reference other parameters with `{{name}}` placeholders, which are
//! resolved on every read.
//!
//! # Example
//!
//! ```ignore
//! use flowtree::config::{Config, to_params};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let root = Arc::new(Config::root(to_params(json!({"base": "http://x"}))));
//! let flow = Config::child(to_params(json!({"url": "{{base}}/path"})), root);
//! assert_eq!(flow.get("url"), Some(json!("http://x/path")));
//! ```

mod params;
mod placeholder;
mod scope;

pub use params::{
    DefaultParams, Params, duration_from_secs, merge_params, render_value, to_params, value_as_bool, value_as_f64,
    value_as_i64, value_as_list,
};
pub use placeholder::placeholder_names;
pub use scope::{Config, SharedContext};
