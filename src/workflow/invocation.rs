//! Top-level entry: resolve an invocation map and run its root flow

use super::error::FlowError;
use super::manager::WorkflowManager;
use super::registry::FlowRegistry;
use crate::config::{Params, merge_params, render_value};
use crate::sink::LogSink;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Key naming the root flow
pub const FLOW_KEY: &str = "flow";

/// Key pointing at a JSON file holding (part of) the invocation map
pub const FLOW_DATA_KEY: &str = "flow_data";

/// How many `flow_data` files may point at one another
const MAX_FLOW_DATA_DEPTH: usize = 8;

/// A resolved invocation: the root flow's name and the root parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    flow: String,
    params: Params,
}

impl Invocation {
    /// Build from an invocation map such as `{"flow": "demo.nest_flow", "x": 1}`.
    ///
    /// A `flow_data` entry is replaced by the contents of the file it names;
    /// the remaining entries of the map override the file's values.
    pub fn from_params(params: Params) -> Result<Self, FlowError> {
        let mut params = expand_flow_data(params, None, 0)?;

        let flow = match params.remove(FLOW_KEY) {
            Some(Value::String(name)) if !name.trim().is_empty() => name,
            _ => return Err(FlowError::MissingFlow),
        };

        Ok(Self { flow, params })
    }

    /// Build from a flow-data JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        Self::from_file_with(path, Params::new())
    }

    /// Build from a flow-data JSON file, with `overrides` taking precedence
    pub fn from_file_with(path: impl AsRef<Path>, overrides: Params) -> Result<Self, FlowError> {
        let mut params = overrides;
        params.insert(
            FLOW_DATA_KEY.to_string(),
            Value::String(path.as_ref().to_string_lossy().into_owned()),
        );
        Self::from_params(params)
    }

    pub fn flow(&self) -> &str {
        &self.flow
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Run the root flow in a fresh manager.
    ///
    /// `base_params` sit beneath the invocation's own parameters in the
    /// global scope. Only lookup failures are errors; what the flow does is
    /// reported through the sink.
    pub async fn run(
        self,
        registry: Arc<FlowRegistry>,
        sink: Arc<dyn LogSink>,
        base_params: Params,
    ) -> Result<Option<Value>, FlowError> {
        let definition = registry.lookup(&self.flow)?;
        let root_params = merge_params(&base_params, self.params);

        tracing::debug!(flow = %definition.name(), params = root_params.len(), "starting root flow");

        let mut manager = WorkflowManager::new(registry, root_params).with_sink(sink);
        Ok(manager.run_flow(definition, Params::new()).await)
    }
}

/// Replace `flow_data` with the referenced file's contents, recursively.
///
/// Relative paths inside a flow-data file are taken relative to that file.
fn expand_flow_data(
    mut params: Params,
    base_dir: Option<&Path>,
    depth: usize,
) -> Result<Params, FlowError> {
    let path = match params.remove(FLOW_DATA_KEY) {
        None | Some(Value::Null) => return Ok(params),
        Some(value) => resolve_path(&render_value(&value), base_dir),
    };

    if depth >= MAX_FLOW_DATA_DEPTH {
        return Err(FlowError::FlowDataTooDeep { path });
    }

    let loaded = load_flow_data(&path)?;
    let base = expand_flow_data(loaded, path.parent(), depth + 1)?;
    Ok(merge_params(&base, params))
}

fn resolve_path(raw: &str, base_dir: Option<&Path>) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(raw.trim()).as_ref());
    match base_dir {
        Some(dir) if expanded.is_relative() => dir.join(expanded),
        _ => expanded,
    }
}

fn load_flow_data(path: &Path) -> Result<Params, FlowError> {
    let content = std::fs::read_to_string(path).map_err(|source| FlowError::FlowDataRead {
        path: path.to_path_buf(),
        source,
    })?;

    let value: Value =
        serde_json::from_str(&content).map_err(|source| FlowError::FlowDataParse {
            path: path.to_path_buf(),
            source,
        })?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(FlowError::FlowDataNotObject {
            path: path.to_path_buf(),
        }),
    }
}
