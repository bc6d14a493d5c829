//! The flow contract and the context a running flow works through

use super::error::FlowError;
use super::logger::FlowLogger;
use super::manager::WorkflowManager;
use super::registry::FlowDefinition;
use super::tree::TreeKind;
use crate::config::{
    Config, DefaultParams, Params, SharedContext, duration_from_secs, render_value, value_as_bool,
    value_as_f64, value_as_i64, value_as_list,
};
use crate::sink::LogLevel;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One-shot callback handed from a caller to the flow it starts.
///
/// Receives the flow's result record once the flow's work has finished,
/// which for background work may be long after `run` returned.
pub type Completion = Box<dyn FnOnce(&Value) + Send + Sync + 'static>;

/// An executable unit of work.
#[async_trait]
pub trait WorkflowUnit: Send {
    /// Called once before [`WorkflowUnit::run`]
    async fn init(&mut self, _ctx: &mut FlowContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// The flow's logic. `Ok(None)` means the flow ran but has no result.
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>>;
}

/// A named, registrable flow type
pub trait Flow: WorkflowUnit + Default + 'static {
    /// Dotted registry name, e.g. `system.shell_flow`
    const NAME: &'static str;

    /// One-line description shown by `flowtree list`
    const DESCRIPTION: &'static str = "";

    /// Default parameters, layered on top of the base defaults
    fn defaults() -> DefaultParams {
        DefaultParams::base()
    }
}

/// A running flow's view of its scope and of the manager.
pub struct FlowContext<'m> {
    manager: &'m mut WorkflowManager,
    definition: Arc<FlowDefinition>,
    config: Arc<Config>,
    depth: i32,
    completion: Option<Completion>,
}

impl<'m> FlowContext<'m> {
    pub(crate) fn new(
        manager: &'m mut WorkflowManager,
        definition: Arc<FlowDefinition>,
        config: Arc<Config>,
        completion: Option<Completion>,
    ) -> Self {
        let depth = manager.depth();
        Self {
            manager,
            definition,
            config,
            depth,
            completion,
        }
    }

    /// Registry name of the running flow
    pub fn name(&self) -> &str {
        self.definition.name()
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    pub fn get_param(&self, key: &str) -> Option<Value> {
        self.config.get(key)
    }

    pub fn param_or(&self, key: &str, default: impl Into<Value>) -> Value {
        self.config.get_or(key, default)
    }

    /// Parameter rendered as text; `None` when absent or null
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.get_param(key)? {
            Value::Null => None,
            value => Some(render_value(&value)),
        }
    }

    /// Boolean parameter; accepts CLI-style strings such as `"false"`
    pub fn param_bool(&self, key: &str, default: bool) -> bool {
        self.get_param(key)
            .and_then(|v| value_as_bool(&v))
            .unwrap_or(default)
    }

    pub fn param_i64(&self, key: &str, default: i64) -> i64 {
        self.get_param(key)
            .and_then(|v| value_as_i64(&v))
            .unwrap_or(default)
    }

    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        self.get_param(key)
            .and_then(|v| value_as_f64(&v))
            .unwrap_or(default)
    }

    /// Parameter in seconds; `None` when it can't be a `Duration`
    pub fn param_duration(&self, key: &str, default_secs: f64) -> Option<Duration> {
        duration_from_secs(self.param_f64(key, default_secs))
    }

    /// List parameter; a string is split on commas
    pub fn param_list(&self, key: &str) -> Vec<String> {
        self.get_param(key)
            .map(|v| value_as_list(&v))
            .unwrap_or_default()
    }

    pub fn all_params(&self) -> Params {
        self.config.all_params()
    }

    // ------------------------------------------------------------------
    // Logging
    // ------------------------------------------------------------------

    /// Detached logger bound to this flow's depth
    pub fn logger(&self) -> FlowLogger {
        self.manager.logger(self.depth, Some(self.name()))
    }

    pub fn log(&self, message: impl AsRef<str>) {
        self.logger().info(message);
    }

    pub fn log_as(&self, kind: TreeKind, message: impl AsRef<str>) {
        self.logger().log_as(kind, LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.logger().warn(message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.logger().error(message);
    }

    // ------------------------------------------------------------------
    // Sub-flows
    // ------------------------------------------------------------------

    /// Run flow type `F` as a child of this flow and wait for it.
    ///
    /// `None` when the flow failed, was rejected as cyclic, or had no result.
    pub async fn run<F: Flow>(&mut self, params: Params) -> Option<Value> {
        let definition = self.manager.definition_for::<F>();
        self.manager.run_flow(definition, params).await
    }

    /// Like [`FlowContext::run`], handing the child a completion callback
    pub async fn run_with_completion<F: Flow>(
        &mut self,
        params: Params,
        completion: Completion,
    ) -> Option<Value> {
        let definition = self.manager.definition_for::<F>();
        self.manager
            .run_flow_with(definition, params, Some(completion))
            .await
    }

    /// Run a flow by registry name. Only lookup failures are errors.
    pub async fn run_named(
        &mut self,
        name: &str,
        params: Params,
    ) -> Result<Option<Value>, FlowError> {
        self.manager.run_named(name, params).await
    }

    pub async fn run_definition(
        &mut self,
        definition: Arc<FlowDefinition>,
        params: Params,
    ) -> Option<Value> {
        self.manager.run_flow(definition, params).await
    }

    /// Completion callback supplied by the caller, if any
    pub fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    // ------------------------------------------------------------------
    // Shared state
    // ------------------------------------------------------------------

    pub fn set_shared_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.manager.set_shared_value(key, value);
    }

    /// Handle to the shared context, usable from background tasks
    pub fn shared(&self) -> SharedContext {
        self.manager.shared().clone()
    }
}
