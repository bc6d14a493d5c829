//! Recursive flow execution with scope, call-stack and depth tracking

use super::error::FlowError;
use super::logger::FlowLogger;
use super::registry::{FlowDefinition, FlowRegistry, normalize_flow_name};
use super::tree::{TreeKind, flow_end_message, flow_start_message};
use super::unit::{Completion, Flow, FlowContext};
use crate::config::{Config, Params, SharedContext, merge_params};
use crate::sink::{LogLevel, LogSink, TracingSink};
use anyhow::anyhow;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by the recursive entry points
pub type FlowFuture<'a> = Pin<Box<dyn Future<Output = Option<Value>> + Send + 'a>>;

/// Runs flows for one top-level invocation.
///
/// Owns the shared context, the stack of active scopes and the set of flows
/// on the current execution path. Every `run_flow` call pushes exactly one
/// scope and one call-stack entry and removes them again before returning,
/// whatever the flow did.
pub struct WorkflowManager {
    registry: Arc<FlowRegistry>,
    shared: SharedContext,
    config_stack: Vec<Arc<Config>>,
    call_stack: HashSet<String>,
    flow_depth: i32,
    sink: Arc<dyn LogSink>,
}

impl WorkflowManager {
    /// Build a manager whose global scope holds `root_params`
    pub fn new(registry: Arc<FlowRegistry>, root_params: Params) -> Self {
        let shared = SharedContext::new();
        let shared_config = Arc::new(Config::shared(shared.clone()));
        let global = Arc::new(Config::child(root_params, shared_config));

        Self {
            registry,
            shared,
            config_stack: vec![global],
            call_stack: HashSet::new(),
            flow_depth: -1,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<FlowRegistry> {
        &self.registry
    }

    pub fn shared(&self) -> &SharedContext {
        &self.shared
    }

    pub fn set_shared_value(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.shared.set(key, value);
    }

    /// The innermost active scope
    pub fn current_config(&self) -> Arc<Config> {
        match self.config_stack.last() {
            Some(config) => config.clone(),
            None => Arc::new(Config::shared(self.shared.clone())),
        }
    }

    /// Nesting depth of the running flow; -1 when idle
    pub fn depth(&self) -> i32 {
        self.flow_depth
    }

    /// Number of scopes on the stack, including the global scope
    pub fn scope_depth(&self) -> usize {
        self.config_stack.len()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.call_stack.contains(name)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<FlowDefinition>, FlowError> {
        self.registry.lookup(name)
    }

    pub fn logger(&self, depth: i32, flow: Option<&str>) -> FlowLogger {
        FlowLogger::new(self.sink.clone(), depth, flow)
    }

    /// Log a line at the current depth
    pub fn log(&self, kind: TreeKind, level: LogLevel, message: impl AsRef<str>) {
        self.logger(self.flow_depth, None).log_as(kind, level, message);
    }

    /// Registered definition for `F`, or a fresh one when `F` isn't registered
    pub(crate) fn definition_for<F: Flow>(&self) -> Arc<FlowDefinition> {
        normalize_flow_name(F::NAME)
            .ok()
            .and_then(|name| self.registry.get(&name).cloned())
            .filter(|definition| definition.is_type::<F>())
            .unwrap_or_else(|| Arc::new(FlowDefinition::of::<F>()))
    }

    /// Look up a flow by name and run it
    pub async fn run_named(
        &mut self,
        name: &str,
        params: Params,
    ) -> Result<Option<Value>, FlowError> {
        let definition = self.lookup(name)?;
        Ok(self.run_flow(definition, params).await)
    }

    /// Run a flow to completion.
    ///
    /// Returns `None` if the flow was rejected as cyclic, failed or panicked,
    /// or produced no result. Failures are logged, never propagated.
    pub fn run_flow(&mut self, definition: Arc<FlowDefinition>, params: Params) -> FlowFuture<'_> {
        self.run_flow_with(definition, params, None)
    }

    pub(crate) fn run_flow_with(
        &mut self,
        definition: Arc<FlowDefinition>,
        params: Params,
        completion: Option<Completion>,
    ) -> FlowFuture<'_> {
        Box::pin(async move {
            let name = definition.name().to_string();

            if self.call_stack.contains(&name) {
                self.log(
                    TreeKind::Mid,
                    LogLevel::Error,
                    format!(
                        "cyclic dependency detected: flow '{}' is already on the call stack",
                        name
                    ),
                );
                return None;
            }

            self.call_stack.insert(name.clone());
            self.flow_depth += 1;

            let effective = merge_params(definition.defaults(), params);
            let config = Arc::new(Config::child(effective, self.current_config()));
            self.config_stack.push(config.clone());

            let result = self.execute(definition, config.clone(), completion).await;

            if self
                .config_stack
                .last()
                .is_some_and(|top| Arc::ptr_eq(top, &config))
            {
                self.config_stack.pop();
            } else {
                tracing::warn!(flow = %name, "scope stack out of order, leaving it untouched");
            }
            self.call_stack.remove(&name);
            self.flow_depth -= 1;

            result
        })
    }

    async fn execute(
        &mut self,
        definition: Arc<FlowDefinition>,
        config: Arc<Config>,
        completion: Option<Completion>,
    ) -> Option<Value> {
        let name = definition.name().to_string();
        let logger = self.logger(self.flow_depth, Some(&name));
        logger.log_as(TreeKind::Start, LogLevel::Info, flow_start_message(&name));

        let mut unit = definition.instantiate();
        let outcome = {
            let mut ctx = FlowContext::new(self, definition, config, completion);
            AssertUnwindSafe(async {
                match unit.init(&mut ctx).await {
                    Ok(()) => unit.run(&mut ctx).await,
                    Err(e) => Err(e),
                }
            })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))))
        };

        match outcome {
            Ok(result) => {
                logger.log_as(TreeKind::End, LogLevel::Info, flow_end_message(&name));
                result
            }
            Err(e) => {
                logger.log_as(
                    TreeKind::End,
                    LogLevel::Error,
                    format!("flow '{}' failed: {:#}", name, e),
                );
                logger.error(format!("{:?}", e));
                None
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::to_params;
    use crate::sink::MemorySink;
    use crate::workflow::WorkflowUnit;
    use async_trait::async_trait;
    use serde_json::json;

    fn manager_with_sink(root: Value) -> (WorkflowManager, MemorySink) {
        let sink = MemorySink::new();
        let manager = WorkflowManager::new(Arc::new(FlowRegistry::new()), to_params(root))
            .with_sink(Arc::new(sink.clone()));
        (manager, sink)
    }

    async fn run<F: Flow>(manager: &mut WorkflowManager, params: Value) -> Option<Value> {
        let definition = manager.definition_for::<F>();
        manager.run_flow(definition, to_params(params)).await
    }

    #[derive(Default)]
    struct RecursiveFlow;

    #[async_trait]
    impl WorkflowUnit for RecursiveFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            let inner = ctx.run::<RecursiveFlow>(Params::new()).await;
            ctx.set_shared_value("inner_was_none", inner.is_none());
            Ok(Some(json!("outer")))
        }
    }

    impl Flow for RecursiveFlow {
        const NAME: &'static str = "test.recursive_flow";
    }

    #[tokio::test]
    async fn test_cycle_is_rejected_and_stacks_unwind() {
        let (mut manager, sink) = manager_with_sink(json!({}));

        let result = run::<RecursiveFlow>(&mut manager, json!({})).await;

        assert_eq!(result, Some(json!("outer")));
        assert_eq!(manager.shared().get("inner_was_none"), Some(json!(true)));
        assert!(sink.contains(
            "cyclic dependency detected: flow 'test.recursive_flow' is already on the call stack"
        ));
        assert_eq!(manager.scope_depth(), 1);
        assert_eq!(manager.depth(), -1);
        assert!(!manager.is_running("test.recursive_flow"));

        let starts = sink
            .lines()
            .iter()
            .filter(|l| l.contains("[flow start]"))
            .count();
        assert_eq!(starts, 1);
    }

    #[derive(Default)]
    struct LeafFlow;

    #[async_trait]
    impl WorkflowUnit for LeafFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            ctx.log("inside leaf");
            ctx.set_shared_value("leaf_depth", ctx.depth());
            Ok(Some(json!({"status": "success"})))
        }
    }

    impl Flow for LeafFlow {
        const NAME: &'static str = "test.leaf_flow";
    }

    #[derive(Default)]
    struct MiddleFlow;

    #[async_trait]
    impl WorkflowUnit for MiddleFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            ctx.log("inside middle");
            Ok(ctx.run::<LeafFlow>(Params::new()).await)
        }
    }

    impl Flow for MiddleFlow {
        const NAME: &'static str = "test.middle_flow";
    }

    #[derive(Default)]
    struct TopFlow;

    #[async_trait]
    impl WorkflowUnit for TopFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            ctx.log("inside top");
            Ok(ctx.run::<MiddleFlow>(Params::new()).await)
        }
    }

    impl Flow for TopFlow {
        const NAME: &'static str = "test.top_flow";
    }

    #[tokio::test]
    async fn test_depth_indexed_prefixes() {
        let (mut manager, sink) = manager_with_sink(json!({}));

        let result = run::<TopFlow>(&mut manager, json!({})).await;
        assert_eq!(result, Some(json!({"status": "success"})));
        assert_eq!(manager.shared().get("leaf_depth"), Some(json!(2)));

        let lines = sink.lines();
        assert_eq!(
            lines,
            vec![
                "[flow start]: test.top_flow",
                "inside top",
                "┏━[flow start]: test.middle_flow",
                "┣━inside middle",
                "  ┏━[flow start]: test.leaf_flow",
                "  ┣━inside leaf",
                "  ┗━[flow end]: test.leaf_flow",
                "┗━[flow end]: test.middle_flow",
                "[flow end]: test.top_flow",
            ]
        );

        let records = sink.records();
        assert_eq!(records[4].depth - records[0].depth, 2);
        assert_eq!(records[4].kind, TreeKind::Start);
        assert_eq!(records[6].kind, TreeKind::End);
    }

    #[derive(Default)]
    struct FailingFlow;

    #[async_trait]
    impl WorkflowUnit for FailingFlow {
        async fn run(&mut self, _ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            anyhow::bail!("disk on fire")
        }
    }

    impl Flow for FailingFlow {
        const NAME: &'static str = "test.failing_flow";
    }

    #[derive(Default)]
    struct SiblingsFlow;

    #[async_trait]
    impl WorkflowUnit for SiblingsFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            let failed = ctx.run::<FailingFlow>(Params::new()).await;
            let next = ctx.run::<LeafFlow>(Params::new()).await;
            Ok(Some(json!({
                "failed": failed,
                "next": next,
            })))
        }
    }

    impl Flow for SiblingsFlow {
        const NAME: &'static str = "test.siblings_flow";
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let (mut manager, sink) = manager_with_sink(json!({}));

        let result = run::<SiblingsFlow>(&mut manager, json!({})).await.unwrap();
        assert_eq!(result["failed"], Value::Null);
        assert_eq!(result["next"], json!({"status": "success"}));

        let failure = sink
            .records()
            .into_iter()
            .find(|r| r.message.starts_with("flow 'test.failing_flow' failed"))
            .unwrap();
        assert_eq!(failure.level, LogLevel::Error);
        assert_eq!(failure.kind, TreeKind::End);
        assert!(failure.message.contains("disk on fire"));

        assert_eq!(manager.scope_depth(), 1);
        assert_eq!(manager.depth(), -1);
    }

    #[derive(Default)]
    struct PanickingFlow;

    #[async_trait]
    impl WorkflowUnit for PanickingFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            let seconds = ctx.param_f64("seconds", f64::INFINITY);
            let _ = std::time::Duration::from_secs_f64(seconds);
            Ok(Some(json!("unreachable")))
        }
    }

    impl Flow for PanickingFlow {
        const NAME: &'static str = "test.panicking_flow";
    }

    #[derive(Default)]
    struct PanicSiblingsFlow;

    #[async_trait]
    impl WorkflowUnit for PanicSiblingsFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            let panicked = ctx.run::<PanickingFlow>(Params::new()).await;
            let next = ctx.run::<LeafFlow>(Params::new()).await;
            Ok(Some(json!({
                "panicked": panicked,
                "next": next,
            })))
        }
    }

    impl Flow for PanicSiblingsFlow {
        const NAME: &'static str = "test.panic_siblings_flow";
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let (mut manager, sink) = manager_with_sink(json!({}));

        let result = run::<PanicSiblingsFlow>(&mut manager, json!({})).await.unwrap();
        assert_eq!(result["panicked"], Value::Null);
        assert_eq!(result["next"], json!({"status": "success"}));
        assert_eq!(manager.shared().get("leaf_depth"), Some(json!(1)));

        let failure = sink
            .records()
            .into_iter()
            .find(|r| r.message.starts_with("flow 'test.panicking_flow' failed"))
            .unwrap();
        assert_eq!(failure.level, LogLevel::Error);
        assert_eq!(failure.kind, TreeKind::End);
        assert!(failure.message.contains("panicked: cannot convert float seconds to Duration"));

        assert_eq!(manager.scope_depth(), 1);
        assert_eq!(manager.depth(), -1);
        assert!(!manager.is_running("test.panicking_flow"));
        assert!(!manager.is_running("test.panic_siblings_flow"));
    }

    #[test]
    fn test_panic_message() {
        let literal: Box<dyn Any + Send> = Box::new("boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bang"));
        let other: Box<dyn Any + Send> = Box::new(7);
        assert_eq!(panic_message(literal.as_ref()), "boom");
        assert_eq!(panic_message(owned.as_ref()), "bang");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[derive(Default)]
    struct FailingInitFlow;

    #[async_trait]
    impl WorkflowUnit for FailingInitFlow {
        async fn init(&mut self, _ctx: &mut FlowContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("not ready")
        }

        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            ctx.log("should not happen");
            Ok(Some(json!("should not happen")))
        }
    }

    impl Flow for FailingInitFlow {
        const NAME: &'static str = "test.failing_init_flow";
    }

    #[tokio::test]
    async fn test_init_failure_skips_run() {
        let (mut manager, sink) = manager_with_sink(json!({}));
        assert_eq!(run::<FailingInitFlow>(&mut manager, json!({})).await, None);
        assert!(sink.contains("not ready"));
        assert!(!sink.contains("should not happen"));
    }

    #[derive(Default)]
    struct EchoFlow;

    #[async_trait]
    impl WorkflowUnit for EchoFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            Ok(Some(Value::Object(ctx.all_params())))
        }
    }

    impl Flow for EchoFlow {
        const NAME: &'static str = "test.echo_flow";

        fn defaults() -> crate::config::DefaultParams {
            crate::config::DefaultParams::base().extend(json!({"greeting": "hi {{who}}", "n": 1}))
        }
    }

    #[tokio::test]
    async fn test_root_params_and_defaults() {
        let (mut manager, _sink) = manager_with_sink(json!({"who": "Ann"}));

        let result = run::<EchoFlow>(&mut manager, json!({"n": 2})).await.unwrap();
        assert_eq!(result["greeting"], json!("hi Ann"));
        assert_eq!(result["n"], json!(2));
        assert_eq!(result["who"], json!("Ann"));
    }

    #[tokio::test]
    async fn test_ancestor_value_shadows_invocation_param() {
        let (mut manager, _sink) = manager_with_sink(json!({"n": 99}));
        manager.set_shared_value("greeting", "from shared");

        let result = run::<EchoFlow>(&mut manager, json!({"n": 2})).await.unwrap();
        // all_params lets the flow's own layer win
        assert_eq!(result["n"], json!(2));
        assert_eq!(result["greeting"], json!("hi "));

        let config = manager.current_config();
        assert_eq!(config.get("n"), Some(json!(99)));
        assert_eq!(config.get("greeting"), Some(json!("from shared")));
    }

    #[derive(Default)]
    struct SharedWriterFlow;

    #[async_trait]
    impl WorkflowUnit for SharedWriterFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            ctx.set_shared_value("token", "abc");
            Ok(ctx.run::<SharedReaderFlow>(Params::new()).await)
        }
    }

    impl Flow for SharedWriterFlow {
        const NAME: &'static str = "test.shared_writer_flow";
    }

    #[derive(Default)]
    struct SharedReaderFlow;

    #[async_trait]
    impl WorkflowUnit for SharedReaderFlow {
        async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
            Ok(ctx.param_str("url").map(Value::String))
        }
    }

    impl Flow for SharedReaderFlow {
        const NAME: &'static str = "test.shared_reader_flow";

        fn defaults() -> crate::config::DefaultParams {
            crate::config::DefaultParams::base().with("url", "http://x/?t={{token}}")
        }
    }

    #[tokio::test]
    async fn test_shared_value_visible_to_later_flows() {
        let (mut manager, _sink) = manager_with_sink(json!({}));
        let result = run::<SharedWriterFlow>(&mut manager, json!({})).await;
        assert_eq!(result, Some(json!("http://x/?t=abc")));
    }

    #[tokio::test]
    async fn test_run_named_lookup_errors() {
        let (mut manager, _sink) = manager_with_sink(json!({}));
        let err = manager.run_named("nope.flow", Params::new()).await.unwrap_err();
        assert!(matches!(err, FlowError::NotFound { .. }));
        assert_eq!(manager.scope_depth(), 1);
    }

    #[tokio::test]
    async fn test_run_named_registered_flow() {
        let mut registry = FlowRegistry::new();
        registry.register::<LeafFlow>();
        let mut manager = WorkflowManager::new(Arc::new(registry), Params::new())
            .with_sink(Arc::new(MemorySink::new()));

        let result = manager.run_named("test.leaf-flow", Params::new()).await.unwrap();
        assert_eq!(result, Some(json!({"status": "success"})));
        assert_eq!(manager.shared().get("leaf_depth"), Some(json!(0)));
    }
}
