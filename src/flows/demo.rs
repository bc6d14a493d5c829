//! `demo.*` flows showing off nesting, parameters, shared state and
//! background work

use super::shell::ShellFlow;
use super::status;
use super::system::{ParamPrinterFlow, VersionCheckFlow};
use crate::config::{DefaultParams, Params, render_value, to_params};
use crate::workflow::{Flow, FlowContext, WorkflowUnit};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const RULE: &str = "==================================================";

// ----------------------------------------------------------------------
// Nesting
// ----------------------------------------------------------------------

const NEST_LEVELS: u8 = 4;

/// One level of the nesting demo; runs level `N + 1` until the last one
#[derive(Default)]
pub struct NestLevelFlow<const N: u8>;

#[async_trait]
impl<const N: u8> WorkflowUnit for NestLevelFlow<N> {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        ctx.log(format!("level {} running", N));

        let child = match N {
            1 => ctx.run::<NestLevelFlow<2>>(Params::new()).await,
            2 => ctx.run::<NestLevelFlow<3>>(Params::new()).await,
            3 => ctx.run::<NestLevelFlow<4>>(Params::new()).await,
            _ => None,
        };

        ctx.log(format!("level {} done", N));
        let mut record = json!({
            "level": N,
            "message": format!("level {} finished", N),
        });
        if let Some(child) = child {
            record["child"] = child;
        }
        Ok(Some(record))
    }
}

impl<const N: u8> Flow for NestLevelFlow<N> {
    const NAME: &'static str = match N {
        1 => "demo.nest_level1_flow",
        2 => "demo.nest_level2_flow",
        3 => "demo.nest_level3_flow",
        _ => "demo.nest_level4_flow",
    };
    const DESCRIPTION: &'static str = "One level of the nesting demo";
}

/// Runs a chain of nested flows to show the tree log
#[derive(Default)]
pub struct NestFlow;

#[async_trait]
impl WorkflowUnit for NestFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        ctx.log(format!("starting {} nested levels", NEST_LEVELS));
        let tree = ctx.run::<NestLevelFlow<1>>(Params::new()).await;
        Ok(Some(status::with_fields(
            status::success("nesting demo finished"),
            json!({"levels": NEST_LEVELS, "tree": tree}),
        )))
    }
}

impl Flow for NestFlow {
    const NAME: &'static str = "demo.nest_flow";
    const DESCRIPTION: &'static str = "Nest four flows to show the tree log";
}

// ----------------------------------------------------------------------
// Parameters
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct ParameterFlow;

#[async_trait]
impl WorkflowUnit for ParameterFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        ctx.log(RULE);
        ctx.log("1. plain parameters:");
        let greeting = ctx.param_str("greeting").unwrap_or_default();
        let user_name = ctx.param_str("user_name").unwrap_or_default();
        ctx.log(format!("  greeting: {}", greeting));
        ctx.log(format!("  user_name: {}", user_name));
        ctx.log(format!("  timeout: {}", ctx.param_i64("timeout", 30)));

        ctx.log("2. placeholders:");
        let endpoint = ctx.param_str("endpoint").unwrap_or_default();
        let message = ctx.param_str("message").unwrap_or_default();
        ctx.log(format!("  endpoint: {}", endpoint));
        ctx.log(format!("  message: {}", message));

        ctx.log("3. fallbacks for missing parameters:");
        ctx.log(format!(
            "  custom_greeting: {}",
            render_value(&ctx.param_or("custom_greeting", "hello (fallback)"))
        ));
        ctx.log(format!("  retry_count: {}", ctx.param_i64("retry_count", 3)));

        ctx.log("4. every visible parameter:");
        for (key, value) in ctx.all_params() {
            ctx.log(format!("  {}: {}", key, render_value(&value)));
        }
        ctx.log(RULE);

        Ok(Some(status::with_fields(
            status::success("parameter demo finished"),
            json!({
                "greeting": greeting,
                "user_name": user_name,
                "endpoint": endpoint,
                "message": message,
            }),
        )))
    }
}

impl Flow for ParameterFlow {
    const NAME: &'static str = "demo.parameter_flow";
    const DESCRIPTION: &'static str = "Show parameter lookup, placeholders and fallbacks";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({
            "greeting": "hello",
            "user_name": "developer",
            "base_url": "https://api.example.com",
            "endpoint": "{{base_url}}/users",
            "message": "welcome {{user_name}} to flowtree",
            "timeout": 30,
            "retry_count": 3,
        }))
    }
}

// ----------------------------------------------------------------------
// Shared context
// ----------------------------------------------------------------------

#[derive(Default)]
pub struct SharedContextFlow;

#[async_trait]
impl WorkflowUnit for SharedContextFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        ctx.set_shared_value("demo_user", ctx.param_str("user").unwrap_or_default());
        ctx.set_shared_value("demo_project", ctx.param_str("project").unwrap_or_default());
        ctx.set_shared_value("demo_counter", 0);

        ctx.log("shared values set, a child flow reads them through placeholders");
        let echoed = ctx
            .run::<ShellFlow>(to_params(json!({
                "cmd": "echo {{demo_user}} works on {{demo_project}}",
            })))
            .await;

        let rounds = ctx.param_i64("rounds", 3).max(0);
        let shared = ctx.shared();
        for _ in 0..rounds {
            let next = shared.get("demo_counter").and_then(|v| v.as_i64()).unwrap_or(0) + 1;
            shared.set("demo_counter", next);
            ctx.log(format!("counter is now {}", next));
        }

        Ok(Some(status::with_fields(
            status::success("shared context demo finished"),
            json!({
                "counter": shared.get("demo_counter"),
                "echo": echoed.and_then(|r| r.get("output").cloned()),
            }),
        )))
    }
}

impl Flow for SharedContextFlow {
    const NAME: &'static str = "demo.shared_context_flow";
    const DESCRIPTION: &'static str = "Share values between flows through the shared context";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({
            "user": "developer",
            "project": "flowtree",
            "rounds": 3,
        }))
    }
}

// ----------------------------------------------------------------------
// Background work
// ----------------------------------------------------------------------

/// Starts a background shell command and a batch of timed tasks, then
/// reports progress until every task has finished.
#[derive(Default)]
pub struct AsyncFlow;

#[async_trait]
impl WorkflowUnit for AsyncFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let task_count = ctx.param_i64("task_count", 3).max(0);
        let Some(duration) = ctx.param_duration("task_duration", 2.0) else {
            ctx.error("'task_duration' must be a non-negative number of seconds");
            return Ok(Some(status::failure("invalid 'task_duration' parameter")));
        };

        ctx.log("1. background command:");
        let done = ctx.logger();
        ctx.run_with_completion::<ShellFlow>(
            to_params(json!({"cmd": "{{background_cmd}}", "wait": false})),
            Box::new(move |record: &Value| {
                done.info(format!(
                    "  background command finished: {}",
                    status::status_of(record).unwrap_or("unknown")
                ));
            }),
        )
        .await;

        ctx.log(format!("2. starting {} tasks:", task_count));
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        for id in 1..=task_count {
            let tx = tx.clone();
            let logger = ctx.logger();
            tokio::spawn(async move {
                let started = Instant::now();
                logger.info(format!("  task {} started", id));
                tokio::time::sleep(duration).await;
                let elapsed = started.elapsed().as_secs_f64();
                logger.info(format!("  task {} finished in {:.2}s", id, elapsed));
                let _ = tx.send(json!({
                    "task_id": id,
                    "status": "completed",
                    "execution_time": format!("{:.2}s", elapsed),
                }));
            });
        }
        drop(tx);

        ctx.log("3. progress:");
        let mut results = Vec::new();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                finished = rx.recv() => match finished {
                    Some(result) => results.push(result),
                    None => break,
                },
                _ = ticker.tick() => {
                    ctx.log(format!("  {}/{} tasks done", results.len(), task_count));
                }
            }
        }
        ctx.log("  all tasks done");

        let success_rate = if task_count > 0 {
            results.len() as f64 / task_count as f64 * 100.0
        } else {
            100.0
        };
        Ok(Some(status::with_fields(
            status::success("async demo finished"),
            json!({
                "total_tasks": task_count,
                "completed_tasks": results.len(),
                "task_results": results,
                "success_rate": success_rate,
            }),
        )))
    }
}

impl Flow for AsyncFlow {
    const NAME: &'static str = "demo.async_flow";
    const DESCRIPTION: &'static str = "Run background tasks and monitor their progress";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({
            "task_count": 3,
            "task_duration": 2,
            "background_cmd": "echo background command running",
        }))
    }
}

// ----------------------------------------------------------------------
// Main tour
// ----------------------------------------------------------------------

/// Version check, printing, shared values and a shell command in one tree
#[derive(Default)]
pub struct MainTestFlow;

#[async_trait]
impl WorkflowUnit for MainTestFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        ctx.run::<VersionCheckFlow>(Params::new()).await;
        ctx.run::<ParamPrinterFlow>(to_params(json!({"msg": "{{default_message}}"})))
            .await;

        ctx.set_shared_value("dynamic_message", "set at runtime by the previous step");
        ctx.run::<ShellFlow>(to_params(json!({
            "cmd": "echo dynamic message: {{dynamic_message}}",
        })))
        .await;

        ctx.run::<ParamPrinterFlow>(to_params(json!({"msg": "{{default_message}}"})))
            .await;
        Ok(Some(status::success("main test flow finished")))
    }
}

impl Flow for MainTestFlow {
    const NAME: &'static str = "demo.main_test_flow";
    const DESCRIPTION: &'static str = "A short tour through the built-in flows";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({
            "default_message": "a default message defined on the flow",
        }))
    }
}
