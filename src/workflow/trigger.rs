//! Poll-and-dispatch loop shared by trigger flows
//!
//! A trigger flow owns a [`TriggerCondition`] and hands it to [`run_trigger`],
//! which polls the condition every `sleep_interval` seconds. Each time it
//! fires, the flow-data file named by `trigger_workflow_data` is started as a
//! separate process through `system.shell_flow`, without waiting for it.

use super::unit::FlowContext;
use crate::config::{DefaultParams, duration_from_secs};
use crate::flows::shell::ShellFlow;
use crate::flows::status;
use crate::process::shell_quote;
use crate::signals::is_shutdown_requested;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

/// Decides when a trigger fires
#[async_trait]
pub trait TriggerCondition: Send {
    /// Called once before the first poll
    async fn start(&mut self, _ctx: &mut FlowContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Poll the condition; `true` fires the trigger
    async fn update(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<bool>;
}

/// Defaults every trigger flow starts from
pub fn trigger_defaults() -> DefaultParams {
    DefaultParams::base().extend(json!({
        "trigger_workflow_data": null,
        "trigger_cmd": null,
        "sleep_interval": 1,
        "max_trigger_count": -1,
        "max_running_work_count": -1,
    }))
}

/// Dispatched and finished work, shared with completion callbacks
#[derive(Debug, Default)]
struct TriggerCounters {
    running: AtomicI64,
    completed: AtomicI64,
}

impl TriggerCounters {
    fn running(&self) -> i64 {
        self.running.load(Ordering::SeqCst)
    }

    fn completed(&self) -> i64 {
        self.completed.load(Ordering::SeqCst)
    }
}

/// -1 (or any negative) means no limit
fn limit_reached(limit: i64, count: i64) -> bool {
    limit >= 0 && count >= limit
}

/// Command that runs the flow-data file in a fresh process
fn dispatch_command(ctx: &FlowContext<'_>, workflow_data: &str) -> anyhow::Result<String> {
    if let Some(cmd) = ctx.param_str("trigger_cmd").filter(|c| !c.trim().is_empty()) {
        return Ok(cmd);
    }
    let exe = std::env::current_exe()?;
    Ok(format!(
        "{} file {}",
        shell_quote(&exe.to_string_lossy()),
        shell_quote(workflow_data)
    ))
}

/// Run the trigger loop until the trigger limit is reached or shutdown is
/// requested. Returns a status record.
pub async fn run_trigger<C>(condition: &mut C, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>>
where
    C: TriggerCondition + ?Sized,
{
    let Some(workflow_data) = ctx
        .param_str("trigger_workflow_data")
        .filter(|d| !d.trim().is_empty())
    else {
        ctx.error("'trigger_workflow_data' is not set, trigger not started");
        return Ok(Some(status::failure("missing 'trigger_workflow_data' parameter")));
    };

    let sleep_interval = ctx.param_f64("sleep_interval", 1.0);
    let Some(sleep) = duration_from_secs(sleep_interval).filter(|d| !d.is_zero()) else {
        ctx.error("'sleep_interval' must be greater than 0");
        return Ok(Some(status::failure("invalid 'sleep_interval' parameter")));
    };
    let max_trigger_count = ctx.param_i64("max_trigger_count", -1);
    let max_running = ctx.param_i64("max_running_work_count", -1);
    let cmd = dispatch_command(ctx, &workflow_data)?;

    ctx.log(format!(
        "trigger armed, checking every {}s, max triggers: {}",
        sleep_interval, max_trigger_count
    ));

    condition.start(ctx).await?;

    let counters = Arc::new(TriggerCounters::default());
    let mut dispatched: i64 = 0;

    loop {
        if limit_reached(max_trigger_count, counters.completed()) {
            ctx.log(format!(
                "trigger reached its limit of {} runs, stopping",
                max_trigger_count
            ));
            break;
        }
        if is_shutdown_requested() {
            ctx.log("shutdown requested, stopping trigger");
            break;
        }

        tokio::time::sleep(sleep).await;

        if !condition.update(ctx).await? {
            continue;
        }
        if limit_reached(max_running, counters.running()) {
            ctx.log(format!(
                "{} triggered runs still active (limit {}), waiting",
                counters.running(),
                max_running
            ));
            continue;
        }

        ctx.log("trigger fired, starting target flow");
        counters.running.fetch_add(1, Ordering::SeqCst);
        dispatched += 1;

        let finished = counters.clone();
        let params = crate::config::to_params(json!({
            "cmd": cmd,
            "wait": false,
            "close": true,
        }));
        ctx.run_with_completion::<ShellFlow>(
            params,
            Box::new(move |_record: &Value| {
                finished.running.fetch_sub(1, Ordering::SeqCst);
                finished.completed.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .await;
    }

    Ok(Some(status::with_fields(
        status::success("trigger stopped"),
        json!({
            "dispatched": dispatched,
            "completed": counters.completed(),
            "running": counters.running(),
        }),
    )))
}
