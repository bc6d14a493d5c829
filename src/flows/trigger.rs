//! Time-based trigger flows

use super::status;
use crate::config::{DefaultParams, duration_from_secs};
use crate::workflow::trigger::{TriggerCondition, run_trigger, trigger_defaults};
use crate::workflow::{Flow, FlowContext, WorkflowUnit};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use serde_json::{Value, json};
use std::time::{Duration, Instant};

/// Fires every `interval` seconds.
#[derive(Default)]
pub struct IntervalTriggerFlow {
    interval: Duration,
    last_fired: Option<Instant>,
}

#[async_trait]
impl TriggerCondition for IntervalTriggerFlow {
    async fn start(&mut self, _ctx: &mut FlowContext<'_>) -> anyhow::Result<()> {
        self.last_fired = Some(Instant::now());
        Ok(())
    }

    async fn update(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<bool> {
        let now = Instant::now();
        let due = self
            .last_fired
            .is_none_or(|last| now.duration_since(last) >= self.interval);
        if due {
            self.last_fired = Some(now);
            ctx.log(format!("interval of {}s elapsed", self.interval.as_secs_f64()));
        }
        Ok(due)
    }
}

#[async_trait]
impl WorkflowUnit for IntervalTriggerFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let secs = ctx.param_f64("interval", 10.0).max(0.0);
        let Some(interval) = duration_from_secs(secs) else {
            ctx.error(format!("'interval' of {}s is out of range", secs));
            return Ok(Some(status::failure("invalid 'interval' parameter")));
        };
        self.interval = interval;
        run_trigger(self, ctx).await
    }
}

impl Flow for IntervalTriggerFlow {
    const NAME: &'static str = "trigger.interval_flow";
    const DESCRIPTION: &'static str = "Start a flow-data file every 'interval' seconds";

    fn defaults() -> DefaultParams {
        trigger_defaults().extend(json!({"interval": 10}))
    }
}

/// Parse `trigger_time` as local `YYYY-MM-DD HH:MM:SS` (or ISO 8601 with a
/// `T`), or as RFC 3339 with an explicit offset.
pub fn parse_trigger_time(raw: &str) -> anyhow::Result<DateTime<Local>> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.with_timezone(&Local));
    }

    let naive = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .with_context(|| format!("unrecognised trigger_time '{}'", raw))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("trigger_time '{}' does not exist in the local timezone", raw))
}

/// Fires once when the clock passes `trigger_time`.
#[derive(Default)]
pub struct AtTriggerFlow {
    at: Option<DateTime<Local>>,
    fired: bool,
}

#[async_trait]
impl TriggerCondition for AtTriggerFlow {
    async fn start(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<()> {
        let raw = ctx
            .param_str("trigger_time")
            .filter(|t| !t.trim().is_empty())
            .context("'trigger_time' is not set")?;
        let at = parse_trigger_time(&raw)?;
        ctx.log(format!("armed for {}", at.format("%Y-%m-%d %H:%M:%S")));
        self.at = Some(at);
        Ok(())
    }

    async fn update(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<bool> {
        if self.fired {
            return Ok(false);
        }
        let Some(at) = self.at else {
            return Ok(false);
        };
        if Local::now() >= at {
            self.fired = true;
            ctx.log(format!("reached {}", at.format("%Y-%m-%d %H:%M:%S")));
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl WorkflowUnit for AtTriggerFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        run_trigger(self, ctx).await
    }
}

impl Flow for AtTriggerFlow {
    const NAME: &'static str = "trigger.at_flow";
    const DESCRIPTION: &'static str = "Start a flow-data file once at 'trigger_time'";

    fn defaults() -> DefaultParams {
        trigger_defaults().extend(json!({
            "trigger_time": "2025-07-24 10:00:00",
            "max_trigger_count": 1,
        }))
    }
}
