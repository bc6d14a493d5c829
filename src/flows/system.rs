//! Small `system.*` utility flows

use super::status;
use crate::config::DefaultParams;
use crate::workflow::{Flow, FlowContext, Invocation, WorkflowUnit};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Logs its `msg` parameter
#[derive(Default)]
pub struct ParamPrinterFlow;

#[async_trait]
impl WorkflowUnit for ParamPrinterFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let msg = ctx.param_str("msg").unwrap_or_default();
        ctx.log(format!("[printer]: {}", msg));
        Ok(Some(json!({"msg": msg})))
    }
}

impl Flow for ParamPrinterFlow {
    const NAME: &'static str = "system.param_printer_flow";
    const DESCRIPTION: &'static str = "Log the 'msg' parameter";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({"msg": ""}))
    }
}

#[derive(Default)]
pub struct VersionCheckFlow;

#[async_trait]
impl WorkflowUnit for VersionCheckFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let version = env!("CARGO_PKG_VERSION");
        ctx.log(format!(
            "flowtree {} on {}/{}",
            version,
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        Ok(Some(status::with_fields(
            status::success(format!("flowtree {}", version)),
            json!({
                "version": version,
                "os": std::env::consts::OS,
                "arch": std::env::consts::ARCH,
            }),
        )))
    }
}

impl Flow for VersionCheckFlow {
    const NAME: &'static str = "system.version_check_flow";
    const DESCRIPTION: &'static str = "Log the flowtree version and platform";
}

/// Runs the invocation stored in the flow-data file `workflow_data` as a
/// sub-flow of this one.
#[derive(Default)]
pub struct FlowDataFlow;

#[async_trait]
impl WorkflowUnit for FlowDataFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let Some(path) = ctx.param_str("workflow_data").filter(|p| !p.trim().is_empty()) else {
            ctx.error("'workflow_data' is not set");
            return Ok(Some(status::failure("missing 'workflow_data' parameter")));
        };

        let invocation = match Invocation::from_file(&path) {
            Ok(invocation) => invocation,
            Err(e) => {
                ctx.error(format!("cannot load {}: {}", path, e));
                return Ok(Some(status::failure(e.to_string())));
            }
        };

        ctx.log(format!("running {} from {}", invocation.flow(), path));
        match ctx.run_named(invocation.flow(), invocation.params().clone()).await {
            Ok(result) => Ok(result),
            Err(e) => {
                ctx.error(e.to_string());
                Ok(Some(status::failure(e.to_string())))
            }
        }
    }
}

impl Flow for FlowDataFlow {
    const NAME: &'static str = "system.flow_data_flow";
    const DESCRIPTION: &'static str = "Run the flow described by a flow-data file";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({"workflow_data": null}))
    }
}
