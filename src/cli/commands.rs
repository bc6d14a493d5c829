//! CLI command implementations

use super::args::parse_flow_args;
use crate::config::Params;
use crate::sink::{LogSink, OutputMode};
use crate::workflow::{FLOW_KEY, FlowError, FlowRegistry, Invocation};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

/// Exit code for lookup and usage errors
pub const EXIT_USAGE: i32 = 2;

/// Exit code when interrupted by a signal
pub const EXIT_INTERRUPTED: i32 = 130;

/// Everything a command needs besides its own arguments
pub struct CommandContext {
    pub registry: Arc<FlowRegistry>,
    pub sink: Arc<dyn LogSink>,
    pub output: OutputMode,
    /// Root parameters from the settings files
    pub base_params: Params,
}

/// Run a registered flow with `--key value` parameters
pub async fn run_flow(name: &str, args: &[String], ctx: &CommandContext) -> anyhow::Result<i32> {
    let mut params = match parse_flow_args(args) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(EXIT_USAGE);
        }
    };

    params.insert(FLOW_KEY.to_string(), Value::String(name.to_string()));
    let invocation = match Invocation::from_params(params) {
        Ok(invocation) => invocation,
        Err(e) => return report_flow_error(e),
    };
    run_invocation(invocation, ctx).await
}

/// Run the invocation stored in a flow-data file
pub async fn run_file(path: &Path, args: &[String], ctx: &CommandContext) -> anyhow::Result<i32> {
    let overrides = match parse_flow_args(args) {
        Ok(params) => params,
        Err(e) => {
            eprintln!("error: {}", e);
            return Ok(EXIT_USAGE);
        }
    };

    let invocation = match Invocation::from_file_with(path, overrides) {
        Ok(invocation) => invocation,
        Err(e) => return report_flow_error(e),
    };
    run_invocation(invocation, ctx).await
}

async fn run_invocation(invocation: Invocation, ctx: &CommandContext) -> anyhow::Result<i32> {
    let flow = invocation.flow().to_string();
    tracing::debug!(flow = %flow, "running invocation");

    let result = invocation
        .run(ctx.registry.clone(), ctx.sink.clone(), ctx.base_params.clone())
        .await;

    match result {
        Ok(Some(value)) => {
            print_result(ctx.output, &flow, &value)?;
            Ok(0)
        }
        Ok(None) => {
            tracing::warn!("flow '{}' produced no result", flow);
            Ok(0)
        }
        Err(e) => report_flow_error(e),
    }
}

/// Lookup failures are usage errors; anything else propagates
fn report_flow_error(error: FlowError) -> anyhow::Result<i32> {
    if error.is_lookup() {
        eprintln!("error: {}", error);
        Ok(EXIT_USAGE)
    } else {
        Err(error.into())
    }
}

fn print_result(output: OutputMode, flow: &str, value: &Value) -> anyhow::Result<()> {
    match output {
        OutputMode::Console => println!("{}", serde_json::to_string_pretty(value)?),
        OutputMode::Json => println!(
            "{}",
            serde_json::to_string(&json!({"event": "result", "flow": flow, "result": value}))?
        ),
        OutputMode::Quiet => {}
    }
    Ok(())
}

/// List registered flows
pub fn list_flows(registry: &FlowRegistry, output: OutputMode) -> anyhow::Result<()> {
    match output {
        OutputMode::Json => {
            let flows: Vec<Value> = registry
                .definitions()
                .map(|d| json!({"name": d.name(), "description": d.description()}))
                .collect();
            println!("{}", serde_json::to_string(&flows)?);
        }
        _ => {
            let width = registry.names().iter().map(|n| n.len()).max().unwrap_or(0);
            for definition in registry.definitions() {
                if definition.description().is_empty() {
                    println!("{}", definition.name());
                } else {
                    println!(
                        "{:<width$}  {}",
                        definition.name(),
                        definition.description(),
                        width = width
                    );
                }
            }
            if registry.is_empty() {
                println!("(no flows registered)");
            }
        }
    }
    Ok(())
}

/// Print a flow's merged default parameters
pub fn show_flow(registry: &FlowRegistry, name: &str) -> anyhow::Result<i32> {
    let definition = match registry.lookup(name) {
        Ok(definition) => definition,
        Err(e) => return report_flow_error(e),
    };

    if !definition.description().is_empty() {
        println!("# {}", definition.description());
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&Value::Object(definition.defaults().clone()))?
    );
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemorySink;
    use tempfile::TempDir;

    fn context(sink: &MemorySink) -> CommandContext {
        CommandContext {
            registry: Arc::new(FlowRegistry::builtin()),
            sink: Arc::new(sink.clone()),
            output: OutputMode::Quiet,
            base_params: Params::new(),
        }
    }

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_flow_passes_params() {
        let sink = MemorySink::new();
        let code = run_flow(
            "system.param_printer_flow",
            &args(&["--msg", "from cli"]),
            &context(&sink),
        )
        .await
        .unwrap();

        assert_eq!(code, 0);
        assert!(sink.contains("[printer]: from cli"));
    }

    #[tokio::test]
    async fn test_unknown_flow_is_usage_error() {
        let sink = MemorySink::new();
        let code = run_flow("system.shel_flow", &[], &context(&sink)).await.unwrap();
        assert_eq!(code, EXIT_USAGE);
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_dangling_key_is_usage_error() {
        let sink = MemorySink::new();
        let code = run_flow("system.param_printer_flow", &args(&["--msg"]), &context(&sink))
            .await
            .unwrap();
        assert_eq!(code, EXIT_USAGE);
    }

    #[tokio::test]
    async fn test_run_file_with_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.json");
        std::fs::write(
            &path,
            r#"{"flow": "system.param_printer_flow", "msg": "from file"}"#,
        )
        .unwrap();

        let sink = MemorySink::new();
        let code = run_file(&path, &args(&["--msg", "overridden"]), &context(&sink))
            .await
            .unwrap();

        assert_eq!(code, 0);
        assert!(sink.contains("[printer]: overridden"));
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let sink = MemorySink::new();
        let result = run_file(Path::new("/no/such/job.json"), &[], &context(&sink)).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_show_flow() {
        let registry = FlowRegistry::builtin();
        assert_eq!(show_flow(&registry, "system.shell_flow").unwrap(), 0);
        assert_eq!(show_flow(&registry, "nope.flow").unwrap(), EXIT_USAGE);
    }
}
