//! `system.shell_flow`: run one shell command

use super::status;
use crate::config::DefaultParams;
use crate::process::{OutputStream, shell_command, stream_child_lines};
use crate::workflow::{Completion, Flow, FlowContext, FlowLogger, WorkflowUnit};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::process::Stdio;

/// Runs `cmd` through the platform shell, forwarding its output to the log.
///
/// With `wait = false` the command runs in the background and the flow
/// returns an `async` record at once. When `close` is set the caller's
/// completion callback receives the final record.
#[derive(Default)]
pub struct ShellFlow;

#[async_trait]
impl WorkflowUnit for ShellFlow {
    async fn run(&mut self, ctx: &mut FlowContext<'_>) -> anyhow::Result<Option<Value>> {
        let completion = ctx.take_completion();

        let Some(cmd) = ctx.param_str("cmd").filter(|c| !c.trim().is_empty()) else {
            ctx.error("shell flow needs a 'cmd' parameter");
            let record = status::failure("missing 'cmd' parameter");
            finish(completion, &record);
            return Ok(Some(record));
        };

        let command = ShellCommand {
            cmd,
            cwd: ctx
                .param_str("cwd")
                .filter(|d| !d.is_empty())
                .map(|d| PathBuf::from(shellexpand::tilde(&d).as_ref())),
            enable_log: ctx.param_bool("enable_log", true),
        };
        let wait = ctx.param_bool("wait", true);
        let completion = if ctx.param_bool("close", true) {
            completion
        } else {
            None
        };

        ctx.log(format!("$ {}", command.cmd));
        let logger = ctx.logger();

        if wait {
            let record = command.run(&logger).await;
            finish(completion, &record);
            Ok(Some(record))
        } else {
            tokio::spawn(async move {
                let record = command.run(&logger).await;
                finish(completion, &record);
            });
            Ok(Some(status::pending("command running in background")))
        }
    }
}

impl Flow for ShellFlow {
    const NAME: &'static str = "system.shell_flow";
    const DESCRIPTION: &'static str = "Run a shell command and log its output";

    fn defaults() -> DefaultParams {
        DefaultParams::base().extend(json!({
            "cmd": null,
            "cwd": null,
            "wait": true,
            "close": true,
            "enable_log": true,
        }))
    }
}

fn finish(completion: Option<Completion>, record: &Value) {
    if let Some(completion) = completion {
        completion(record);
    }
}

struct ShellCommand {
    cmd: String,
    cwd: Option<PathBuf>,
    enable_log: bool,
}

impl ShellCommand {
    async fn run(&self, logger: &FlowLogger) -> Value {
        let mut command = shell_command(&self.cmd);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.cwd {
            command.current_dir(dir);
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                logger.error(format!("failed to start command: {}", e));
                return status::failure(format!("failed to start command: {}", e));
            }
        };

        let mut output = Vec::new();
        let exit = stream_child_lines(child, |stream, line| {
            let line = line.trim_end();
            if line.trim().is_empty() {
                return;
            }
            if self.enable_log {
                match stream {
                    OutputStream::Stdout => logger.info(line),
                    OutputStream::Stderr => logger.warn(line),
                }
            }
            output.push(line.to_string());
        })
        .await;

        match exit {
            Ok(0) => status::with_fields(
                status::success("command succeeded"),
                json!({"returncode": 0, "output": output.join("\n")}),
            ),
            Ok(code) => status::with_fields(
                status::failure(format!("command failed with exit code {}", code)),
                json!({"returncode": code, "output": output.join("\n")}),
            ),
            Err(e) => {
                logger.error(format!("command error: {}", e));
                status::failure(format!("command error: {}", e))
            }
        }
    }
}
