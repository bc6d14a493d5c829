//! Process utilities for child process management.

use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};

#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;

fn exit_status_code_parts(code: Option<i32>, _signal: Option<i32>) -> Option<i32> {
    if let Some(code) = code {
        return Some(code);
    }
    #[cfg(unix)]
    {
        if let Some(signal) = _signal {
            return Some(128 + signal);
        }
    }
    None
}

/// Extract exit code from ExitStatus, using 128+signal for signal-terminated processes on Unix.
pub fn exit_status_code(status: &std::process::ExitStatus) -> Option<i32> {
    let code = status.code();
    #[cfg(unix)]
    let signal = status.signal();
    #[cfg(not(unix))]
    let signal = None;
    exit_status_code_parts(code, signal)
}

/// Attempt to capture the exit code from a child process.
/// Tries non-blocking first, falls back to blocking wait if process hasn't exited.
pub async fn capture_exit_code(child: &mut Child) -> Option<i32> {
    match child.try_wait() {
        Ok(Some(status)) => exit_status_code(&status),
        Ok(None) => child
            .wait()
            .await
            .ok()
            .and_then(|status| exit_status_code(&status)),
        Err(_) => None,
    }
}

/// Stream types for child processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Errors occurring while running a child process.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {stream} of child process: {source}")]
    Read {
        stream: OutputStream,
        #[source]
        source: std::io::Error,
        /// The exit code of the process if it has already exited.
        exit_code: Option<i32>,
    },

    #[error("failed to wait for child process: {source}")]
    Wait {
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stdout and stderr joined, trimmed
    pub fn combined(&self) -> String {
        let stdout = self.stdout.trim_end();
        let stderr = self.stderr.trim_end();
        match (stdout.is_empty(), stderr.is_empty()) {
            (true, _) => stderr.to_string(),
            (false, true) => stdout.to_string(),
            (false, false) => format!("{}\n{}", stdout, stderr),
        }
    }
}

/// Build a command that runs `cmd` through the platform shell
pub fn shell_command(cmd: &str) -> Command {
    #[cfg(unix)]
    {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        command
    }
    #[cfg(not(unix))]
    {
        let mut command = Command::new("cmd");
        command.arg("/C").arg(cmd);
        command
    }
}

/// Quote one argument for inclusion in a shell command line
pub fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if plain {
        return arg.to_string();
    }

    #[cfg(unix)]
    {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
    #[cfg(not(unix))]
    {
        format!("\"{}\"", arg.replace('"', "\"\""))
    }
}

/// Wait for child output, reading stdout/stderr concurrently to avoid deadlock.
pub async fn wait_for_child_output(
    child: &mut Child,
) -> Result<(String, String, std::process::ExitStatus), ProcessError> {
    let stdout_pipe = child.stdout.take();
    let stderr_pipe = child.stderr.take();

    let stdout_fut = async move {
        if let Some(mut out) = stdout_pipe {
            let mut buf = String::new();
            out.read_to_string(&mut buf)
                .await
                .map(|_| buf)
                .map_err(|e| (OutputStream::Stdout, e))
        } else {
            Ok(String::new())
        }
    };

    let stderr_fut = async move {
        if let Some(mut err) = stderr_pipe {
            let mut buf = String::new();
            err.read_to_string(&mut buf)
                .await
                .map(|_| buf)
                .map_err(|e| (OutputStream::Stderr, e))
        } else {
            Ok(String::new())
        }
    };

    let (stdout, stderr) = match tokio::try_join!(stdout_fut, stderr_fut) {
        Ok(result) => result,
        Err((stream, e)) => {
            let _ = child.kill().await;
            let exit_code = capture_exit_code(child).await;
            return Err(ProcessError::Read {
                stream,
                source: e,
                exit_code,
            });
        }
    };

    let status = child
        .wait()
        .await
        .map_err(|e| ProcessError::Wait { source: e })?;

    Ok((stdout, stderr, status))
}

/// Run `program` with `args` and capture its output
pub async fn run_captured(
    program: &str,
    args: &[&str],
    cwd: Option<&Path>,
) -> Result<CommandOutput, ProcessError> {
    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }

    tracing::debug!(program, ?args, cwd = ?cwd, "running command");

    let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
        program: program.to_string(),
        source,
    })?;
    let (stdout, stderr, status) = wait_for_child_output(&mut child).await?;

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code: exit_status_code(&status),
    })
}

/// Read the child's stdout and stderr line by line until both close, then
/// wait for it. Each line is passed to `on_line` as it arrives.
///
/// Invalid UTF-8 is replaced rather than treated as an error.
pub async fn stream_child_lines<F>(mut child: Child, mut on_line: F) -> Result<i32, ProcessError>
where
    F: FnMut(OutputStream, &str),
{
    let mut stdout = child.stdout.take().map(|s| BufReader::new(s).split(b'\n'));
    let mut stderr = child.stderr.take().map(|s| BufReader::new(s).split(b'\n'));

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            line = next_segment(&mut stdout), if stdout.is_some() => {
                match line {
                    Ok(Some(bytes)) => on_line(OutputStream::Stdout, &trim_line(&bytes)),
                    Ok(None) => stdout = None,
                    Err(source) => return Err(read_error(&mut child, OutputStream::Stdout, source).await),
                }
            }
            line = next_segment(&mut stderr), if stderr.is_some() => {
                match line {
                    Ok(Some(bytes)) => on_line(OutputStream::Stderr, &trim_line(&bytes)),
                    Ok(None) => stderr = None,
                    Err(source) => return Err(read_error(&mut child, OutputStream::Stderr, source).await),
                }
            }
        }
    }

    let status = child
        .wait()
        .await
        .map_err(|source| ProcessError::Wait { source })?;
    Ok(exit_status_code(&status).unwrap_or(-1))
}

async fn next_segment<R>(
    reader: &mut Option<tokio::io::Split<BufReader<R>>>,
) -> std::io::Result<Option<Vec<u8>>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match reader {
        Some(split) => split.next_segment().await,
        None => Ok(None),
    }
}

fn trim_line(bytes: &[u8]) -> std::borrow::Cow<'_, str> {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

async fn read_error(child: &mut Child, stream: OutputStream, source: std::io::Error) -> ProcessError {
    let _ = child.kill().await;
    let exit_code = capture_exit_code(child).await;
    ProcessError::Read {
        stream,
        source,
        exit_code,
    }
}
