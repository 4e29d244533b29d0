//! Command item execution.
//!
//! Renders the configured command template, spawns it with a wall-clock
//! budget, and maps the exit status to a check outcome. The child inherits
//! a minimal environment (`PATH` only) so cluster credentials present in
//! the server's environment cannot leak into user-supplied commands.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::item::CommandConfig;
use crate::status::CheckStatus;

use super::CheckOutcome;

/// Placeholder substituted with the transient kubeconfig path.
pub const KUBECONFIG_PLACEHOLDER: &str = "{{kubeconfig}}";

/// How much combined output is kept as failure detail.
const OUTPUT_TAIL_BYTES: usize = 2048;

/// Maximum bytes read per output stream (guards runaway commands).
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Raw result of running one command.
#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of a bounded command execution.
#[derive(Debug)]
pub enum CommandRun {
    Completed(CommandOutput),
    TimedOut,
    SpawnFailed(std::io::Error),
}

/// Render a command template, substituting the kubeconfig placeholder.
pub fn render_template(template: &str, kubeconfig: Option<&Path>) -> String {
    match kubeconfig {
        Some(path) => template.replace(KUBECONFIG_PLACEHOLDER, &path.to_string_lossy()),
        None => template.to_string(),
    }
}

/// Execute a rendered command with a wall-clock budget.
///
/// `shell = true` runs through `sh -c`; otherwise the command is split on
/// whitespace. The child is killed when the budget expires
/// (`kill_on_drop` covers the timeout path).
pub async fn run_command(rendered: &str, shell: bool, timeout: Duration) -> CommandRun {
    let mut cmd = if shell {
        let mut c = Command::new("sh");
        c.arg("-c").arg(rendered);
        c
    } else {
        let mut parts = rendered.split_whitespace();
        let Some(program) = parts.next() else {
            return CommandRun::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty command",
            ));
        };
        let mut c = Command::new(program);
        c.args(parts);
        c
    };

    cmd.env_clear()
        .env(
            "PATH",
            std::env::var("PATH").unwrap_or_else(|_| "/usr/local/bin:/usr/bin:/bin".into()),
        )
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return CommandRun::SpawnFailed(e),
    };

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            CommandRun::Completed(CommandOutput {
                exit_code: status.code().unwrap_or(-1),
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            })
        }
        Ok(Err(e)) => CommandRun::SpawnFailed(e),
        Err(_elapsed) => {
            // `child` is dropped here; kill_on_drop terminates the process.
            CommandRun::TimedOut
        }
    }
}

/// Evaluate a `command` item configuration.
pub async fn evaluate_command(cfg: &CommandConfig, kubeconfig: Option<&Path>) -> CheckOutcome {
    let rendered = render_template(&cfg.command, kubeconfig);
    let timeout = Duration::from_secs(cfg.timeout_secs.max(1));

    match run_command(&rendered, cfg.shell, timeout).await {
        CommandRun::Completed(output) if output.exit_code == 0 => {
            let detail = cfg
                .success_message
                .clone()
                .or_else(|| non_empty(tail(&output.stdout, OUTPUT_TAIL_BYTES)))
                .unwrap_or_else(|| "command exited 0".to_string());
            CheckOutcome::new(
                CheckStatus::Passed,
                Some(detail),
                cfg.suggestion_on_success.clone(),
            )
        }
        CommandRun::Completed(output) => {
            let combined = format!("{}\n{}", output.stdout, output.stderr);
            let detail = non_empty(tail(&combined, OUTPUT_TAIL_BYTES))
                .or_else(|| cfg.failure_message.clone())
                .unwrap_or_else(|| format!("command exited {}", output.exit_code));
            CheckOutcome::new(
                CheckStatus::Failed,
                Some(detail),
                cfg.suggestion_on_fail.clone(),
            )
        }
        CommandRun::TimedOut => CheckOutcome::new(
            CheckStatus::Failed,
            Some(format!("command timed out after {}s", cfg.timeout_secs)),
            cfg.suggestion_on_fail.clone(),
        ),
        CommandRun::SpawnFailed(e) => CheckOutcome::new(
            CheckStatus::Failed,
            Some(format!("command execution error: {e}")),
            cfg.suggestion_on_fail.clone(),
        ),
    }
}

/// Last `max` bytes of `text`, aligned to a character boundary.
pub fn tail(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..].to_string()
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
