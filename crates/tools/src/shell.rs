//! The `shell` tool — run a command through the OS shell with a timeout.

use serde::Deserialize;
use serde_json::Value;

use nextai_domain::error::{Error, Result};

use crate::registry::ItemResult;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const MAX_TIMEOUT_MS: u64 = 300_000;
const MAX_SUMMARY_CHARS: usize = 120;

#[derive(Debug, Deserialize)]
struct ShellItem {
    command: String,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub(crate) async fn run(item: &Value) -> Result<ItemResult> {
    let item: ShellItem = serde_json::from_value(item.clone())
        .map_err(|e| Error::InvalidToolInput(format!("invalid shell item: {e}")))?;

    let command = item.command.trim().to_owned();
    if command.is_empty() {
        return Err(Error::InvalidToolInput("shell command is empty".into()));
    }
    let timeout_ms = item
        .timeout_ms
        .unwrap_or(DEFAULT_TIMEOUT_MS)
        .clamp(1, MAX_TIMEOUT_MS);

    let mut cmd = tokio::process::Command::new("sh");
    cmd.arg("-c").arg(&command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(std::process::Stdio::null());
    cmd.kill_on_drop(true);

    let timeout = std::time::Duration::from_millis(timeout_ms);
    let started = std::time::Instant::now();

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(out)) => {
            let mut combined = String::from_utf8_lossy(&out.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&out.stderr));
            let exit_code = out.status.code();

            tracing::debug!(
                command = %command,
                exit_code,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "shell command finished"
            );

            Ok(ItemResult {
                ok: true,
                summary: summarize(&command, &combined),
                output: combined.clone(),
                raw: serde_json::json!({
                    "command": command,
                    "exit_code": exit_code,
                    "output": combined,
                }),
            })
        }
        Ok(Err(e)) => Ok(ItemResult {
            ok: false,
            summary: format!("shell <{command}> failed to spawn: {e}"),
            output: String::new(),
            raw: serde_json::json!({"command": command, "error": e.to_string()}),
        }),
        Err(_) => Ok(ItemResult {
            ok: false,
            summary: format!("shell <{command}> [timed out after {timeout_ms}ms]"),
            output: String::new(),
            raw: serde_json::json!({"command": command, "timed_out": true}),
        }),
    }
}

/// `shell <command> -> <first output line>`, truncated to one short line.
fn summarize(command: &str, output: &str) -> String {
    let first_line = output.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let mut summary = if first_line.is_empty() {
        format!("shell <{command}> -> (no output)")
    } else {
        format!("shell <{command}> -> {}", first_line.trim())
    };
    if summary.chars().count() > MAX_SUMMARY_CHARS {
        summary = summary.chars().take(MAX_SUMMARY_CHARS).collect::<String>() + "…";
    }
    summary
}
