//! Bounded shell execution. Exposed as a tool only when the operator has
//! opted in via `TOOLS_SHELL_ENABLED`.

use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

const DEFAULT_TIMEOUT_SEC: u64 = 60;
const MAX_OUTPUT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct ShellRequest {
    pub command: String,
    /// Hard timeout in seconds.
    pub timeout_sec: Option<u64>,
}

/// Run a command in the foreground and wait for it (up to the timeout).
pub async fn run_command(req: ShellRequest) -> Result<Value, String> {
    let timeout_sec = req.timeout_sec.unwrap_or(DEFAULT_TIMEOUT_SEC);

    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(&req.command);
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let child = cmd.spawn().map_err(|e| format!("failed to spawn command: {e}"))?;

    let output = tokio::time::timeout(
        std::time::Duration::from_secs(timeout_sec),
        child.wait_with_output(),
    )
    .await
    .map_err(|_| format!("command timed out after {timeout_sec}s"))?
    .map_err(|e| format!("command failed: {e}"))?;

    Ok(serde_json::json!({
        "exit_code": output.status.code(),
        "stdout": truncate(&String::from_utf8_lossy(&output.stdout)),
        "stderr": truncate(&String::from_utf8_lossy(&output.stderr)),
    }))
}

fn truncate(s: &str) -> String {
    if s.len() <= MAX_OUTPUT_BYTES {
        return s.to_string();
    }
    let mut end = MAX_OUTPUT_BYTES;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n[output truncated]", &s[..end])
}
