//! `bash` - execute shell commands in the worktree.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

const MAX_OUTPUT_CHARS: usize = 30_000;

pub struct BashTool;

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command in the worktree. Use for builds, tests, package managers."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Blocking
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "Shell command to execute"},
                "timeout_ms": {"type": "integer", "description": "Timeout in milliseconds (default: 120000)"}
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(command) = input["command"].as_str() else {
            return ToolResult::error("command is required");
        };
        let timeout_ms = input["timeout_ms"].as_u64().unwrap_or(120_000);

        debug!(%command, %timeout_ms, "BashTool::execute: spawning command");
        let output = match tokio::time::timeout(
            Duration::from_millis(timeout_ms),
            tokio::process::Command::new("sh").arg("-c").arg(command).current_dir(&ctx.worktree).output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("failed to execute command: {e}")),
            Err(_) => return ToolResult::error(format!("command timed out after {timeout_ms}ms")),
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let result = if stdout.is_empty() && !stderr.is_empty() {
            stderr.to_string()
        } else if stderr.is_empty() {
            stdout.to_string()
        } else {
            format!("{stdout}\n\nSTDERR:\n{stderr}")
        };

        let truncated = if result.len() > MAX_OUTPUT_CHARS {
            let mut end = MAX_OUTPUT_CHARS;
            while !result.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...\n[truncated, {} chars total]", &result[..end], result.len())
        } else {
            result
        };

        if output.status.success() {
            ToolResult::ok(truncated)
        } else {
            ToolResult::error(format!("exit code: {}\n{}", output.status.code().unwrap_or(-1), truncated))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());
        let result = BashTool.execute(serde_json::json!({"command": "echo hello"}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains("hello"));
    }

    #[tokio::test]
    async fn runs_in_worktree_directory() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());
        let result = BashTool.execute(serde_json::json!({"command": "pwd"}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains(temp.path().to_str().unwrap()));
    }

    #[tokio::test]
    async fn nonzero_exit_is_an_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());
        let result = BashTool.execute(serde_json::json!({"command": "false"}), &ctx).await;
        assert!(result.is_error);
        assert!(result.output.contains("exit code: 1"));
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());
        let result = BashTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn captures_stderr() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());
        let result = BashTool.execute(serde_json::json!({"command": "echo error >&2"}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains("error"));
    }
}
