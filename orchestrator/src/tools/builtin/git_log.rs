//! `git_log` - recent commit history via `git log --oneline`.

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct GitLogTool;

#[async_trait]
impl Tool for GitLogTool {
    fn name(&self) -> &str {
        "git_log"
    }

    fn description(&self) -> &str {
        "Show recent commit history."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "max_count": {"type": "integer", "description": "Maximum commits to show (default 20)"}
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let max_count = input["max_count"].as_u64().unwrap_or(20);

        let output = match Command::new("git")
            .args(["log", &format!("--max-count={max_count}"), "--oneline", "--decorate"])
            .current_dir(&ctx.worktree)
            .output()
            .await
        {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("failed to run git log: {e}")),
        };

        if !output.status.success() {
            return ToolResult::error(format!("git log failed: {}", String::from_utf8_lossy(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            ToolResult::ok("no commits")
        } else {
            ToolResult::ok(stdout.to_string())
        }
    }
}
