//! `git_status` - report working tree status via `git status --porcelain`.

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct GitStatusTool;

#[async_trait]
impl Tool for GitStatusTool {
    fn name(&self) -> &str {
        "git_status"
    }

    fn description(&self) -> &str {
        "Show the working tree status (modified, added, deleted, untracked files)."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        let output = match Command::new("git")
            .args(["status", "--porcelain=v1"])
            .current_dir(&ctx.worktree)
            .output()
            .await
        {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("failed to run git status: {e}")),
        };

        if !output.status.success() {
            return ToolResult::error(format!("git status failed: {}", String::from_utf8_lossy(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            ToolResult::ok("working tree clean")
        } else {
            ToolResult::ok(stdout.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::process::Command as TokioCommand;

    async fn init_repo(path: &std::path::Path) {
        TokioCommand::new("git").args(["init", "-q"]).current_dir(path).output().await.unwrap();
        TokioCommand::new("git")
            .args(["config", "user.email", "t@example.com"])
            .current_dir(path)
            .output()
            .await
            .unwrap();
        TokioCommand::new("git").args(["config", "user.name", "t"]).current_dir(path).output().await.unwrap();
    }

    #[tokio::test]
    async fn reports_clean_tree() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = GitStatusTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains("clean"));
    }

    #[tokio::test]
    async fn reports_untracked_file() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        std::fs::write(temp.path().join("new.txt"), "hi").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = GitStatusTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.output.contains("new.txt"));
    }
}
