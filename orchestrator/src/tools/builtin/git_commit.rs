//! `git_commit` - stage and commit changes in the worktree.

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct GitCommitTool;

#[async_trait]
impl Tool for GitCommitTool {
    fn name(&self) -> &str {
        "git_commit"
    }

    fn description(&self) -> &str {
        "Stage all changes and create a commit with the given message."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Write
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "message": {"type": "string", "description": "Commit message"}
            },
            "required": ["message"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(message) = input["message"].as_str() else {
            return ToolResult::error("message is required");
        };
        if message.trim().is_empty() {
            return ToolResult::error("message must not be empty");
        }

        let add = match Command::new("git").args(["add", "-A"]).current_dir(&ctx.worktree).output().await {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("failed to run git add: {e}")),
        };
        if !add.status.success() {
            return ToolResult::error(format!("git add failed: {}", String::from_utf8_lossy(&add.stderr)));
        }

        let status = match Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(&ctx.worktree)
            .output()
            .await
        {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("failed to run git status: {e}")),
        };
        if String::from_utf8_lossy(&status.stdout).trim().is_empty() {
            return ToolResult::ok("nothing to commit, working tree clean");
        }

        let commit = match Command::new("git")
            .args(["commit", "-m", message])
            .current_dir(&ctx.worktree)
            .output()
            .await
        {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("failed to run git commit: {e}")),
        };

        if !commit.status.success() {
            return ToolResult::error(format!("git commit failed: {}", String::from_utf8_lossy(&commit.stderr)));
        }

        let rev = Command::new("git").args(["rev-parse", "--short", "HEAD"]).current_dir(&ctx.worktree).output().await;
        let sha = rev.ok().map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string()).unwrap_or_default();

        ToolResult::ok(format!("committed {sha}: {message}"))
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
    async fn commits_staged_changes() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        std::fs::write(temp.path().join("a.txt"), "hi").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = GitCommitTool.execute(serde_json::json!({"message": "add a.txt"}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains("add a.txt"));
    }

    #[tokio::test]
    async fn reports_nothing_to_commit_on_clean_tree() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = GitCommitTool.execute(serde_json::json!({"message": "noop"}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains("nothing to commit"));
    }

    #[tokio::test]
    async fn missing_message_is_an_error() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());
        let result = GitCommitTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
    }
}
