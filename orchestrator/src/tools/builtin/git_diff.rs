//! `git_diff` - show unstaged or staged changes via `git diff`.

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show changes in the working tree. Pass staged=true to see staged changes."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "staged": {"type": "boolean", "description": "Show staged (index) diff instead of working tree diff"},
                "path": {"type": "string", "description": "Limit diff to this path"}
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let staged = input["staged"].as_bool().unwrap_or(false);
        let mut args = vec!["diff".to_string()];
        if staged {
            args.push("--cached".to_string());
        }
        if let Some(path) = input["path"].as_str() {
            args.push("--".to_string());
            args.push(path.to_string());
        }

        let output = match Command::new("git").args(&args).current_dir(&ctx.worktree).output().await {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("failed to run git diff: {e}")),
        };

        if !output.status.success() {
            return ToolResult::error(format!("git diff failed: {}", String::from_utf8_lossy(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            ToolResult::ok("no changes")
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
    async fn reports_no_changes_on_clean_tree() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = GitDiffTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains("no changes"));
    }

    #[tokio::test]
    async fn shows_unstaged_modification() {
        let temp = tempdir().unwrap();
        init_repo(temp.path()).await;
        std::fs::write(temp.path().join("a.txt"), "one\n").unwrap();
        TokioCommand::new("git").args(["add", "."]).current_dir(temp.path()).output().await.unwrap();
        TokioCommand::new("git")
            .args(["commit", "-q", "-m", "init"])
            .current_dir(temp.path())
            .output()
            .await
            .unwrap();
        std::fs::write(temp.path().join("a.txt"), "two\n").unwrap();

        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());
        let result = GitDiffTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.output.contains("-one"));
        assert!(result.output.contains("+two"));
    }
}
