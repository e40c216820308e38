//! `write_file` - write content to a file, creating parent directories.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file. Creates parent directories if needed."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Write
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to the worktree"},
                "content": {"type": "string", "description": "Content to write"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(path) = input["path"].as_str() else {
            return ToolResult::error("path is required");
        };
        let Some(content) = input["content"].as_str() else {
            return ToolResult::error("content is required");
        };

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        if let Some(parent) = full_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::error(format!("failed to create directories: {e}"));
            }
        }

        if let Err(e) = tokio::fs::write(&full_path, content).await {
            return ToolResult::error(format!("failed to write file: {e}"));
        }

        ctx.track_read(&full_path).await;
        ToolResult::ok(format!("wrote {} bytes to {path}", content.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_and_creates_parent_dirs() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = WriteFileTool
            .execute(serde_json::json!({"path": "nested/dir/test.txt", "content": "hello"}), &ctx)
            .await;

        assert!(!result.is_error);
        assert_eq!(fs::read_to_string(temp.path().join("nested/dir/test.txt")).unwrap(), "hello");
    }

    #[tokio::test]
    async fn overwrites_existing_file() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "old").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        WriteFileTool
            .execute(serde_json::json!({"path": "test.txt", "content": "new"}), &ctx)
            .await;

        assert_eq!(fs::read_to_string(temp.path().join("test.txt")).unwrap(), "new");
    }

    #[tokio::test]
    async fn missing_content_is_an_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());
        let result = WriteFileTool.execute(serde_json::json!({"path": "test.txt"}), &ctx).await;
        assert!(result.is_error);
    }
}
