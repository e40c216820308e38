//! `read_file` - read a file's contents with line numbers.

use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file's contents with line numbers. Required before editing."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to the workspace root"},
                "offset": {"type": "integer", "description": "Line number to start reading from (1-indexed)"},
                "limit": {"type": "integer", "description": "Max lines to read (default: 2000)"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(path) = input["path"].as_str() else {
            return ToolResult::error("path is required");
        };
        let offset = input["offset"].as_u64().unwrap_or(1) as usize;
        let limit = input["limit"].as_u64().unwrap_or(2000) as usize;

        let full_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let content = match tokio::fs::read_to_string(&full_path).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to read file: {e}")),
        };

        ctx.track_read(&full_path).await;

        let lines: Vec<String> = content
            .lines()
            .skip(offset.saturating_sub(1))
            .take(limit)
            .enumerate()
            .map(|(i, line)| {
                let line_num = offset + i;
                let truncated = if line.len() > 2000 { &line[..2000] } else { line };
                format!("{line_num:>6}│{truncated}")
            })
            .collect();

        ToolResult::ok(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reads_with_line_numbers() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "line 1\nline 2\nline 3").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = ReadFileTool.execute(serde_json::json!({"path": "test.txt"}), &ctx).await;

        assert!(!result.is_error);
        assert!(result.output.contains("line 1"));
        assert!(result.output.contains("line 3"));
    }

    #[tokio::test]
    async fn offset_skips_leading_lines() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "line 1\nline 2\nline 3").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = ReadFileTool
            .execute(serde_json::json!({"path": "test.txt", "offset": 2}), &ctx)
            .await;

        assert!(!result.output.contains("│line 1"));
        assert!(result.output.contains("line 2"));
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        let result = ReadFileTool.execute(serde_json::json!({"path": "nope.txt"}), &ctx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn tracks_read_for_later_edit_validation() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("test.txt"), "content").unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".into());

        ReadFileTool.execute(serde_json::json!({"path": "test.txt"}), &ctx).await;
        assert!(ctx.was_read(Path::new("test.txt")).await);
    }
}
