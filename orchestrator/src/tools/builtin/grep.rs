//! `grep` - search files by shelling out to ripgrep.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct GrepTool;

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search for patterns in files using ripgrep. Returns matching lines with context."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string", "description": "Regex pattern to search for"},
                "path": {"type": "string", "description": "Path to search in, default '.'"},
                "file_pattern": {"type": "string", "description": "Glob filter, e.g. '*.rs'"},
                "context_lines": {"type": "integer", "description": "Context lines before/after a match (default 2)"},
                "case_insensitive": {"type": "boolean", "description": "Case-insensitive search (default false)"},
                "max_results": {"type": "integer", "description": "Maximum matches to return (default 50)"}
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(pattern) = input.get("pattern").and_then(|v| v.as_str()) else {
            return ToolResult::error("pattern is required");
        };
        let path = input.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let file_pattern = input.get("file_pattern").and_then(|v| v.as_str());
        let context_lines = input.get("context_lines").and_then(|v| v.as_u64()).unwrap_or(2);
        let case_insensitive = input.get("case_insensitive").and_then(|v| v.as_bool()).unwrap_or(false);
        let max_results = input.get("max_results").and_then(|v| v.as_u64()).unwrap_or(50) as usize;

        let search_path = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("invalid path: {e}")),
        };

        let rg_check = Command::new("which").arg("rg").output().await;
        if rg_check.is_err() || !rg_check.unwrap().status.success() {
            return ToolResult::error("ripgrep (rg) not found on PATH");
        }

        let mut cmd = Command::new("rg");
        cmd.arg("--line-number").arg("--no-heading").arg("--color=never");
        if context_lines > 0 {
            cmd.arg(format!("-C{context_lines}"));
        }
        if case_insensitive {
            cmd.arg("-i");
        }
        cmd.arg(format!("--max-count={max_results}"));
        if let Some(fp) = file_pattern {
            cmd.arg("--glob").arg(fp);
        }
        cmd.arg(pattern).arg(&search_path);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).current_dir(&ctx.worktree);

        let output = match cmd.output().await {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("failed to execute ripgrep: {e}")),
        };

        match output.status.code() {
            Some(0) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                ToolResult::ok(truncate_output(&stdout, max_results))
            }
            Some(1) => ToolResult::ok("No matches found."),
            _ => ToolResult::error(format!("ripgrep error: {}", String::from_utf8_lossy(&output.stderr))),
        }
    }
}

fn truncate_output(output: &str, max_results: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    let mut match_count = 0;
    let mut include_until = lines.len();

    for (i, line) in lines.iter().enumerate() {
        if line.contains(':') && !line.starts_with('-') {
            match_count += 1;
            if match_count >= max_results {
                include_until = (i + 5).min(lines.len());
                break;
            }
        }
    }

    let result = lines[..include_until].join("\n");
    if include_until < lines.len() {
        format!("{result}\n\n... (truncated, {max_results} matches shown)")
    } else {
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_after_max_matches() {
        let output = "file.rs:1:match1\nfile.rs:2:match2\nfile.rs:3:match3";
        let truncated = truncate_output(output, 2);
        assert!(truncated.contains("match1"));
        assert!(truncated.contains("match2"));
    }
}
