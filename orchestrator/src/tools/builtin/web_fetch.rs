//! `web_fetch` - fetch a URL and convert HTML content to markdown.

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

const MAX_BODY_BYTES: usize = 1_000_000;
const MAX_OUTPUT_CHARS: usize = 50_000;

pub struct WebFetchTool;

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch content from a URL. HTML is converted to markdown, JSON is pretty-printed."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Remote
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "URL to fetch"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(url) = input["url"].as_str() else {
            return ToolResult::error("url is required");
        };

        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::error("url must start with http:// or https://");
        }

        let client = match reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("orchestrator/0.1 (web_fetch tool)")
            .build()
        {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to build http client: {e}")),
        };

        let response = match client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("failed to fetch url: {e}")),
        };

        if !response.status().is_success() {
            return ToolResult::error(format!("http error: {}", response.status()));
        }

        let content_type =
            response.headers().get("content-type").and_then(|v| v.to_str().ok()).unwrap_or("").to_string();

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("failed to read response body: {e}")),
        };

        if body.len() > MAX_BODY_BYTES {
            return ToolResult::error("response too large (> 1MB)");
        }

        let content = if content_type.contains("text/html") || content_type.contains("application/xhtml") {
            html2md::rewrite_html(&body, false)
        } else if content_type.contains("application/json") {
            match serde_json::from_str::<Value>(&body) {
                Ok(json) => serde_json::to_string_pretty(&json).unwrap_or(body),
                Err(_) => body,
            }
        } else {
            body
        };

        if content.len() > MAX_OUTPUT_CHARS {
            let mut end = MAX_OUTPUT_CHARS;
            while !content.is_char_boundary(end) {
                end -= 1;
            }
            ToolResult::ok(format!("{}...\n\n[truncated, {} chars total]", &content[..end], content.len()))
        } else {
            ToolResult::ok(content)
        }
    }
}
