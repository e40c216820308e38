//! `web_search` - query a configured web search provider.

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

enum Provider {
    Tavily(String),
    Brave(String),
    SerpApi(String),
}

impl Provider {
    fn from_env() -> Option<Self> {
        if let Ok(key) = std::env::var("TAVILY_API_KEY") {
            return Some(Provider::Tavily(key));
        }
        if let Ok(key) = std::env::var("BRAVE_API_KEY") {
            return Some(Provider::Brave(key));
        }
        if let Ok(key) = std::env::var("SERPAPI_KEY") {
            return Some(Provider::SerpApi(key));
        }
        None
    }
}

pub struct WebSearchTool;

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for a query and return a list of results."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Remote
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "max_results": {"type": "integer", "description": "Maximum results to return (default 5)"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
        let Some(query) = input["query"].as_str() else {
            return ToolResult::error("query is required");
        };
        let max_results = input["max_results"].as_u64().unwrap_or(5) as usize;

        let Some(provider) = Provider::from_env() else {
            return ToolResult::error(
                "no search provider configured (set TAVILY_API_KEY, BRAVE_API_KEY, or SERPAPI_KEY)",
            );
        };

        let client = match reqwest::Client::builder().timeout(std::time::Duration::from_secs(30)).build() {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to build http client: {e}")),
        };

        let result = match provider {
            Provider::Tavily(key) => search_tavily(&client, &key, query, max_results).await,
            Provider::Brave(key) => search_brave(&client, &key, query, max_results).await,
            Provider::SerpApi(key) => search_serpapi(&client, &key, query, max_results).await,
        };

        match result {
            Ok(text) => ToolResult::ok(text),
            Err(e) => ToolResult::error(e),
        }
    }
}

async fn search_tavily(client: &reqwest::Client, key: &str, query: &str, max_results: usize) -> Result<String, String> {
    let body = serde_json::json!({
        "api_key": key,
        "query": query,
        "max_results": max_results,
    });

    let response = client
        .post("https://api.tavily.com/search")
        .json(&body)
        .send()
        .await
        .map_err(|e| format!("tavily request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("tavily returned {}", response.status()));
    }

    let json: Value = response.json().await.map_err(|e| format!("failed to parse tavily response: {e}"))?;
    let results = json["results"].as_array().cloned().unwrap_or_default();
    if results.is_empty() {
        return Ok("no results found".to_string());
    }

    let mut out = String::new();
    for (i, r) in results.iter().take(max_results).enumerate() {
        let title = r["title"].as_str().unwrap_or("(untitled)");
        let url = r["url"].as_str().unwrap_or("");
        let content = truncate(r["content"].as_str().unwrap_or(""), 500);
        out.push_str(&format!("{}. {} ({})\n{}\n\n", i + 1, title, url, content));
    }
    Ok(out)
}

async fn search_brave(client: &reqwest::Client, key: &str, query: &str, max_results: usize) -> Result<String, String> {
    let response = client
        .get("https://api.search.brave.com/res/v1/web/search")
        .header("X-Subscription-Token", key)
        .query(&[("q", query), ("count", &max_results.to_string())])
        .send()
        .await
        .map_err(|e| format!("brave request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("brave returned {}", response.status()));
    }

    let json: Value = response.json().await.map_err(|e| format!("failed to parse brave response: {e}"))?;
    let results = json["web"]["results"].as_array().cloned().unwrap_or_default();
    if results.is_empty() {
        return Ok("no results found".to_string());
    }

    let mut out = String::new();
    for (i, r) in results.iter().take(max_results).enumerate() {
        let title = r["title"].as_str().unwrap_or("(untitled)");
        let url = r["url"].as_str().unwrap_or("");
        let description = truncate(r["description"].as_str().unwrap_or(""), 500);
        out.push_str(&format!("{}. {} ({})\n{}\n\n", i + 1, title, url, description));
    }
    Ok(out)
}

async fn search_serpapi(client: &reqwest::Client, key: &str, query: &str, max_results: usize) -> Result<String, String> {
    let response = client
        .get("https://serpapi.com/search")
        .query(&[("q", query), ("api_key", key), ("engine", "google")])
        .send()
        .await
        .map_err(|e| format!("serpapi request failed: {e}"))?;

    if !response.status().is_success() {
        return Err(format!("serpapi returned {}", response.status()));
    }

    let json: Value = response.json().await.map_err(|e| format!("failed to parse serpapi response: {e}"))?;
    let results = json["organic_results"].as_array().cloned().unwrap_or_default();
    if results.is_empty() {
        return Ok("no results found".to_string());
    }

    let mut out = String::new();
    for (i, r) in results.iter().take(max_results).enumerate() {
        let title = r["title"].as_str().unwrap_or("(untitled)");
        let link = r["link"].as_str().unwrap_or("");
        let snippet = truncate(r["snippet"].as_str().unwrap_or(""), 500);
        out.push_str(&format!("{}. {} ({})\n{}\n\n", i + 1, title, link, snippet));
    }
    Ok(out)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_query_is_an_error() {
        let ctx = ToolContext::new(std::env::temp_dir(), "test".into());
        let result = WebSearchTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo world";
        let truncated = truncate(s, 2);
        assert!(truncated.ends_with("..."));
    }
}
