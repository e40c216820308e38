//! The `Tool` trait and its result type.

use async_trait::async_trait;
use serde_json::Value;

use super::ToolContext;

/// Governs per-call deadline and whether path arguments are sandbox-confined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    Read,
    Write,
    Blocking,
    Remote,
}

impl ToolCategory {
    /// Per-tool-call timeout; `web_fetch` overrides this with its own 60s.
    pub fn deadline_secs(self) -> u64 {
        match self {
            Self::Read | Self::Write => 30,
            Self::Remote => 60,
            // Blocking tools wait on a human; the deadline lives on the
            // quest turn's cancellation token, not here.
            Self::Blocking => u64::MAX,
        }
    }
}

/// Output of a single tool invocation.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub is_error: bool,
    pub duration_ms: u64,
}

/// Output truncation limit before a result is handed back to the model.
pub const MAX_OUTPUT_BYTES: usize = 100 * 1024;
/// Separate, tighter cap applied to the copy broadcast on the event bus.
pub const MAX_BROADCAST_BYTES: usize = 1024;

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            output: truncate(output.into(), MAX_OUTPUT_BYTES),
            is_error: false,
            duration_ms: 0,
        }
    }

    pub fn error(output: impl Into<String>) -> Self {
        Self {
            output: truncate(output.into(), MAX_OUTPUT_BYTES),
            is_error: true,
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn broadcast_output(&self) -> &str {
        let limit = MAX_BROADCAST_BYTES.min(self.output.len());
        &self.output[..limit]
    }
}

fn truncate(s: String, limit: usize) -> String {
    if s.len() <= limit {
        return s;
    }
    let mut end = limit;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n...[truncated]", &s[..end])
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn input_schema(&self) -> Value;
    fn category(&self) -> ToolCategory;
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}
