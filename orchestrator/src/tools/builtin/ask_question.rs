//! `ask_question` - suspend the quest turn and ask the user a question.

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct AskQuestionTool;

#[async_trait]
impl Tool for AskQuestionTool {
    fn name(&self) -> &str {
        "ask_question"
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question and wait for their answer."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Blocking
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "question": {"type": "string", "description": "Question to ask the user"},
                "options": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Optional suggested answers"
                }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(question) = input["question"].as_str() else {
            return ToolResult::error("question is required");
        };
        let options = input["options"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect::<Vec<_>>());

        let Some(gateway) = &ctx.blocking else {
            return ToolResult::error("ask_question requires a quest-scoped context");
        };

        match gateway.ask_question(question, options).await {
            Ok(answer) => ToolResult::ok(answer),
            Err(e) => ToolResult::error(format!("failed to get an answer: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::BlockingGateway;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct FixedAnswer(&'static str);

    #[async_trait]
    impl BlockingGateway for FixedAnswer {
        async fn ask_question(&self, _question: &str, _options: Option<Vec<String>>) -> eyre::Result<String> {
            Ok(self.0.to_string())
        }

        async fn propose_objective(&self, _draft_json: Value) -> eyre::Result<String> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn returns_the_gateway_answer() {
        let ctx = ToolContext::new(PathBuf::from("/tmp"), "test".into())
            .with_blocking_gateway(Arc::new(FixedAnswer("sqlite")));
        let result = AskQuestionTool.execute(serde_json::json!({"question": "which db?"}), &ctx).await;
        assert!(!result.is_error);
        assert_eq!(result.output, "sqlite");
    }

    #[tokio::test]
    async fn missing_question_is_an_error() {
        let ctx = ToolContext::new(PathBuf::from("/tmp"), "test".into());
        let result = AskQuestionTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn requires_blocking_gateway() {
        let ctx = ToolContext::new(PathBuf::from("/tmp"), "test".into());
        let result = AskQuestionTool.execute(serde_json::json!({"question": "q?"}), &ctx).await;
        assert!(result.is_error);
    }
}
