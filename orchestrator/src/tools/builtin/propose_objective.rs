//! `propose_objective` - suspend the quest turn and propose an objective draft for approval.

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct ProposeObjectiveTool;

#[async_trait]
impl Tool for ProposeObjectiveTool {
    fn name(&self) -> &str {
        "propose_objective"
    }

    fn description(&self) -> &str {
        "Propose an objective draft to the user for approval before it is created."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Blocking
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "description": {"type": "string"},
                "role": {"type": "string"},
                "priority": {"type": "integer"},
                "checklist": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Must-have checklist items"
                }
            },
            "required": ["title", "description", "role"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        if input["title"].as_str().is_none() {
            return ToolResult::error("title is required");
        }
        if input["description"].as_str().is_none() {
            return ToolResult::error("description is required");
        }
        if input["role"].as_str().is_none() {
            return ToolResult::error("role is required");
        }

        let Some(gateway) = &ctx.blocking else {
            return ToolResult::error("propose_objective requires a quest-scoped context");
        };

        match gateway.propose_objective(input).await {
            Ok(response) => ToolResult::ok(response),
            Err(e) => ToolResult::error(format!("failed to get a response: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::BlockingGateway;
    use std::path::PathBuf;
    use std::sync::Arc;

    struct FixedResponse(&'static str);

    #[async_trait]
    impl BlockingGateway for FixedResponse {
        async fn ask_question(&self, _question: &str, _options: Option<Vec<String>>) -> eyre::Result<String> {
            Ok(String::new())
        }

        async fn propose_objective(&self, _draft_json: Value) -> eyre::Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn returns_gateway_response() {
        let ctx = ToolContext::new(PathBuf::from("/tmp"), "test".into())
            .with_blocking_gateway(Arc::new(FixedResponse("accepted")));
        let result = ProposeObjectiveTool
            .execute(
                serde_json::json!({"title": "Add login", "description": "desc", "role": "creator"}),
                &ctx,
            )
            .await;
        assert!(!result.is_error);
        assert_eq!(result.output, "accepted");
    }

    #[tokio::test]
    async fn missing_title_is_an_error() {
        let ctx = ToolContext::new(PathBuf::from("/tmp"), "test".into());
        let result =
            ProposeObjectiveTool.execute(serde_json::json!({"description": "d", "role": "creator"}), &ctx).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn requires_blocking_gateway() {
        let ctx = ToolContext::new(PathBuf::from("/tmp"), "test".into());
        let result = ProposeObjectiveTool
            .execute(
                serde_json::json!({"title": "t", "description": "d", "role": "creator"}),
                &ctx,
            )
            .await;
        assert!(result.is_error);
    }
}
