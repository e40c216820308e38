//! `complete_quest` - mark the current planning conversation as finished.

use async_trait::async_trait;
use serde_json::Value;
use store::QuestStatus;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct CompleteQuestTool;

#[async_trait]
impl Tool for CompleteQuestTool {
    fn name(&self) -> &str {
        "complete_quest"
    }

    fn description(&self) -> &str {
        "Mark the current quest as completed. Use once the objectives discussed cover the user's request."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Blocking
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "summary": {"type": "string", "description": "Brief summary of what the quest accomplished"}
            },
            "required": ["summary"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(summary) = input["summary"].as_str() else {
            return ToolResult::error("summary is required");
        };

        let Some(store) = &ctx.store else {
            return ToolResult::error("complete_quest requires a quest-scoped context");
        };
        let Some(quest_id) = &ctx.quest_id else {
            return ToolResult::error("complete_quest requires a quest-scoped context");
        };

        match store.transition_quest(quest_id, QuestStatus::Completed).await {
            Ok(_) => ToolResult::ok(format!("quest completed: {summary}")),
            Err(e) => ToolResult::error(format!("failed to complete quest: {e}")),
        }
    }
}
