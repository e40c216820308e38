//! `cancel_objective` - withdraw an objective that is no longer wanted.

use async_trait::async_trait;
use serde_json::Value;
use store::{ObjectiveId, ObjectiveStatus};

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct CancelObjectiveTool;

#[async_trait]
impl Tool for CancelObjectiveTool {
    fn name(&self) -> &str {
        "cancel_objective"
    }

    fn description(&self) -> &str {
        "Cancel an objective that is no longer needed."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Blocking
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "objective_id": {"type": "string", "description": "Objective id to cancel"}
            },
            "required": ["objective_id"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(objective_id) = input["objective_id"].as_str() else {
            return ToolResult::error("objective_id is required");
        };

        let Some(store) = &ctx.store else {
            return ToolResult::error("cancel_objective requires a quest-scoped context");
        };

        let id = ObjectiveId::from(objective_id.to_string());
        match store.transition_objective(&id, ObjectiveStatus::Cancelled).await {
            Ok(objective) => ToolResult::ok(format!("cancelled objective {}", objective.title)),
            Err(e) => ToolResult::error(format!("failed to cancel objective: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use store::{ModelTier, Priority, Role, Store};

    #[tokio::test]
    async fn cancels_objective() {
        let store = Store::open_in_memory().await.unwrap();
        let project = store.create_project("p", "/repo").await.unwrap();
        let quest = store.create_quest(&project.id, ModelTier::Capable).await.unwrap();
        let objective = store
            .create_objective(
                &project.id,
                Some(&quest.id),
                "Add login",
                "desc",
                Role::Creator,
                Priority::default(),
                ModelTier::Capable,
                "main",
                &[],
            )
            .await
            .unwrap();

        let ctx = ToolContext::for_quest(PathBuf::from("/tmp"), project.id, quest.id, store.clone(), crate::tools::noop_gateway());
        let result = CancelObjectiveTool.execute(serde_json::json!({"objective_id": objective.id.0}), &ctx).await;
        assert!(!result.is_error);

        let updated = store.get_objective(&objective.id).await.unwrap();
        assert_eq!(updated.status, ObjectiveStatus::Cancelled);
    }

    #[tokio::test]
    async fn missing_objective_id_is_an_error() {
        let store = Store::open_in_memory().await.unwrap();
        let project = store.create_project("p", "/repo").await.unwrap();
        let quest = store.create_quest(&project.id, ModelTier::Capable).await.unwrap();
        let ctx = ToolContext::for_quest(PathBuf::from("/tmp"), project.id, quest.id, store, crate::tools::noop_gateway());
        let result = CancelObjectiveTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
    }
}
