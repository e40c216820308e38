//! `get_objective_details` - show full detail and checklist for one objective.

use async_trait::async_trait;
use serde_json::Value;
use store::ObjectiveId;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct GetObjectiveDetailsTool;

#[async_trait]
impl Tool for GetObjectiveDetailsTool {
    fn name(&self) -> &str {
        "get_objective_details"
    }

    fn description(&self) -> &str {
        "Show the full description, status and checklist for one objective."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "objective_id": {"type": "string", "description": "Objective id"}
            },
            "required": ["objective_id"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(objective_id) = input["objective_id"].as_str() else {
            return ToolResult::error("objective_id is required");
        };

        let Some(store) = &ctx.store else {
            return ToolResult::error("get_objective_details requires a quest-scoped context");
        };

        let id = ObjectiveId::from(objective_id.to_string());
        let objective = match store.get_objective(&id).await {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("objective not found: {e}")),
        };

        let checklist = match store.list_checklist(&id).await {
            Ok(c) => c,
            Err(e) => return ToolResult::error(format!("failed to load checklist: {e}")),
        };

        let mut out = format!(
            "{}\nstatus: {}\nrole: {:?}\npriority: {}\n\n{}\n",
            objective.title,
            objective.status,
            objective.role,
            objective.priority.get(),
            objective.description
        );

        if !checklist.is_empty() {
            out.push_str("\nchecklist:\n");
            for item in &checklist {
                let mark = if item.must_have { "*" } else { "-" };
                out.push_str(&format!("  {mark} [{:?}] {}\n", item.status, item.description));
            }
        }

        ToolResult::ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use store::{ModelTier, Priority, Role, Store};

    #[tokio::test]
    async fn returns_objective_with_checklist() {
        let store = Store::open_in_memory().await.unwrap();
        let project = store.create_project("p", "/repo").await.unwrap();
        let quest = store.create_quest(&project.id, ModelTier::Capable).await.unwrap();
        let objective = store
            .create_objective(
                &project.id,
                Some(&quest.id),
                "Add login",
                "implement login flow",
                Role::Creator,
                Priority::default(),
                ModelTier::Capable,
                "main",
                &[("write tests".to_string(), true)],
            )
            .await
            .unwrap();

        let ctx =
            ToolContext::for_quest(PathBuf::from("/tmp"), project.id, quest.id, store, crate::tools::noop_gateway());
        let result = GetObjectiveDetailsTool
            .execute(serde_json::json!({"objective_id": objective.id.0}), &ctx)
            .await;
        assert!(!result.is_error);
        assert!(result.output.contains("Add login"));
        assert!(result.output.contains("write tests"));
    }

    #[tokio::test]
    async fn missing_objective_id_is_an_error() {
        let store = Store::open_in_memory().await.unwrap();
        let project = store.create_project("p", "/repo").await.unwrap();
        let quest = store.create_quest(&project.id, ModelTier::Capable).await.unwrap();
        let ctx = ToolContext::for_quest(PathBuf::from("/tmp"), project.id, quest.id, store, crate::tools::noop_gateway());
        let result = GetObjectiveDetailsTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.is_error);
    }
}
