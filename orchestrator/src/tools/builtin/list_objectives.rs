//! `list_objectives` - list the objectives proposed so far in this quest.

use async_trait::async_trait;
use serde_json::Value;

use crate::tools::{Tool, ToolCategory, ToolContext, ToolResult};

pub struct ListObjectivesTool;

#[async_trait]
impl Tool for ListObjectivesTool {
    fn name(&self) -> &str {
        "list_objectives"
    }

    fn description(&self) -> &str {
        "List the objectives proposed so far in this quest, with their status."
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Read
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
        let Some(store) = &ctx.store else {
            return ToolResult::error("list_objectives requires a quest-scoped context");
        };
        let Some(quest_id) = &ctx.quest_id else {
            return ToolResult::error("list_objectives requires a quest-scoped context");
        };

        let objectives = match store.list_objectives_for_quest(quest_id).await {
            Ok(o) => o,
            Err(e) => return ToolResult::error(format!("failed to list objectives: {e}")),
        };

        if objectives.is_empty() {
            return ToolResult::ok("no objectives proposed yet");
        }

        let mut out = String::new();
        for obj in &objectives {
            out.push_str(&format!("{}  [{}]  {}\n", obj.id.0, obj.status, obj.title));
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
    async fn lists_proposed_objectives() {
        let store = Store::open_in_memory().await.unwrap();
        let project = store.create_project("p", "/repo").await.unwrap();
        let quest = store.create_quest(&project.id, ModelTier::Capable).await.unwrap();
        store
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

        let ctx = ToolContext::for_quest(PathBuf::from("/tmp"), project.id, quest.id, store, crate::tools::noop_gateway());
        let result = ListObjectivesTool.execute(serde_json::json!({}), &ctx).await;
        assert!(!result.is_error);
        assert!(result.output.contains("Add login"));
    }

    #[tokio::test]
    async fn reports_no_objectives() {
        let store = Store::open_in_memory().await.unwrap();
        let project = store.create_project("p", "/repo").await.unwrap();
        let quest = store.create_quest(&project.id, ModelTier::Capable).await.unwrap();
        let ctx = ToolContext::for_quest(PathBuf::from("/tmp"), project.id, quest.id, store, crate::tools::noop_gateway());
        let result = ListObjectivesTool.execute(serde_json::json!({}), &ctx).await;
        assert!(result.output.contains("no objectives"));
    }
}
