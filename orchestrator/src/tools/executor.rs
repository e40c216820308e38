//! `ToolExecutor` - the registry of tools available to a turn, scoped by profile.

use std::collections::HashMap;

use tracing::debug;

use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{
    AskQuestionTool, BashTool, CancelObjectiveTool, CompleteQuestTool, EditFileTool, GetObjectiveDetailsTool,
    GitCommitTool, GitDiffTool, GitLogTool, GitStatusTool, GlobTool, GrepTool, ListFilesTool, ListObjectivesTool,
    ProposeObjectiveTool, ReadFileTool, WebFetchTool, WebSearchTool, WriteFileTool,
};
use super::{Tool, ToolContext, ToolResult};

/// Which tool set a turn draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToolProfile {
    /// The QuestEngine's read-only exploration tools plus the blocking and
    /// objective-management tools. No filesystem writes, no `bash`.
    #[default]
    QuestEngine,
    /// The SessionLoop's full set: every read tool plus `write_file`,
    /// `edit_file`, `bash` and `git_commit`.
    SessionLoop,
}

/// Registry of tools available for a turn, keyed by their stable name.
pub struct ToolExecutor {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolExecutor {
    pub fn with_profile(profile: ToolProfile) -> Self {
        debug!(?profile, "ToolExecutor::with_profile: called");
        let mut executor = Self::empty();

        // Shared read/explore tools, present in both profiles.
        executor.add_tool(Box::new(ReadFileTool));
        executor.add_tool(Box::new(ListFilesTool));
        executor.add_tool(Box::new(GlobTool));
        executor.add_tool(Box::new(GrepTool));
        executor.add_tool(Box::new(GitStatusTool));
        executor.add_tool(Box::new(GitDiffTool));
        executor.add_tool(Box::new(GitLogTool));
        executor.add_tool(Box::new(WebSearchTool));
        executor.add_tool(Box::new(WebFetchTool));

        match profile {
            ToolProfile::QuestEngine => {
                executor.add_tool(Box::new(AskQuestionTool));
                executor.add_tool(Box::new(ProposeObjectiveTool));
                executor.add_tool(Box::new(CompleteQuestTool));
                executor.add_tool(Box::new(ListObjectivesTool));
                executor.add_tool(Box::new(GetObjectiveDetailsTool));
                executor.add_tool(Box::new(CancelObjectiveTool));
            }
            ToolProfile::SessionLoop => {
                executor.add_tool(Box::new(WriteFileTool));
                executor.add_tool(Box::new(EditFileTool));
                executor.add_tool(Box::new(BashTool));
                executor.add_tool(Box::new(GitCommitTool));
            }
        }

        executor
    }

    pub fn quest_engine() -> Self {
        Self::with_profile(ToolProfile::QuestEngine)
    }

    pub fn session_loop() -> Self {
        Self::with_profile(ToolProfile::SessionLoop)
    }

    /// Empty executor, for tests that add only the tools they need.
    pub fn empty() -> Self {
        debug!("ToolExecutor::empty: called");
        Self { tools: HashMap::new() }
    }

    pub fn add_tool(&mut self, tool: Box<dyn Tool>) {
        debug!(tool_name = %tool.name(), "ToolExecutor::add_tool: called");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    pub async fn execute(&self, tool_call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        debug!(tool_name = %tool_call.name, tool_id = %tool_call.id, "ToolExecutor::execute: called");
        let started = std::time::Instant::now();
        match self.tools.get(&tool_call.name) {
            Some(tool) => {
                let result = tool.execute(tool_call.input.clone(), ctx).await;
                result.with_duration(started.elapsed().as_millis() as u64)
            }
            None => ToolResult::error(format!("unknown tool: {}", tool_call.name)),
        }
    }

    pub async fn execute_all(&self, tool_calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult)> {
        let mut results = Vec::with_capacity(tool_calls.len());
        for call in tool_calls {
            let result = self.execute(call, ctx).await;
            results.push((call.id.clone(), result));
        }
        results
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::with_profile(ToolProfile::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn quest_engine_profile_excludes_writes() {
        let executor = ToolExecutor::quest_engine();
        assert!(executor.has_tool("read_file"));
        assert!(executor.has_tool("ask_question"));
        assert!(executor.has_tool("complete_quest"));
        assert!(!executor.has_tool("write_file"));
        assert!(!executor.has_tool("bash"));
    }

    #[test]
    fn session_loop_profile_includes_writes_not_blocking_tools() {
        let executor = ToolExecutor::session_loop();
        assert!(executor.has_tool("write_file"));
        assert!(executor.has_tool("edit_file"));
        assert!(executor.has_tool("bash"));
        assert!(executor.has_tool("git_commit"));
        assert!(!executor.has_tool("ask_question"));
        assert!(!executor.has_tool("complete_quest"));
    }

    #[test]
    fn definitions_cover_every_registered_tool() {
        let executor = ToolExecutor::session_loop();
        let defs = executor.definitions();
        assert_eq!(defs.len(), executor.tool_names().len());
        assert!(defs.iter().any(|d| d.name == "read_file"));
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let executor = ToolExecutor::session_loop();
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test".to_string());

        let call = ToolCall { id: "call_1".to_string(), name: "unknown_tool".to_string(), input: serde_json::json!({}) };

        let result = executor.execute(&call, &ctx).await;
        assert!(result.is_error);
        assert!(result.output.contains("unknown tool"));
    }
}
