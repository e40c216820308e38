//! QuestEngine: the planning conversation. One turn per user message, a
//! bounded tool-use loop within the turn, ending in a persisted assistant
//! message plus whatever signals it carried.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use store::{MessageRole, ModelTier, Objective, Priority, ProjectId, QuestId, Role, Store};

use crate::events::{EventBus, quest_channel};
use crate::llm::{CompletionRequest, ContentBlock, LlmClient, Message as LlmMessage, StreamChunk, ToolCall};
use crate::tools::{BlockingGatewayRef, ToolContext, ToolExecutor};

use super::blocking::BlockingContext;
use super::draft::DraftRegistry;
use super::signals::{Signal, parse_signals};
use super::title::derive_title;

/// Tool-use round-trips allowed within a single quest turn before it is
/// forced to stop and return whatever text it has.
const MAX_TOOL_ITERATIONS: u32 = 10;

const PLANNING_SYSTEM_PROMPT: &str = r#"You are the planning assistant for a software project. Your job is to turn a
user's request into one or more concrete objectives a worker agent can execute unattended.

Ask clarifying questions with the ask_question tool when something material is ambiguous. Propose an objective for
approval with the propose_objective tool, or emit it directly as a signal once you are confident in it.

When you are ready to hand off an objective without asking for approval, include this exact marker in your reply,
with a balanced JSON object immediately after it:
OBJECTIVE_DRAFT:{"title": "...", "description": "...", "role": "explorer|planner|designer|creator|critic|editor|documenter|devops|resolver", "priority": 1-5, "checklist": ["..."], "blocked_by": ["ref-of-another-draft-this-turn"]}

To ask something without blocking on a tool call, you may instead emit:
QUESTION:{"question": "...", "options": ["...", "..."]}

Once every objective this quest needs has been drafted, emit:
QUEST_READY:{"drafts": [ ... ], "summary": "one sentence describing what will be built"}
"#;

pub struct QuestEngine {
    store: Store,
    bus: Arc<EventBus>,
    capable_llm: Arc<dyn LlmClient>,
    fast_llm: Arc<dyn LlmClient>,
    max_tokens: u32,
    blocking: Mutex<HashMap<String, Arc<BlockingContext>>>,
    drafts: DraftRegistry,
}

impl QuestEngine {
    pub fn new(store: Store, bus: Arc<EventBus>, capable_llm: Arc<dyn LlmClient>, fast_llm: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        Self { store, bus, capable_llm, fast_llm, max_tokens, blocking: Mutex::new(HashMap::new()), drafts: DraftRegistry::default() }
    }

    fn client_for(&self, tier: ModelTier) -> &Arc<dyn LlmClient> {
        match tier {
            ModelTier::Capable => &self.capable_llm,
            ModelTier::Fast => &self.fast_llm,
        }
    }

    /// Delivers `answer` to the single outstanding blocking tool call for
    /// `quest_id`, if one is waiting. Returns `false` otherwise.
    pub async fn deliver_answer(&self, quest_id: &QuestId, answer: String) -> bool {
        let ctx = self.blocking.lock().await.get(quest_id.as_str()).cloned();
        match ctx {
            Some(ctx) => ctx.deliver_answer(answer).await,
            None => false,
        }
    }

    /// Cancels the outstanding blocking call for `quest_id`, if any.
    pub async fn cancel(&self, quest_id: &QuestId) {
        if let Some(ctx) = self.blocking.lock().await.get(quest_id.as_str()).cloned() {
            ctx.cancel().await;
        }
    }

    /// Runs one quest turn for `user_message`: persists it, drives the
    /// tool-use loop, persists the assistant's reply, and acts on any
    /// signals it carried.
    pub async fn handle_message(&self, quest_id: &QuestId, user_message: &str) -> eyre::Result<()> {
        debug!(%quest_id, "QuestEngine::handle_message: called");
        let quest = self.store.get_quest(quest_id).await?;
        let project = self.store.get_project(&quest.project_id).await?;

        self.store.append_message(quest_id, MessageRole::User, user_message, "").await?;

        if quest.title.is_empty() {
            let title = derive_title(user_message);
            self.store.set_quest_title_if_absent(quest_id, &title).await?;
        }

        let publisher = self.bus.channel(quest_channel(quest_id.as_str()));
        let blocking_ctx = Arc::new(BlockingContext::new(publisher.clone()));
        self.blocking.lock().await.insert(quest_id.as_str().to_string(), blocking_ctx.clone());

        let result = self.run_turn(&project.id, quest_id, quest.tier, PathBuf::from(&project.repo_path), blocking_ctx.clone(), publisher).await;

        self.blocking.lock().await.remove(quest_id.as_str());
        result
    }

    async fn run_turn(
        &self,
        project_id: &ProjectId,
        quest_id: &QuestId,
        tier: ModelTier,
        worktree: PathBuf,
        blocking_ctx: Arc<BlockingContext>,
        publisher: crate::events::ChannelPublisher,
    ) -> eyre::Result<()> {
        let tool_executor = ToolExecutor::quest_engine();
        let gateway: BlockingGatewayRef = blocking_ctx;
        let tool_ctx = ToolContext::for_quest(worktree, project_id.clone(), quest_id.clone(), self.store.clone(), gateway);

        let system_prompt = self.compose_system_prompt(project_id, quest_id).await?;
        let history = self.store.list_messages(quest_id).await?;
        let mut messages: Vec<LlmMessage> = history
            .iter()
            .map(|m| match m.role {
                MessageRole::User => LlmMessage::user(m.content.clone()),
                MessageRole::Assistant => LlmMessage::assistant(m.content.clone()),
            })
            .collect();

        let llm = self.client_for(tier);
        let mut final_text = String::new();
        let mut tool_log: Vec<serde_json::Value> = Vec::new();

        for round in 0..MAX_TOOL_ITERATIONS {
            let request = CompletionRequest {
                system_prompt: system_prompt.clone(),
                messages: messages.clone(),
                tools: tool_executor.definitions(),
                max_tokens: self.max_tokens,
            };

            let (tx, mut rx) = mpsc::channel::<StreamChunk>(64);
            let delta_publisher = publisher.clone();
            let forward = tokio::spawn(async move {
                while let Some(chunk) = rx.recv().await {
                    if let StreamChunk::TextDelta(text) = chunk {
                        delta_publisher.publish("quest.content_delta", serde_json::json!({ "text": text }));
                    }
                }
            });
            let response = llm.stream(request, tx).await?;
            let _ = forward.await;

            if response.tool_calls.is_empty() {
                final_text = response.content.unwrap_or_default();
                break;
            }

            let mut assistant_blocks = Vec::new();
            if let Some(text) = &response.content {
                if !text.is_empty() {
                    assistant_blocks.push(ContentBlock::text(text.clone()));
                }
            }
            for call in &response.tool_calls {
                assistant_blocks.push(ContentBlock::ToolUse { id: call.id.clone(), name: call.name.clone(), input: call.input.clone() });
            }
            messages.push(LlmMessage::assistant_blocks(assistant_blocks));

            let mut result_blocks = Vec::new();
            for call in &response.tool_calls {
                result_blocks.push(self.run_tool_call(call, &tool_executor, &tool_ctx, &publisher, &mut tool_log).await);
            }
            messages.push(LlmMessage::user_blocks(result_blocks));

            if round + 1 == MAX_TOOL_ITERATIONS {
                warn!(%quest_id, "QuestEngine::run_turn: tool-use loop cap reached without a final reply");
            }
        }

        let tool_calls_json = serde_json::to_string(&tool_log).unwrap_or_default();
        self.store.append_message(quest_id, MessageRole::Assistant, &final_text, &tool_calls_json).await?;

        self.apply_signals(project_id, quest_id, &final_text, &publisher).await?;
        publisher.publish("quest.message", serde_json::json!({ "content": final_text }));

        Ok(())
    }

    async fn run_tool_call(
        &self,
        call: &ToolCall,
        tool_executor: &ToolExecutor,
        tool_ctx: &ToolContext,
        publisher: &crate::events::ChannelPublisher,
        tool_log: &mut Vec<serde_json::Value>,
    ) -> ContentBlock {
        publisher.publish(
            "quest.tool_call",
            serde_json::json!({ "id": call.id, "name": call.name, "input": call.input, "status": "running" }),
        );
        let result = tool_executor.execute(call, tool_ctx).await;
        publisher.publish(
            "quest.tool_result",
            serde_json::json!({
                "id": call.id,
                "name": call.name,
                "output": result.broadcast_output(),
                "is_error": result.is_error,
                "duration_ms": result.duration_ms,
            }),
        );
        tool_log.push(serde_json::json!({
            "name": call.name,
            "truncated_output": result.broadcast_output(),
            "is_error": result.is_error,
            "duration_ms": result.duration_ms,
        }));
        ContentBlock::tool_result(call.id.clone(), result.output.clone(), result.is_error)
    }

    async fn compose_system_prompt(&self, project_id: &ProjectId, quest_id: &QuestId) -> eyre::Result<String> {
        let active = self.store.list_active_quests(project_id).await?;
        let others: Vec<_> = active.iter().filter(|q| &q.id != quest_id).collect();
        if others.is_empty() {
            return Ok(PLANNING_SYSTEM_PROMPT.to_string());
        }
        let mut summary = String::from("\nOther quests currently active in this project:\n");
        for q in others {
            summary.push_str(&format!("- {}\n", if q.title.is_empty() { "(untitled)" } else { &q.title }));
        }
        Ok(format!("{PLANNING_SYSTEM_PROMPT}{summary}"))
    }

    /// Acts on the signals carried by the turn's final assistant text:
    /// tracks any drafts it proposed (pending the operator's
    /// `accept_draft`/`reject_draft` decision, never materialized here)
    /// and broadcasts the corresponding events.
    async fn apply_signals(
        &self,
        project_id: &ProjectId,
        quest_id: &QuestId,
        text: &str,
        publisher: &crate::events::ChannelPublisher,
    ) -> eyre::Result<()> {
        for signal in parse_signals(text) {
            match signal {
                Signal::ObjectiveDraft(draft) => {
                    let tracked = self.track_drafts(project_id, quest_id, std::slice::from_ref(&draft));
                    if let Some((draft_id, draft)) = tracked.into_iter().next() {
                        publisher.publish("quest.objective_draft", pending_draft_payload(&draft_id, &draft));
                    }
                }
                Signal::Question { question, options } => {
                    publisher.publish("quest.question", serde_json::json!({ "question": question, "options": options }));
                }
                Signal::QuestReady { drafts, summary } => {
                    let tracked = self.track_drafts(project_id, quest_id, &drafts);
                    let draft_ids: Vec<String> = tracked.into_iter().map(|(id, _)| id).collect();
                    publisher.publish("quest.ready", serde_json::json!({ "draft_ids": draft_ids, "summary": summary }));
                }
            }
        }
        Ok(())
    }

    /// Assigns each draft a server id (UUIDv7, matching the store's own id
    /// scheme), rewrites `blocked_by` references from the model-supplied
    /// `ref` field to those server ids, and registers every draft with
    /// [`DraftRegistry`] pending acceptance.
    fn track_drafts(&self, project_id: &ProjectId, quest_id: &QuestId, drafts: &[serde_json::Value]) -> Vec<(String, serde_json::Value)> {
        let mut ref_to_id: HashMap<String, String> = HashMap::new();
        let tracked: Vec<(String, serde_json::Value)> = drafts
            .iter()
            .map(|draft| {
                let id = uuid::Uuid::now_v7().to_string();
                if let Some(reference) = draft.get("ref").and_then(|v| v.as_str()) {
                    ref_to_id.insert(reference.to_string(), id.clone());
                }
                (id, draft.clone())
            })
            .collect();

        for (id, draft) in &tracked {
            let blocked_by: Vec<String> = draft
                .get("blocked_by")
                .and_then(|v| v.as_array())
                .map(|items| items.iter().filter_map(|v| v.as_str()).filter_map(|r| ref_to_id.get(r).cloned()).collect())
                .unwrap_or_default();
            self.drafts.track(id.clone(), project_id.clone(), quest_id.clone(), draft.clone(), blocked_by);
        }

        tracked
    }

    /// Materializes `draft_id` into a persisted Objective, wiring
    /// dependencies against whichever sibling drafts from the same batch
    /// have already been accepted. Drops dependencies on siblings still
    /// pending or expired, matching the batch's best-effort, non-
    /// transactional acceptance.
    pub async fn accept_draft(&self, quest_id: &QuestId, draft_id: &str) -> eyre::Result<Objective> {
        let accepted = self.drafts.take_for_accept(draft_id, quest_id)?;
        let (title, description, role, priority, checklist) = parse_draft_fields(&accepted.draft);

        let objective = self
            .store
            .create_objective(&accepted.project_id, Some(quest_id), &title, &description, role, priority, ModelTier::Capable, "main", &checklist)
            .await?;
        for dep in &accepted.blocked_by {
            self.store.add_dependency(&objective.id, dep).await?;
        }
        self.drafts.record_resolved(draft_id.to_string(), objective.id.clone());

        self.bus.channel(quest_channel(quest_id.as_str())).publish("quest.objective_accepted", objective_draft_payload(&objective));
        Ok(objective)
    }

    /// Discards `draft_id`. Kept resolvable for a short grace window in
    /// case the operator undoes the rejection with a late `accept_draft`.
    pub async fn reject_draft(&self, quest_id: &QuestId, draft_id: &str) -> eyre::Result<()> {
        self.drafts.reject(draft_id, quest_id)?;
        self.bus.channel(quest_channel(quest_id.as_str())).publish("quest.objective_rejected", serde_json::json!({ "draft_id": draft_id }));
        Ok(())
    }

    /// Accepts each draft in turn, best-effort: one failure doesn't stop
    /// the rest, and each gets its own reported outcome.
    pub async fn accept_drafts_batch(&self, quest_id: &QuestId, draft_ids: &[String]) -> Vec<(String, eyre::Result<Objective>)> {
        let mut results = Vec::with_capacity(draft_ids.len());
        for draft_id in draft_ids {
            results.push((draft_id.clone(), self.accept_draft(quest_id, draft_id).await));
        }
        results
    }
}

fn parse_draft_fields(draft: &serde_json::Value) -> (String, String, Role, Priority, Vec<(String, bool)>) {
    let title = draft.get("title").and_then(|v| v.as_str()).unwrap_or("Untitled objective").to_string();
    let description = draft.get("description").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let role = draft.get("role").and_then(|v| v.as_str()).and_then(|s| s.parse::<Role>().ok()).unwrap_or(Role::Creator);
    let priority = draft.get("priority").and_then(|v| v.as_u64()).and_then(|n| Priority::new(n as u8)).unwrap_or_default();
    let checklist = draft
        .get("checklist")
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str()).map(|s| (s.to_string(), true)).collect())
        .unwrap_or_default();
    (title, description, role, priority, checklist)
}

fn pending_draft_payload(draft_id: &str, draft: &serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "draft_id": draft_id,
        "title": draft.get("title").and_then(|v| v.as_str()).unwrap_or("Untitled objective"),
        "description": draft.get("description").and_then(|v| v.as_str()).unwrap_or(""),
        "role": draft.get("role").and_then(|v| v.as_str()).unwrap_or("creator"),
        "priority": draft.get("priority").and_then(|v| v.as_u64()).unwrap_or(3),
    })
}

fn objective_draft_payload(objective: &Objective) -> serde_json::Value {
    serde_json::json!({
        "draft_id": objective.id.to_string(),
        "title": objective.title,
        "description": objective.description,
        "role": objective.role.to_string(),
        "priority": objective.priority.get(),
    })
}
