//! SessionLoop: drives one attempt at completing one objective. Each
//! iteration starts from a fresh LLM context; state that must survive
//! between iterations lives in the worktree (via git) and in the last
//! assistant message carried forward, not in an accumulated transcript.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use store::{
    ApprovalType, Checkpoint, CheckpointId, ChecklistItem, ChecklistStatus, IterationRecord, ModelTier, Objective,
    ObjectiveStatus, Role, Session, SessionOutcome, SessionStatus, Store, role_transition_allowed,
};

use crate::events::{ChannelPublisher, EventBus, task_channel};
use crate::llm::{CompletionRequest, ContentBlock, LlmClient, Message as LlmMessage, StreamChunk};
use crate::tools::{ToolContext, ToolExecutor};
use crate::workspace::{WorkspaceHandle, WorkspaceManager, WorkspaceStatus};

use super::budget::{BudgetEnvelope, BudgetUsage, ContextReport};
use super::control::{ControlMarker, parse_markers};

const MAX_TOOL_ITERATIONS: u32 = 10;

const CONTROL_MARKER_INSTRUCTIONS: &str = r#"
When you have fully satisfied a checklist item, include a line: CHECKLIST:<item>:done (or :failed, :skipped).
When the whole objective is done, include a line: TASK_COMPLETE.
If your role's part is done but the objective needs another role to continue, include: HAT_TRANSITION:<next_role>.
If nothing further can be done under any role, include: HAT_COMPLETE.
"#;

fn role_guidance(role: Role) -> &'static str {
    match role {
        Role::Explorer => "You are exploring the codebase to understand it before any change is made. Read widely, change nothing.",
        Role::Planner => "You are breaking the objective down into a concrete, ordered plan the next role can execute.",
        Role::Designer => "You are deciding the shape of the change: interfaces, data flow, file layout.",
        Role::Creator => "You are implementing the change described by the objective and its checklist.",
        Role::Critic => "You are reviewing the current state of the worktree for correctness and completeness, not adding features.",
        Role::Editor => "You are revising existing work in response to review feedback.",
        Role::Resolver => "You are resolving merge conflicts or other blocking inconsistencies in the worktree.",
        Role::Documenter => "You are writing or updating documentation describing the change.",
        Role::Devops => "You are handling build, CI, and deployment concerns for the change.",
    }
}

/// Cooperative cancel/pause flags a Scheduler holds alongside a running
/// [`SessionLoop::run`] call. Checked once per iteration, not preemptive.
#[derive(Clone, Default)]
pub struct SessionControl {
    cancel: Arc<AtomicBool>,
    pause: Arc<AtomicBool>,
}

impl SessionControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    pub fn pause(&self) {
        self.pause.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.pause.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::SeqCst)
    }
}

pub struct SessionLoop {
    store: Store,
    bus: Arc<EventBus>,
    llm: Arc<dyn LlmClient>,
    tier: ModelTier,
    workspace: Arc<WorkspaceManager>,
    envelope: BudgetEnvelope,
    max_tokens: u32,
    tool_executor: ToolExecutor,
}

impl SessionLoop {
    pub fn new(store: Store, bus: Arc<EventBus>, llm: Arc<dyn LlmClient>, tier: ModelTier, workspace: Arc<WorkspaceManager>, envelope: BudgetEnvelope, max_tokens: u32) -> Self {
        Self { store, bus, llm, tier, workspace, envelope, max_tokens, tool_executor: ToolExecutor::session_loop() }
    }

    /// Runs iterations until one of the termination conditions fires,
    /// resuming from the latest checkpoint if one exists. `repo_root` is
    /// the original clone `worktree` was branched from, needed to tear
    /// the worktree back down on a non-completed outcome.
    pub async fn run(&self, session: &Session, objective: &Objective, worktree: &Path, repo_root: &Path, control: &SessionControl) -> eyre::Result<()> {
        debug!(session_id = %session.id, objective_id = %objective.id, "SessionLoop::run: called");
        let publisher = self.bus.channel(task_channel(objective.id.as_str()));
        let started = Instant::now();

        let mut current_role = session.current_role;
        let mut last_assistant_message = String::new();
        let mut usage = BudgetUsage { iterations: session.iteration_count, ..Default::default() };

        if let Some(checkpoint) = self.store.latest_checkpoint(&session.id).await? {
            current_role = checkpoint.current_role;
            last_assistant_message = checkpoint.last_assistant_message;
            usage.tokens = self.envelope.max_tokens.saturating_sub(checkpoint.budget_remaining_tokens);
            usage.cents = self.envelope.max_cents.saturating_sub(checkpoint.budget_remaining_cents);
        }

        loop {
            if control.is_cancelled() {
                return self.terminate(session, objective, worktree, repo_root, SessionStatus::Cancelled, SessionOutcome::Cancelled, &publisher).await;
            }
            if control.is_paused() {
                self.checkpoint(session, current_role, usage, &last_assistant_message).await?;
                self.store.transition_session(&session.id, SessionStatus::Paused, None).await?;
                publisher.publish("session.paused", serde_json::json!({ "session_id": session.id.to_string() }));
                return Ok(());
            }
            if usage.exceeds(&self.envelope, started.elapsed()) {
                self.checkpoint(session, current_role, usage, &last_assistant_message).await?;
                self.store.transition_session(&session.id, SessionStatus::Paused, Some(SessionOutcome::Budget)).await?;
                self.store.create_approval(Some(&objective.id), None, ApprovalType::RoleTransition).await?;
                publisher.publish("session.completed", serde_json::json!({ "session_id": session.id.to_string(), "outcome": "budget" }));
                return Ok(());
            }

            let iteration = usage.iterations + 1;
            let checklist = self.store.list_checklist(&objective.id).await?;
            let workspace_status = self.workspace.status(worktree, &objective.base_branch).await.ok();

            let system_prompt = compose_system_prompt(current_role, objective, &checklist, workspace_status.as_ref(), &last_assistant_message);
            let tool_ctx = ToolContext::with_max_tokens(worktree.to_path_buf(), session.id.to_string(), self.max_tokens);

            let (assistant_text, input_tokens, output_tokens, cost_cents, tool_log) =
                self.run_iteration(&system_prompt, &tool_ctx, &publisher).await?;

            usage.iterations = iteration;
            usage.tokens += input_tokens + output_tokens;
            usage.cents += cost_cents;
            last_assistant_message = assistant_text.clone();

            let context_used = usage.tokens.min(self.envelope.max_tokens);
            let context = ContextReport::new(context_used);
            publisher.publish(
                "session.iteration",
                serde_json::json!({
                    "session_id": session.id.to_string(),
                    "iteration": iteration,
                    "total_tokens": usage.tokens,
                    "total_cost_cents": usage.cents,
                    "context": context,
                }),
            );

            self.store
                .append_iteration(&IterationRecord {
                    session_id: session.id.clone(),
                    iteration,
                    input_tokens,
                    output_tokens,
                    cost_cents,
                    tool_calls_json: tool_log,
                    context_used_tokens: context.used_tokens,
                    context_max_tokens: context.max_tokens,
                    created_at: chrono::Utc::now(),
                })
                .await?;

            if iteration % 5 == 0 {
                self.checkpoint(session, current_role, usage, &last_assistant_message).await?;
            }

            let markers = parse_markers(&assistant_text);
            for marker in &markers {
                if let ControlMarker::ChecklistUpdate { item, status } = marker {
                    self.store.set_checklist_item_status(&objective.id, item, *status).await?;
                }
            }

            let task_complete = markers.contains(&ControlMarker::TaskComplete);
            if task_complete {
                let checklist = self.store.list_checklist(&objective.id).await?;
                let must_haves_done = checklist.iter().filter(|c| c.must_have).all(|c| c.status == ChecklistStatus::Done);
                if must_haves_done {
                    return self.terminate(session, objective, worktree, repo_root, SessionStatus::Completed, SessionOutcome::Ok, &publisher).await;
                }
                return self.terminate(session, objective, worktree, repo_root, SessionStatus::Failed, SessionOutcome::Incomplete, &publisher).await;
            }

            if let Some(next_role) = markers.iter().find_map(|m| match m {
                ControlMarker::HatTransition(role) => Some(*role),
                _ => None,
            }) {
                if role_transition_allowed(current_role, next_role) {
                    current_role = next_role;
                    if current_role.is_terminal() {
                        return self.terminate(session, objective, worktree, repo_root, SessionStatus::Completed, SessionOutcome::Ok, &publisher).await;
                    }
                } else {
                    warn!(from = %current_role, to = %next_role, "SessionLoop::run: rejected an illegal role transition");
                    last_assistant_message =
                        format!("{last_assistant_message}\n\n[rejected: {current_role} cannot transition to {next_role}]");
                }
            } else if markers.contains(&ControlMarker::HatComplete) && current_role.is_terminal() {
                return self.terminate(session, objective, worktree, repo_root, SessionStatus::Completed, SessionOutcome::Ok, &publisher).await;
            }

            if usage.iterations >= self.envelope.max_iterations {
                return self.terminate(session, objective, worktree, repo_root, SessionStatus::Failed, SessionOutcome::LoopCap, &publisher).await;
            }
        }
    }

    /// Runs the tool-use loop for a single iteration, within its own
    /// fresh message history, returning the final assistant text, token
    /// counts, cost, and a JSON-encoded tool-call log.
    async fn run_iteration(&self, system_prompt: &str, tool_ctx: &ToolContext, publisher: &ChannelPublisher) -> eyre::Result<(String, u64, u64, u64, String)> {
        let mut messages = vec![LlmMessage::user("Continue working on the objective given the state above.")];
        let mut input_tokens = 0u64;
        let mut output_tokens = 0u64;
        let mut cost_cents = 0u64;
        let mut tool_log: Vec<serde_json::Value> = Vec::new();
        let mut final_text = String::new();

        for round in 0..MAX_TOOL_ITERATIONS {
            let request = CompletionRequest {
                system_prompt: system_prompt.to_string(),
                messages: messages.clone(),
                tools: self.tool_executor.definitions(),
                max_tokens: self.max_tokens,
            };

            let (tx, mut rx) = mpsc::channel::<StreamChunk>(64);
            let delta_publisher = publisher.clone();
            let forward = tokio::spawn(async move {
                while let Some(chunk) = rx.recv().await {
                    if let StreamChunk::TextDelta(text) = chunk {
                        delta_publisher.publish("session.content_delta", serde_json::json!({ "text": text }));
                    }
                }
            });
            let response = self.llm.stream(request, tx).await?;
            let _ = forward.await;

            input_tokens += response.usage.input_tokens;
            output_tokens += response.usage.output_tokens;
            cost_cents += response.usage.cost_cents(self.tier);

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
                publisher.publish("session.tool_call", serde_json::json!({ "id": call.id, "name": call.name, "status": "running" }));
                let result = self.tool_executor.execute(call, tool_ctx).await;
                publisher.publish(
                    "session.tool_result",
                    serde_json::json!({ "id": call.id, "name": call.name, "output": result.broadcast_output(), "is_error": result.is_error, "duration_ms": result.duration_ms }),
                );
                tool_log.push(serde_json::json!({
                    "name": call.name,
                    "truncated_output": result.broadcast_output(),
                    "is_error": result.is_error,
                    "duration_ms": result.duration_ms,
                }));
                result_blocks.push(ContentBlock::tool_result(call.id.clone(), result.output.clone(), result.is_error));
            }
            messages.push(LlmMessage::user_blocks(result_blocks));

            if round + 1 == MAX_TOOL_ITERATIONS {
                final_text.clear();
            }
        }

        Ok((final_text, input_tokens, output_tokens, cost_cents, serde_json::to_string(&tool_log).unwrap_or_default()))
    }

    async fn checkpoint(&self, session: &Session, role: Role, usage: BudgetUsage, last_assistant_message: &str) -> eyre::Result<()> {
        self.store
            .set_checkpoint(&Checkpoint {
                id: CheckpointId::new(),
                session_id: session.id.clone(),
                last_assistant_message: last_assistant_message.to_string(),
                current_role: role,
                iteration: usage.iterations,
                budget_remaining_tokens: self.envelope.max_tokens.saturating_sub(usage.tokens),
                budget_remaining_cents: self.envelope.max_cents.saturating_sub(usage.cents),
                created_at: chrono::Utc::now(),
            })
            .await?;
        Ok(())
    }

    /// Transitions session and objective to their terminal states and
    /// releases the worktree, keeping it on disk only when the outcome
    /// is `completed` so an operator can still open a PR from it.
    async fn terminate(
        &self,
        session: &Session,
        objective: &Objective,
        worktree: &Path,
        repo_root: &Path,
        status: SessionStatus,
        outcome: SessionOutcome,
        publisher: &ChannelPublisher,
    ) -> eyre::Result<()> {
        info!(session_id = %session.id, ?status, ?outcome, "SessionLoop::terminate: called");
        self.store.transition_session(&session.id, status, Some(outcome)).await?;

        let objective_status = match status {
            SessionStatus::Completed => ObjectiveStatus::Completed,
            SessionStatus::Failed => ObjectiveStatus::Failed,
            SessionStatus::Cancelled => ObjectiveStatus::Cancelled,
            _ => objective.status,
        };
        if objective_status != objective.status {
            self.store.transition_objective(&objective.id, objective_status).await?;
        }

        if status != SessionStatus::Completed {
            let branch = objective.branch_name.clone().unwrap_or_else(|| format!("task/{}", objective.id));
            let handle = WorkspaceHandle { objective_id: objective.id.clone(), path: worktree.to_path_buf(), branch };
            if let Err(e) = self.workspace.release(repo_root, &handle, false).await {
                warn!(error = %e, "SessionLoop::terminate: failed to release the worktree");
            }
        }

        publisher.publish(
            "session.completed",
            serde_json::json!({ "session_id": session.id.to_string(), "status": status.to_string(), "outcome": outcome }),
        );
        Ok(())
    }
}

fn compose_system_prompt(role: Role, objective: &Objective, checklist: &[ChecklistItem], workspace: Option<&WorkspaceStatus>, last_assistant_message: &str) -> String {
    let mut prompt = format!("{}\n\nObjective: {}\n{}\n", role_guidance(role), objective.title, objective.description);

    if !checklist.is_empty() {
        prompt.push_str("\nChecklist:\n");
        for item in checklist {
            let marker = if item.must_have { "must" } else { "optional" };
            prompt.push_str(&format!("- [{:?}] ({marker}) {}: {}\n", item.status, item.id, item.description));
        }
    }

    if let Some(status) = workspace {
        prompt.push_str(&format!("\nWorkspace: branch {} is {} ahead / {} behind {}.\n", status.branch, status.ahead, status.behind, objective.base_branch));
        if !status.dirty_files.is_empty() {
            prompt.push_str(&format!("Changed files: {}\n", status.dirty_files.join(", ")));
        }
    }

    if !last_assistant_message.is_empty() {
        prompt.push_str(&format!("\nPrevious iteration ended with:\n{last_assistant_message}\n"));
    }

    prompt.push_str(CONTROL_MARKER_INSTRUCTIONS);
    prompt
}
