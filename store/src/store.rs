//! The store itself: a thin, serialized wrapper over a SQLite connection.
//!
//! Transitions (anything that changes a status field) go through
//! dedicated methods that check the adjacency table before writing.
//! Backend I/O errors are retried with jittered backoff up to 3 attempts,
//! matching the error-handling design's retry budget for storage faults.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::*;
use crate::error::{Result, StoreError};
use crate::ids::*;
use crate::schema;
use crate::transitions::{objective_transition_allowed, quest_transition_allowed};

/// Durable record of projects, quests, objectives, checklists, sessions,
/// iterations, messages, approvals and dependencies.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

/// Counts of objectives by status within a quest, for quest summaries.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct QuestSummary {
    pub pending: u32,
    pub ready: u32,
    pub planning: u32,
    pub running: u32,
    pub paused: u32,
    pub completed: u32,
    pub failed: u32,
    pub cancelled: u32,
}

/// Fields cleared on a worktree released by `WorkspaceMgr`.
pub struct WorkspaceFields {
    pub worktree_path: Option<String>,
    pub branch_name: Option<String>,
}

const MAX_BACKEND_RETRIES: u32 = 3;

/// Retries a fallible SQLite operation with jittered exponential backoff,
/// bounded to [`MAX_BACKEND_RETRIES`] attempts.
///
/// Expands inline (rather than calling a generic async fn that takes a
/// closure) so the retry loop never holds a reference into the
/// `!Sync` `rusqlite::Connection` across its own `.await` — keeping the
/// enclosing `async fn`'s future `Send`.
macro_rules! with_retry {
    ($op:expr) => {{
        let mut attempt = 0u32;
        loop {
            let attempt_result = $op;
            match attempt_result {
                Ok(v) => break Ok(v),
                Err(e) if attempt + 1 < MAX_BACKEND_RETRIES => {
                    attempt += 1;
                    let jitter_ms = 10u64 * 2u64.pow(attempt) + (rand::random::<u64>() % 20);
                    warn!(attempt, %e, "store backend error, retrying");
                    tokio::time::sleep(std::time::Duration::from_millis(jitter_ms)).await;
                }
                Err(e) => break Err(StoreError::Backend(e)),
            }
        }
    }};
}

impl Store {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = tokio::task::spawn_blocking(move || -> rusqlite::Result<Connection> {
            let conn = Connection::open(&path)?;
            schema::init(&conn)?;
            Ok(conn)
        })
        .await
        .expect("open task panicked")?;

        debug!("Store::open: database ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // === Projects ===

    pub async fn create_project(&self, name: &str, repo_path: &str) -> Result<Project> {
        let project = Project {
            id: ProjectId::new(),
            name: name.to_string(),
            repo_path: repo_path.to_string(),
            created_at: Utc::now(),
        };
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "INSERT INTO projects (id, name, repo_path, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![project.id.0, project.name, project.repo_path, project.created_at.to_rfc3339()],
            ))?;
        Ok(project)
    }

    pub async fn get_project(&self, id: &ProjectId) -> Result<Project> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, name, repo_path, created_at FROM projects WHERE id = ?1",
            params![id.0],
            row_to_project,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "Project",
            id: id.0.clone(),
        })
    }

    // === Quests ===

    pub async fn create_quest(&self, project_id: &ProjectId, tier: ModelTier) -> Result<Quest> {
        let quest = Quest {
            id: QuestId::new(),
            project_id: project_id.clone(),
            title: String::new(),
            status: QuestStatus::Active,
            tier,
            created_at: Utc::now(),
        };
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "INSERT INTO quests (id, project_id, title, status, tier, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    quest.id.0,
                    quest.project_id.0,
                    quest.title,
                    quest_status_str(quest.status),
                    tier_str(quest.tier),
                    quest.created_at.to_rfc3339()
                ],
            ))?;
        Ok(quest)
    }

    pub async fn get_quest(&self, id: &QuestId) -> Result<Quest> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, project_id, title, status, tier, created_at FROM quests WHERE id = ?1",
            params![id.0],
            row_to_quest,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "Quest",
            id: id.0.clone(),
        })
    }

    /// Sets the quest title exactly once; subsequent calls are a no-op so
    /// replaying persisted messages yields the same title decision.
    pub async fn set_quest_title_if_absent(&self, id: &QuestId, title: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "UPDATE quests SET title = ?2 WHERE id = ?1 AND title = ''",
                params![id.0, title],
            ))?;
        Ok(())
    }

    pub async fn transition_quest(&self, id: &QuestId, to: QuestStatus) -> Result<Quest> {
        let conn = self.conn.lock().await;
        let current: QuestStatus = conn
            .query_row("SELECT status FROM quests WHERE id = ?1", params![id.0], |r| {
                let s: String = r.get(0)?;
                Ok(parse_quest_status(&s))
            })
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Quest",
                id: id.0.clone(),
            })?;

        if !quest_transition_allowed(current, to) {
            return Err(StoreError::Conflict {
                entity: "Quest",
                id: id.0.clone(),
                from: current.to_string(),
                to: to.to_string(),
            });
        }
        if current != to {
            with_retry!(conn.execute(
                    "UPDATE quests SET status = ?2 WHERE id = ?1",
                    params![id.0, quest_status_str(to)],
                ))?;
        }
        drop(conn);
        self.get_quest(id).await
    }

    pub async fn append_message(&self, quest_id: &QuestId, role: MessageRole, content: &str, tool_calls_json: &str) -> Result<Message> {
        let msg = Message {
            id: Uuid::now_v7().to_string(),
            quest_id: quest_id.clone(),
            role,
            content: content.to_string(),
            tool_calls_json: tool_calls_json.to_string(),
            created_at: Utc::now(),
        };
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "INSERT INTO quest_messages (id, quest_id, role, content, tool_calls_json, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![msg.id, msg.quest_id.0, role_str(msg.role), msg.content, msg.tool_calls_json, msg.created_at.to_rfc3339()],
            ))?;
        Ok(msg)
    }

    pub async fn list_messages(&self, quest_id: &QuestId) -> Result<Vec<Message>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, quest_id, role, content, tool_calls_json, created_at FROM quest_messages WHERE quest_id = ?1 ORDER BY created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![quest_id.0], row_to_message)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn list_active_quests(&self, project_id: &ProjectId) -> Result<Vec<Quest>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, title, status, tier, created_at FROM quests WHERE project_id = ?1 AND status = 'active'",
        )?;
        let rows = stmt
            .query_map(params![project_id.0], row_to_quest)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // === Objectives ===

    #[allow(clippy::too_many_arguments)]
    pub async fn create_objective(
        &self,
        project_id: &ProjectId,
        quest_id: Option<&QuestId>,
        title: &str,
        description: &str,
        role: Role,
        priority: Priority,
        tier: ModelTier,
        base_branch: &str,
        checklist: &[(String, bool)],
    ) -> Result<Objective> {
        let objective = Objective {
            id: ObjectiveId::new(),
            project_id: project_id.clone(),
            quest_id: quest_id.cloned(),
            title: title.to_string(),
            description: description.to_string(),
            role,
            priority,
            tier,
            status: ObjectiveStatus::Pending,
            base_branch: base_branch.to_string(),
            worktree_path: None,
            branch_name: None,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost_cents: 0,
            unsatisfied_deps: 0,
            created_at: Utc::now(),
        };

        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "INSERT INTO tasks (id, project_id, quest_id, title, description, role, priority, tier, status, base_branch, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    objective.id.0,
                    objective.project_id.0,
                    objective.quest_id.as_ref().map(|q| q.0.clone()),
                    objective.title,
                    objective.description,
                    objective.role.to_string(),
                    objective.priority.get(),
                    tier_str(objective.tier),
                    objective.status.to_string(),
                    objective.base_branch,
                    objective.created_at.to_rfc3339(),
                ],
            ))?;

        for (i, (desc, must_have)) in checklist.iter().enumerate() {
            let item_id = Uuid::now_v7().to_string();
            with_retry!(conn.execute(
                    "INSERT INTO checklist_items (id, objective_id, ordinal, description, must_have, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![item_id, objective.id.0, i as u32, desc, *must_have as i64, "pending"],
                ))?;
        }

        // Stays pending until the scheduler sees zero unsatisfied
        // predecessors; callers add dependencies with `add_dependency`
        // after creation, so promotion can't happen here.
        drop(conn);
        self.get_objective(&objective.id).await
    }

    pub async fn get_objective(&self, id: &ObjectiveId) -> Result<Objective> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, project_id, quest_id, title, description, role, priority, tier, status, base_branch,
                    worktree_path, branch_name, total_input_tokens, total_output_tokens, total_cost_cents,
                    unsatisfied_deps, created_at
             FROM tasks WHERE id = ?1",
            params![id.0],
            row_to_objective,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "Objective",
            id: id.0.clone(),
        })
    }

    /// Adds a dependency edge after a depth-first cycle check restricted
    /// to the reachable subgraph from `depends_on`.
    pub async fn add_dependency(&self, objective_id: &ObjectiveId, depends_on: &ObjectiveId) -> Result<()> {
        if objective_id == depends_on {
            return Err(StoreError::Invariant("an objective cannot depend on itself".into()));
        }
        let conn = self.conn.lock().await;

        if would_create_cycle(&conn, objective_id, depends_on)? {
            return Err(StoreError::Invariant(format!(
                "adding {depends_on} -> {objective_id} would create a dependency cycle"
            )));
        }

        with_retry!(conn.execute(
                "INSERT OR IGNORE INTO task_dependencies (objective_id, depends_on) VALUES (?1, ?2)",
                params![objective_id.0, depends_on.0],
            ))?;
        with_retry!(conn.execute(
                "UPDATE tasks SET unsatisfied_deps = unsatisfied_deps + 1 WHERE id = ?1",
                params![objective_id.0],
            ))?;
        Ok(())
    }

    /// Moves an objective's status, validating against the adjacency
    /// table. Also enforces the must-have completion precondition for
    /// `completed`.
    pub async fn transition_objective(&self, id: &ObjectiveId, to: ObjectiveStatus) -> Result<Objective> {
        let conn = self.conn.lock().await;
        let current: ObjectiveStatus = conn
            .query_row("SELECT status FROM tasks WHERE id = ?1", params![id.0], |r| {
                let s: String = r.get(0)?;
                Ok(parse_objective_status(&s))
            })
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Objective",
                id: id.0.clone(),
            })?;

        if !objective_transition_allowed(current, to) {
            return Err(StoreError::Conflict {
                entity: "Objective",
                id: id.0.clone(),
                from: current.to_string(),
                to: to.to_string(),
            });
        }

        if to == ObjectiveStatus::Completed {
            let open_must_haves: u32 = conn.query_row(
                "SELECT COUNT(*) FROM checklist_items WHERE objective_id = ?1 AND must_have = 1 AND status != 'done'",
                params![id.0],
                |r| r.get(0),
            )?;
            if open_must_haves > 0 {
                return Err(StoreError::Invariant(format!(
                    "objective {id} has {open_must_haves} incomplete must-have item(s)"
                )));
            }
        }

        if current != to {
            with_retry!(conn.execute("UPDATE tasks SET status = ?2 WHERE id = ?1", params![id.0, to.to_string()]))?;

            if to == ObjectiveStatus::Completed {
                decrement_dependents(&conn, id)?;
            }
        }

        drop(conn);
        self.get_objective(id).await
    }

    pub async fn set_workspace(&self, id: &ObjectiveId, fields: WorkspaceFields) -> Result<()> {
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "UPDATE tasks SET worktree_path = ?2, branch_name = ?3 WHERE id = ?1",
                params![id.0, fields.worktree_path, fields.branch_name],
            ))?;
        Ok(())
    }

    pub async fn set_checklist_item_status(&self, objective_id: &ObjectiveId, item_description_or_id: &str, status: ChecklistStatus) -> Result<()> {
        let conn = self.conn.lock().await;
        let status_str = match status {
            ChecklistStatus::Pending => "pending",
            ChecklistStatus::Done => "done",
            ChecklistStatus::Failed => "failed",
            ChecklistStatus::Skipped => "skipped",
        };
        with_retry!(conn.execute(
                "UPDATE checklist_items SET status = ?3 WHERE objective_id = ?1 AND (id = ?2 OR description = ?2)",
                params![objective_id.0, item_description_or_id, status_str],
            ))?;
        Ok(())
    }

    pub async fn list_checklist(&self, objective_id: &ObjectiveId) -> Result<Vec<ChecklistItem>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, objective_id, ordinal, description, must_have, status FROM checklist_items WHERE objective_id = ?1 ORDER BY ordinal",
        )?;
        let rows = stmt
            .query_map(params![objective_id.0], row_to_checklist_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Unblocked objectives (`unsatisfied_deps = 0`) in `ready` or
    /// `planning`, ordered by (priority asc, created_at asc) to match the
    /// scheduler's queue key.
    pub async fn list_ready_objectives(&self, project_id: &ProjectId) -> Result<Vec<Objective>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, quest_id, title, description, role, priority, tier, status, base_branch,
                    worktree_path, branch_name, total_input_tokens, total_output_tokens, total_cost_cents,
                    unsatisfied_deps, created_at
             FROM tasks
             WHERE project_id = ?1 AND unsatisfied_deps = 0 AND status IN ('ready', 'planning')
             ORDER BY priority ASC, created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![project_id.0], row_to_objective)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Pending objectives whose dependencies have all completed
    /// (`unsatisfied_deps = 0`) but that haven't yet been promoted to
    /// `ready`. The scheduler calls this to recompute readiness whenever
    /// a dependency finishes, since `decrement_dependents` only updates
    /// the counter, not the status.
    pub async fn list_unblocked_pending(&self, project_id: &ProjectId) -> Result<Vec<Objective>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, quest_id, title, description, role, priority, tier, status, base_branch,
                    worktree_path, branch_name, total_input_tokens, total_output_tokens, total_cost_cents,
                    unsatisfied_deps, created_at
             FROM tasks
             WHERE project_id = ?1 AND unsatisfied_deps = 0 AND status = 'pending'
             ORDER BY priority ASC, created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![project_id.0], row_to_objective)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All objectives belonging to a quest, ordered by (priority asc, created_at asc).
    pub async fn list_objectives_for_quest(&self, quest_id: &QuestId) -> Result<Vec<Objective>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, project_id, quest_id, title, description, role, priority, tier, status, base_branch,
                    worktree_path, branch_name, total_input_tokens, total_output_tokens, total_cost_cents,
                    unsatisfied_deps, created_at
             FROM tasks
             WHERE quest_id = ?1
             ORDER BY priority ASC, created_at ASC",
        )?;
        let rows = stmt
            .query_map(params![quest_id.0], row_to_objective)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn compute_quest_summary(&self, quest_id: &QuestId) -> Result<QuestSummary> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM tasks WHERE quest_id = ?1 GROUP BY status")?;
        let mut summary = QuestSummary::default();
        let rows = stmt.query_map(params![quest_id.0], |r| {
            let status: String = r.get(0)?;
            let count: u32 = r.get(1)?;
            Ok((status, count))
        })?;
        for row in rows {
            let (status, count) = row?;
            match status.as_str() {
                "pending" => summary.pending = count,
                "ready" => summary.ready = count,
                "planning" => summary.planning = count,
                "running" => summary.running = count,
                "paused" => summary.paused = count,
                "completed" => summary.completed = count,
                "failed" => summary.failed = count,
                "cancelled" => summary.cancelled = count,
                _ => {}
            }
        }
        Ok(summary)
    }

    // === Sessions ===

    pub async fn create_session(&self, objective_id: &ObjectiveId, role: Role) -> Result<Session> {
        let session = Session {
            id: SessionId::new(),
            objective_id: objective_id.clone(),
            status: SessionStatus::Running,
            iteration_count: 0,
            outcome: None,
            current_role: role,
            created_at: Utc::now(),
        };
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "INSERT INTO sessions (id, objective_id, status, iteration_count, outcome, current_role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    session.id.0,
                    session.objective_id.0,
                    session.status.to_string(),
                    session.iteration_count,
                    Option::<String>::None,
                    session.current_role.to_string(),
                    session.created_at.to_rfc3339()
                ],
            ))?;
        Ok(session)
    }

    pub async fn get_session(&self, id: &SessionId) -> Result<Session> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, objective_id, status, iteration_count, outcome, current_role, created_at FROM sessions WHERE id = ?1",
            params![id.0],
            row_to_session,
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound {
            entity: "Session",
            id: id.0.clone(),
        })
    }

    /// Pausing an already-paused session, or cancelling an already-
    /// terminal one, is a no-op success rather than a `Conflict`.
    pub async fn transition_session(&self, id: &SessionId, to: SessionStatus, outcome: Option<SessionOutcome>) -> Result<Session> {
        let conn = self.conn.lock().await;
        let current: SessionStatus = conn
            .query_row("SELECT status FROM sessions WHERE id = ?1", params![id.0], |r| {
                let s: String = r.get(0)?;
                Ok(parse_session_status(&s))
            })
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Session",
                id: id.0.clone(),
            })?;

        let terminal = matches!(current, SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Cancelled);
        let is_idempotent_noop = current == to || (terminal && to == SessionStatus::Cancelled);

        if !is_idempotent_noop && !session_transition_allowed(current, to) {
            return Err(StoreError::Conflict {
                entity: "Session",
                id: id.0.clone(),
                from: current.to_string(),
                to: to.to_string(),
            });
        }

        if current != to && !(terminal && to == SessionStatus::Cancelled) {
            let outcome_str = outcome.map(outcome_str);
            with_retry!(conn.execute(
                    "UPDATE sessions SET status = ?2, outcome = ?3 WHERE id = ?1",
                    params![id.0, to.to_string(), outcome_str],
                ))?;
        }

        drop(conn);
        self.get_session(id).await
    }

    pub async fn append_iteration(&self, record: &IterationRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "INSERT INTO iterations (session_id, iteration, input_tokens, output_tokens, cost_cents,
                    tool_calls_json, context_used_tokens, context_max_tokens, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.session_id.0,
                    record.iteration,
                    record.input_tokens as i64,
                    record.output_tokens as i64,
                    record.cost_cents as i64,
                    record.tool_calls_json,
                    record.context_used_tokens as i64,
                    record.context_max_tokens as i64,
                    record.created_at.to_rfc3339(),
                ],
            ))?;
        with_retry!(conn.execute(
                "UPDATE sessions SET iteration_count = ?2 WHERE id = ?1",
                params![record.session_id.0, record.iteration],
            ))?;
        with_retry!(conn.execute(
                "UPDATE tasks SET total_input_tokens = total_input_tokens + ?2,
                                  total_output_tokens = total_output_tokens + ?3,
                                  total_cost_cents = total_cost_cents + ?4
                 WHERE id = (SELECT objective_id FROM sessions WHERE id = ?1)",
                params![record.session_id.0, record.input_tokens as i64, record.output_tokens as i64, record.cost_cents as i64],
            ))?;
        Ok(())
    }

    pub async fn set_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "INSERT INTO checkpoints (id, session_id, last_assistant_message, current_role, iteration,
                    budget_remaining_tokens, budget_remaining_cents, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    checkpoint.id.0,
                    checkpoint.session_id.0,
                    checkpoint.last_assistant_message,
                    checkpoint.current_role.to_string(),
                    checkpoint.iteration,
                    checkpoint.budget_remaining_tokens as i64,
                    checkpoint.budget_remaining_cents as i64,
                    checkpoint.created_at.to_rfc3339(),
                ],
            ))?;
        Ok(())
    }

    pub async fn latest_checkpoint(&self, session_id: &SessionId) -> Result<Option<Checkpoint>> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, session_id, last_assistant_message, current_role, iteration,
                        budget_remaining_tokens, budget_remaining_cents, created_at
                 FROM checkpoints WHERE session_id = ?1 ORDER BY iteration DESC LIMIT 1",
                params![session_id.0],
                row_to_checkpoint,
            )
            .optional()?;
        Ok(row)
    }

    // === Approvals ===

    pub async fn create_approval(&self, objective_id: Option<&ObjectiveId>, quest_id: Option<&QuestId>, kind: ApprovalType) -> Result<Approval> {
        let approval = Approval {
            id: ApprovalId::new(),
            objective_id: objective_id.cloned(),
            quest_id: quest_id.cloned(),
            kind,
            status: ApprovalStatus::Pending,
            created_at: Utc::now(),
        };
        let conn = self.conn.lock().await;
        with_retry!(conn.execute(
                "INSERT INTO approvals (id, objective_id, quest_id, kind, status, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    approval.id.0,
                    approval.objective_id.as_ref().map(|o| o.0.clone()),
                    approval.quest_id.as_ref().map(|q| q.0.clone()),
                    approval_type_str(approval.kind),
                    "pending",
                    approval.created_at.to_rfc3339(),
                ],
            ))?;
        Ok(approval)
    }

    pub async fn list_pending_approvals(&self) -> Result<Vec<Approval>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT id, objective_id, quest_id, kind, status, created_at FROM approvals WHERE status = 'pending'",
        )?;
        let rows = stmt.query_map([], row_to_approval)?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub async fn resolve_approval(&self, id: &ApprovalId, approve: bool) -> Result<Approval> {
        let conn = self.conn.lock().await;
        let current: ApprovalStatus = conn
            .query_row("SELECT status FROM approvals WHERE id = ?1", params![id.0], |r| {
                let s: String = r.get(0)?;
                Ok(parse_approval_status(&s))
            })
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Approval",
                id: id.0.clone(),
            })?;

        if current != ApprovalStatus::Pending {
            return Err(StoreError::Conflict {
                entity: "Approval",
                id: id.0.clone(),
                from: format!("{current:?}"),
                to: if approve { "approved".into() } else { "rejected".into() },
            });
        }

        let new_status = if approve { "approved" } else { "rejected" };
        with_retry!(conn.execute("UPDATE approvals SET status = ?2 WHERE id = ?1", params![id.0, new_status]))?;
        drop(conn);

        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT id, objective_id, quest_id, kind, status, created_at FROM approvals WHERE id = ?1",
            params![id.0],
            row_to_approval,
        )
        .map_err(StoreError::Backend)
    }
}

fn session_transition_allowed(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::*;
    matches!(
        (from, to),
        (Running, Paused) | (Paused, Running) | (Running, Completed) | (Running, Failed) | (Running, Cancelled) | (Paused, Cancelled)
    )
}

/// DFS from `depends_on` limited to the reachable subgraph, looking for a
/// path back to `objective_id` (which would close a cycle once the new
/// edge `objective_id -> depends_on` is added).
fn would_create_cycle(conn: &Connection, objective_id: &ObjectiveId, depends_on: &ObjectiveId) -> rusqlite::Result<bool> {
    let mut visited: HashSet<String> = HashSet::new();
    let mut stack: VecDeque<String> = VecDeque::from([depends_on.0.clone()]);

    while let Some(node) = stack.pop_front() {
        if node == objective_id.0 {
            return Ok(true);
        }
        if !visited.insert(node.clone()) {
            continue;
        }
        let mut stmt = conn.prepare("SELECT depends_on FROM task_dependencies WHERE objective_id = ?1")?;
        let next: Vec<String> = stmt
            .query_map(params![node], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        stack.extend(next);
    }
    Ok(false)
}

fn decrement_dependents(conn: &Connection, completed: &ObjectiveId) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE tasks SET unsatisfied_deps = unsatisfied_deps - 1
         WHERE id IN (SELECT objective_id FROM task_dependencies WHERE depends_on = ?1)",
        params![completed.0],
    )?;
    Ok(())
}

fn quest_status_str(s: QuestStatus) -> &'static str {
    match s {
        QuestStatus::Active => "active",
        QuestStatus::Completed => "completed",
        QuestStatus::Abandoned => "abandoned",
    }
}

fn parse_quest_status(s: &str) -> QuestStatus {
    match s {
        "completed" => QuestStatus::Completed,
        "abandoned" => QuestStatus::Abandoned,
        _ => QuestStatus::Active,
    }
}

fn parse_objective_status(s: &str) -> ObjectiveStatus {
    use ObjectiveStatus::*;
    match s {
        "pending" => Pending,
        "ready" => Ready,
        "planning" => Planning,
        "running" => Running,
        "paused" => Paused,
        "completed" => Completed,
        "failed" => Failed,
        _ => Cancelled,
    }
}

fn parse_session_status(s: &str) -> SessionStatus {
    use SessionStatus::*;
    match s {
        "running" => Running,
        "paused" => Paused,
        "completed" => Completed,
        "failed" => Failed,
        _ => Cancelled,
    }
}

fn parse_approval_status(s: &str) -> ApprovalStatus {
    match s {
        "approved" => ApprovalStatus::Approved,
        "rejected" => ApprovalStatus::Rejected,
        _ => ApprovalStatus::Pending,
    }
}

fn approval_type_str(k: ApprovalType) -> &'static str {
    match k {
        ApprovalType::Commit => "commit",
        ApprovalType::Pr => "pr",
        ApprovalType::Merge => "merge",
        ApprovalType::RoleTransition => "role_transition",
    }
}

fn outcome_str(o: SessionOutcome) -> &'static str {
    match o {
        SessionOutcome::Ok => "ok",
        SessionOutcome::Incomplete => "incomplete",
        SessionOutcome::Budget => "budget",
        SessionOutcome::LoopCap => "loop_cap",
        SessionOutcome::Cancelled => "cancelled",
        SessionOutcome::Error => "error",
    }
}

fn tier_str(t: ModelTier) -> &'static str {
    match t {
        ModelTier::Fast => "fast",
        ModelTier::Capable => "capable",
    }
}

fn role_str(r: MessageRole) -> &'static str {
    match r {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn row_to_project(r: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: ProjectId(r.get(0)?),
        name: r.get(1)?,
        repo_path: r.get(2)?,
        created_at: parse_dt(r.get::<_, String>(3)?),
    })
}

fn row_to_quest(r: &rusqlite::Row) -> rusqlite::Result<Quest> {
    let status: String = r.get(3)?;
    let tier: String = r.get(4)?;
    Ok(Quest {
        id: QuestId(r.get(0)?),
        project_id: ProjectId(r.get(1)?),
        title: r.get(2)?,
        status: parse_quest_status(&status),
        tier: if tier == "fast" { ModelTier::Fast } else { ModelTier::Capable },
        created_at: parse_dt(r.get::<_, String>(5)?),
    })
}

fn row_to_message(r: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role: String = r.get(2)?;
    Ok(Message {
        id: r.get(0)?,
        quest_id: QuestId(r.get(1)?),
        role: if role == "user" { MessageRole::User } else { MessageRole::Assistant },
        content: r.get(3)?,
        tool_calls_json: r.get(4)?,
        created_at: parse_dt(r.get::<_, String>(5)?),
    })
}

fn row_to_objective(r: &rusqlite::Row) -> rusqlite::Result<Objective> {
    let role: String = r.get(5)?;
    let priority: u8 = r.get(6)?;
    let tier: String = r.get(7)?;
    let status: String = r.get(8)?;
    Ok(Objective {
        id: ObjectiveId(r.get(0)?),
        project_id: ProjectId(r.get(1)?),
        quest_id: r.get::<_, Option<String>>(2)?.map(QuestId),
        title: r.get(3)?,
        description: r.get(4)?,
        role: role.parse().unwrap_or(Role::Explorer),
        priority: Priority::new(priority).unwrap_or_default(),
        tier: if tier == "fast" { ModelTier::Fast } else { ModelTier::Capable },
        status: parse_objective_status(&status),
        base_branch: r.get(9)?,
        worktree_path: r.get(10)?,
        branch_name: r.get(11)?,
        total_input_tokens: r.get::<_, i64>(12)? as u64,
        total_output_tokens: r.get::<_, i64>(13)? as u64,
        total_cost_cents: r.get::<_, i64>(14)? as u64,
        unsatisfied_deps: r.get(15)?,
        created_at: parse_dt(r.get::<_, String>(16)?),
    })
}

fn row_to_checklist_item(r: &rusqlite::Row) -> rusqlite::Result<ChecklistItem> {
    let must_have: i64 = r.get(4)?;
    let status: String = r.get(5)?;
    Ok(ChecklistItem {
        id: r.get(0)?,
        objective_id: ObjectiveId(r.get(1)?),
        ordinal: r.get(2)?,
        description: r.get(3)?,
        must_have: must_have != 0,
        status: match status.as_str() {
            "done" => ChecklistStatus::Done,
            "failed" => ChecklistStatus::Failed,
            "skipped" => ChecklistStatus::Skipped,
            _ => ChecklistStatus::Pending,
        },
    })
}

fn row_to_session(r: &rusqlite::Row) -> rusqlite::Result<Session> {
    let status: String = r.get(2)?;
    let outcome: Option<String> = r.get(4)?;
    let role: String = r.get(5)?;
    Ok(Session {
        id: SessionId(r.get(0)?),
        objective_id: ObjectiveId(r.get(1)?),
        status: parse_session_status(&status),
        iteration_count: r.get(3)?,
        outcome: outcome.map(|o| match o.as_str() {
            "incomplete" => SessionOutcome::Incomplete,
            "budget" => SessionOutcome::Budget,
            "loop_cap" => SessionOutcome::LoopCap,
            "cancelled" => SessionOutcome::Cancelled,
            "error" => SessionOutcome::Error,
            _ => SessionOutcome::Ok,
        }),
        current_role: role.parse().unwrap_or(Role::Explorer),
        created_at: parse_dt(r.get::<_, String>(6)?),
    })
}

fn row_to_checkpoint(r: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
    let role: String = r.get(3)?;
    Ok(Checkpoint {
        id: CheckpointId(r.get(0)?),
        session_id: SessionId(r.get(1)?),
        last_assistant_message: r.get(2)?,
        current_role: role.parse().unwrap_or(Role::Explorer),
        iteration: r.get(4)?,
        budget_remaining_tokens: r.get::<_, i64>(5)? as u64,
        budget_remaining_cents: r.get::<_, i64>(6)? as u64,
        created_at: parse_dt(r.get::<_, String>(7)?),
    })
}

fn row_to_approval(r: &rusqlite::Row) -> rusqlite::Result<Approval> {
    let kind: String = r.get(3)?;
    let status: String = r.get(4)?;
    Ok(Approval {
        id: ApprovalId(r.get(0)?),
        objective_id: r.get::<_, Option<String>>(1)?.map(ObjectiveId),
        quest_id: r.get::<_, Option<String>>(2)?.map(QuestId),
        kind: match kind.as_str() {
            "pr" => ApprovalType::Pr,
            "merge" => ApprovalType::Merge,
            "role_transition" => ApprovalType::RoleTransition,
            _ => ApprovalType::Commit,
        },
        status: parse_approval_status(&status),
        created_at: parse_dt(r.get::<_, String>(5)?),
    })
}

fn parse_dt(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unblocked_pending_objective_is_not_ready_until_promoted() {
        let store = Store::open_in_memory().await.unwrap();
        let project = store.create_project("demo", "/repo").await.unwrap();
        let blocker = store
            .create_objective(&project.id, None, "Design schema", "", Role::Designer, Priority::default(), ModelTier::Fast, "main", &[])
            .await
            .unwrap();
        let blocked = store
            .create_objective(&project.id, None, "Implement schema", "", Role::Creator, Priority::default(), ModelTier::Fast, "main", &[])
            .await
            .unwrap();
        store.add_dependency(&blocked.id, &blocker.id).await.unwrap();

        // `blocked` itself is excluded (unsatisfied_deps = 1); `blocker`
        // has no dependencies of its own, so it already qualifies.
        let unblocked = store.list_unblocked_pending(&project.id).await.unwrap();
        assert_eq!(unblocked.len(), 1);
        assert_eq!(unblocked[0].id, blocker.id);

        store.transition_objective(&blocker.id, ObjectiveStatus::Ready).await.unwrap();
        store.transition_objective(&blocker.id, ObjectiveStatus::Planning).await.unwrap();
        store.transition_objective(&blocker.id, ObjectiveStatus::Running).await.unwrap();
        store.transition_objective(&blocker.id, ObjectiveStatus::Completed).await.unwrap();

        let unblocked = store.list_unblocked_pending(&project.id).await.unwrap();
        assert_eq!(unblocked.len(), 1);
        assert_eq!(unblocked[0].id, blocked.id);

        store.transition_objective(&blocked.id, ObjectiveStatus::Ready).await.unwrap();
        assert!(store.list_unblocked_pending(&project.id).await.unwrap().is_empty());
        assert_eq!(store.list_ready_objectives(&project.id).await.unwrap().len(), 1);
    }
}
