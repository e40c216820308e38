//! The Scheduler: the single long-lived coordinator that turns ready
//! objectives into running SessionLoops, subject to a concurrency cap,
//! and carries out pause/resume/cancel requests against them.
//!
//! The priority queue itself lives in `store` (`Store::list_ready_objectives`
//! already orders by `(priority asc, created_at asc)` and recomputes
//! dependency counts on completion), so this is an admission loop on top
//! of that query rather than a second in-memory queue.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};

use store::{ModelTier, Objective, ObjectiveId, ObjectiveStatus, ProjectId, SessionOutcome, SessionStatus, Store, WorkspaceFields};

use crate::config::ConcurrencyConfig;
use crate::events::{EventBus, task_channel};
use crate::llm::LlmClient;
use crate::r#loop::{BudgetEnvelope, SessionControl, SessionLoop};
use crate::workspace::{WorkspaceHandle, WorkspaceManager};

use super::config::SchedulerConfig;
use super::queue::ActiveSession;

pub struct Scheduler {
    store: Store,
    bus: Arc<EventBus>,
    workspace: Arc<WorkspaceManager>,
    capable_llm: Arc<dyn LlmClient>,
    fast_llm: Arc<dyn LlmClient>,
    concurrency: ConcurrencyConfig,
    config: SchedulerConfig,
    max_tokens: u32,
    projects: Mutex<HashSet<ProjectId>>,
    active: Mutex<HashMap<ObjectiveId, ActiveSession>>,
    notify: Notify,
    shutdown: AtomicBool,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        bus: Arc<EventBus>,
        workspace: Arc<WorkspaceManager>,
        capable_llm: Arc<dyn LlmClient>,
        fast_llm: Arc<dyn LlmClient>,
        concurrency: ConcurrencyConfig,
        config: SchedulerConfig,
        max_tokens: u32,
    ) -> Self {
        Self {
            store,
            bus,
            workspace,
            capable_llm,
            fast_llm,
            concurrency,
            config,
            max_tokens,
            projects: Mutex::new(HashSet::new()),
            active: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            shutdown: AtomicBool::new(false),
        }
    }

    fn client_for(&self, tier: ModelTier) -> &Arc<dyn LlmClient> {
        match tier {
            ModelTier::Capable => &self.capable_llm,
            ModelTier::Fast => &self.fast_llm,
        }
    }

    /// Registers `objective`'s project for admission consideration and
    /// promotes it to `ready` immediately if it has no unsatisfied
    /// dependencies yet. Wakes the admission loop.
    pub async fn submit(&self, objective: &Objective) -> eyre::Result<()> {
        debug!(objective_id = %objective.id, "Scheduler::submit: called");
        self.projects.lock().await.insert(objective.project_id.clone());
        if objective.status == ObjectiveStatus::Pending && objective.unsatisfied_deps == 0 {
            self.store.transition_objective(&objective.id, ObjectiveStatus::Ready).await?;
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Runs the admission loop until [`Scheduler::shutdown`] is called.
    /// Intended to be spawned once as its own long-lived task.
    pub async fn run(self: Arc<Self>) {
        info!("Scheduler::run: admission loop starting");
        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(e) = self.recompute_readiness().await {
                warn!(error = %e, "Scheduler::run: readiness recompute failed");
            }
            if let Err(e) = self.admit_ready().await {
                warn!(error = %e, "Scheduler::run: admission cycle failed");
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        info!("Scheduler::run: admission loop stopped");
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Promotes pending objectives whose dependencies have all completed
    /// to `ready`. `decrement_dependents` only updates the counter on a
    /// completion; this is the other half of readiness recomputation.
    async fn recompute_readiness(&self) -> eyre::Result<()> {
        let projects: Vec<ProjectId> = self.projects.lock().await.iter().cloned().collect();
        for project_id in projects {
            for objective in self.store.list_unblocked_pending(&project_id).await? {
                self.store.transition_objective(&objective.id, ObjectiveStatus::Ready).await?;
            }
        }
        Ok(())
    }

    /// Admits ready objectives, highest priority (lowest number) and
    /// earliest-submitted first, until the concurrency cap is reached.
    async fn admit_ready(self: &Arc<Self>) -> eyre::Result<()> {
        let projects: Vec<ProjectId> = self.projects.lock().await.iter().cloned().collect();
        let mut candidates = Vec::new();
        for project_id in projects {
            candidates.extend(self.store.list_ready_objectives(&project_id).await?);
        }
        candidates.sort_by_key(|o| (o.priority.get(), o.created_at));

        for objective in candidates {
            if self.active.lock().await.len() as u32 >= self.config.max_concurrent {
                break;
            }
            if self.active.lock().await.contains_key(&objective.id) {
                continue;
            }
            let objective_id = objective.id.clone();
            if let Err(e) = self.admit(objective).await {
                warn!(objective_id = %objective_id, error = %e, "Scheduler::admit_ready: admission failed");
            }
        }
        Ok(())
    }

    /// Allocates a workspace and session for `objective` and spawns a
    /// SessionLoop worker for it. On failure, rolls the workspace and
    /// objective status back; a failing admission never stops the
    /// scheduler.
    async fn admit(self: &Arc<Self>, objective: Objective) -> eyre::Result<()> {
        debug!(objective_id = %objective.id, "Scheduler::admit: called");
        let project = self.store.get_project(&objective.project_id).await?;
        self.store.transition_objective(&objective.id, ObjectiveStatus::Planning).await?;

        let handle = match self.workspace.allocate(&project, &objective, &objective.base_branch).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(objective_id = %objective.id, error = %e, "Scheduler::admit: workspace allocation failed");
                self.store.transition_objective(&objective.id, ObjectiveStatus::Cancelled).await?;
                self.bus.channel(task_channel(objective.id.as_str())).publish(
                    "task.admission_failed",
                    serde_json::json!({ "objective_id": objective.id.to_string(), "reason": e.to_string() }),
                );
                return Ok(());
            }
        };

        self.store
            .set_workspace(
                &objective.id,
                WorkspaceFields {
                    worktree_path: Some(handle.path.to_string_lossy().into_owned()),
                    branch_name: Some(handle.branch.clone()),
                },
            )
            .await?;

        let session = match self.store.create_session(&objective.id, objective.role).await {
            Ok(session) => session,
            Err(e) => {
                warn!(objective_id = %objective.id, error = %e, "Scheduler::admit: session creation failed");
                let _ = self.workspace.release(Path::new(&project.repo_path), &handle, true).await;
                self.store.transition_objective(&objective.id, ObjectiveStatus::Cancelled).await?;
                return Ok(());
            }
        };

        let objective = self.store.transition_objective(&objective.id, ObjectiveStatus::Running).await?;

        let control = SessionControl::new();
        self.active.lock().await.insert(objective.id.clone(), ActiveSession::new(session.id.clone(), control.clone()));

        let session_loop = SessionLoop::new(
            self.store.clone(),
            Arc::clone(&self.bus),
            Arc::clone(self.client_for(objective.tier)),
            objective.tier,
            Arc::clone(&self.workspace),
            BudgetEnvelope::for_tier(objective.tier, &self.concurrency),
            self.max_tokens,
        );
        let worktree = handle.path.clone();
        let repo_root = PathBuf::from(project.repo_path.clone());
        let scheduler = Arc::clone(self);
        let objective_id = objective.id.clone();

        tokio::spawn(async move {
            if let Err(e) = session_loop.run(&session, &objective, &worktree, &repo_root, &control).await {
                warn!(objective_id = %objective_id, error = %e, "Scheduler: session loop returned an error");
            }
            scheduler.finish(objective_id).await;
        });

        Ok(())
    }

    /// Called by a worker task when `SessionLoop::run` returns. Clears
    /// the active slot on a terminal outcome; on a pause, the objective
    /// stays active (its worktree is still held) but idle until resumed.
    async fn finish(self: &Arc<Self>, objective_id: ObjectiveId) {
        let objective = match self.store.get_objective(&objective_id).await {
            Ok(o) => o,
            Err(e) => {
                warn!(%objective_id, error = %e, "Scheduler::finish: couldn't look up the objective");
                self.active.lock().await.remove(&objective_id);
                self.notify.notify_one();
                return;
            }
        };

        if objective.status == ObjectiveStatus::Paused {
            if let Some(active) = self.active.lock().await.get_mut(&objective_id) {
                active.running = false;
            }
            return;
        }

        self.active.lock().await.remove(&objective_id);
        self.notify.notify_one();
    }

    /// Signals the running worker for `objective_id` to pause at its
    /// next iteration boundary.
    pub async fn pause(&self, objective_id: &ObjectiveId) -> eyre::Result<()> {
        let control = {
            let active = self.active.lock().await;
            let entry = active.get(objective_id).ok_or_else(|| eyre::eyre!("objective {objective_id} is not active"))?;
            entry.control.clone()
        };
        control.pause();
        self.store.transition_objective(objective_id, ObjectiveStatus::Paused).await?;
        Ok(())
    }

    /// Re-spawns a worker for a paused objective. The SessionLoop
    /// resumes from its latest checkpoint.
    pub async fn resume(self: &Arc<Self>, objective_id: &ObjectiveId) -> eyre::Result<()> {
        let (session_id, control) = {
            let mut active = self.active.lock().await;
            let entry = active.get_mut(objective_id).ok_or_else(|| eyre::eyre!("objective {objective_id} is not active"))?;
            if entry.running {
                return Ok(());
            }
            entry.control = SessionControl::new();
            entry.running = true;
            (entry.session_id.clone(), entry.control.clone())
        };

        let objective = self.store.get_objective(objective_id).await?;
        let project = self.store.get_project(&objective.project_id).await?;
        let session = self.store.get_session(&session_id).await?;
        self.store.transition_objective(objective_id, ObjectiveStatus::Running).await?;

        let worktree = objective
            .worktree_path
            .as_ref()
            .map(PathBuf::from)
            .ok_or_else(|| eyre::eyre!("objective {objective_id} has no worktree to resume into"))?;
        let repo_root = PathBuf::from(project.repo_path.clone());

        let session_loop = SessionLoop::new(
            self.store.clone(),
            Arc::clone(&self.bus),
            Arc::clone(self.client_for(objective.tier)),
            objective.tier,
            Arc::clone(&self.workspace),
            BudgetEnvelope::for_tier(objective.tier, &self.concurrency),
            self.max_tokens,
        );
        let scheduler = Arc::clone(self);
        let objective_id = objective_id.clone();

        tokio::spawn(async move {
            if let Err(e) = session_loop.run(&session, &objective, &worktree, &repo_root, &control).await {
                warn!(%objective_id, error = %e, "Scheduler: resumed session loop returned an error");
            }
            scheduler.finish(objective_id).await;
        });

        Ok(())
    }

    /// Cancels `objective_id`, wherever it currently sits: queued and
    /// never admitted, actively running, or paused with its worktree
    /// still held.
    pub async fn cancel(&self, objective_id: &ObjectiveId) -> eyre::Result<()> {
        let entry = self.active.lock().await.get(objective_id).map(|a| (a.session_id.clone(), a.control.clone(), a.running));

        match entry {
            Some((_, control, true)) => {
                control.cancel();
                Ok(())
            }
            Some((session_id, _, false)) => {
                let objective = self.store.get_objective(objective_id).await?;
                self.store.transition_session(&session_id, SessionStatus::Cancelled, Some(SessionOutcome::Cancelled)).await?;
                self.store.transition_objective(objective_id, ObjectiveStatus::Cancelled).await?;
                if let Some(worktree_path) = &objective.worktree_path {
                    let project = self.store.get_project(&objective.project_id).await?;
                    let branch = objective.branch_name.clone().unwrap_or_else(|| format!("task/{}", objective.id));
                    let handle = WorkspaceHandle { objective_id: objective.id.clone(), path: PathBuf::from(worktree_path), branch };
                    let _ = self.workspace.release(Path::new(&project.repo_path), &handle, false).await;
                }
                self.active.lock().await.remove(objective_id);
                self.notify.notify_one();
                Ok(())
            }
            None => {
                let objective = self.store.get_objective(objective_id).await?;
                if objective.status == ObjectiveStatus::Pending {
                    // `pending` has no direct edge to `cancelled`; a
                    // blocked objective passes through `ready` first.
                    self.store.transition_objective(objective_id, ObjectiveStatus::Ready).await?;
                }
                self.store.transition_objective(objective_id, ObjectiveStatus::Cancelled).await?;
                self.notify.notify_one();
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GitConfig;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use std::process::Command as StdCommand;
    use store::{ModelTier, Priority, Role};
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        let run = |args: &[&str]| {
            StdCommand::new("git").args(args).current_dir(dir).output().unwrap();
        };
        // Forced explicitly: host git config may default init.defaultBranch
        // to something other than "master", which `create_objective`'s
        // base branch below assumes.
        run(&["init", "-q", "-b", "master"]);
        run(&["config", "user.email", "test@example.com"]);
        run(&["config", "user.name", "test"]);
        std::fs::write(dir.join("README.md"), "hello").unwrap();
        run(&["add", "."]);
        run(&["commit", "-q", "-m", "initial"]);
    }

    async fn new_scheduler(repo_dir: &Path, response: CompletionResponse, max_concurrent: u32) -> Arc<Scheduler> {
        let store = Store::open_in_memory().await.unwrap();
        let bus = crate::events::create_event_bus();
        let workspace = Arc::new(WorkspaceManager::new(GitConfig { worktree_dir: repo_dir.to_path_buf(), disk_quota_gb: 0 }));
        let llm: Arc<dyn LlmClient> = Arc::new(MockLlmClient::new(vec![response]));
        Arc::new(Scheduler::new(
            store,
            bus,
            workspace,
            Arc::clone(&llm),
            llm,
            ConcurrencyConfig::default(),
            SchedulerConfig::new(max_concurrent),
            4096,
        ))
    }

    #[tokio::test]
    async fn submit_promotes_a_dependency_free_objective_to_ready() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        let response =
            CompletionResponse { content: Some("TASK_COMPLETE".to_string()), tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() };
        let scheduler = new_scheduler(temp.path(), response, 5).await;

        let project = scheduler.store.create_project("demo", temp.path().to_str().unwrap()).await.unwrap();
        let objective = scheduler
            .store
            .create_objective(&project.id, None, "Add login", "implement OAuth login", Role::Creator, Priority::default(), ModelTier::Fast, "master", &[])
            .await
            .unwrap();

        scheduler.submit(&objective).await.unwrap();

        let updated = scheduler.store.get_objective(&objective.id).await.unwrap();
        assert_eq!(updated.status, ObjectiveStatus::Ready);
    }

    #[tokio::test]
    async fn admission_runs_the_session_loop_to_completion_and_clears_the_active_slot() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        let response =
            CompletionResponse { content: Some("TASK_COMPLETE".to_string()), tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() };
        let scheduler = new_scheduler(temp.path(), response, 5).await;

        let project = scheduler.store.create_project("demo", temp.path().to_str().unwrap()).await.unwrap();
        let objective = scheduler
            .store
            .create_objective(&project.id, None, "Add login", "implement OAuth login", Role::Creator, Priority::default(), ModelTier::Fast, "master", &[])
            .await
            .unwrap();
        scheduler.submit(&objective).await.unwrap();

        scheduler.admit_ready().await.unwrap();
        assert_eq!(scheduler.active.lock().await.len(), 1);

        while !scheduler.active.lock().await.is_empty() {
            tokio::task::yield_now().await;
        }

        let updated = scheduler.store.get_objective(&objective.id).await.unwrap();
        assert_eq!(updated.status, ObjectiveStatus::Completed);
    }

    #[tokio::test]
    async fn admission_cap_leaves_extra_ready_objectives_unadmitted() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        let response = CompletionResponse { content: None, tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() };
        let scheduler = new_scheduler(temp.path(), response, 0).await;

        let project = scheduler.store.create_project("demo", temp.path().to_str().unwrap()).await.unwrap();
        let objective = scheduler
            .store
            .create_objective(&project.id, None, "Add login", "implement OAuth login", Role::Creator, Priority::default(), ModelTier::Fast, "master", &[])
            .await
            .unwrap();
        scheduler.submit(&objective).await.unwrap();

        scheduler.admit_ready().await.unwrap();

        assert!(scheduler.active.lock().await.is_empty());
        let updated = scheduler.store.get_objective(&objective.id).await.unwrap();
        assert_eq!(updated.status, ObjectiveStatus::Ready);
    }

    #[tokio::test]
    async fn cancelling_a_queued_objective_that_was_never_admitted() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        let response = CompletionResponse { content: None, tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() };
        let scheduler = new_scheduler(temp.path(), response, 5).await;

        let project = scheduler.store.create_project("demo", temp.path().to_str().unwrap()).await.unwrap();
        let objective = scheduler
            .store
            .create_objective(&project.id, None, "Add login", "implement OAuth login", Role::Creator, Priority::default(), ModelTier::Fast, "master", &[])
            .await
            .unwrap();
        scheduler.submit(&objective).await.unwrap();

        scheduler.cancel(&objective.id).await.unwrap();

        let updated = scheduler.store.get_objective(&objective.id).await.unwrap();
        assert_eq!(updated.status, ObjectiveStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancelling_a_still_blocked_objective_that_was_never_submitted() {
        let temp = tempdir().unwrap();
        init_repo(temp.path());
        let response = CompletionResponse { content: None, tool_calls: vec![], stop_reason: StopReason::EndTurn, usage: TokenUsage::default() };
        let scheduler = new_scheduler(temp.path(), response, 5).await;

        let project = scheduler.store.create_project("demo", temp.path().to_str().unwrap()).await.unwrap();
        let blocker = scheduler
            .store
            .create_objective(&project.id, None, "Design schema", "", Role::Designer, Priority::default(), ModelTier::Fast, "master", &[])
            .await
            .unwrap();
        let blocked = scheduler
            .store
            .create_objective(&project.id, None, "Add login", "implement OAuth login", Role::Creator, Priority::default(), ModelTier::Fast, "master", &[])
            .await
            .unwrap();
        scheduler.store.add_dependency(&blocked.id, &blocker.id).await.unwrap();
        assert_eq!(blocked.status, ObjectiveStatus::Pending);

        scheduler.cancel(&blocked.id).await.unwrap();

        let updated = scheduler.store.get_objective(&blocked.id).await.unwrap();
        assert_eq!(updated.status, ObjectiveStatus::Cancelled);
    }
}
