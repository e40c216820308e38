//! Persisted entities and their lifecycle enums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ApprovalId, CheckpointId, ObjectiveId, ProjectId, QuestId, SessionId};
use crate::record::Record;

/// Root of a repository tree. Immutable once created except for metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub repo_path: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Project {
    fn table() -> &'static str {
        "projects"
    }
    fn id(&self) -> &str {
        &self.id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Completed,
    Abandoned,
}

impl std::fmt::Display for QuestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Fast,
    Capable,
}

/// A planning conversation belonging to a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    pub id: QuestId,
    pub project_id: ProjectId,
    /// Set lazily from the first user message; empty until then.
    pub title: String,
    pub status: QuestStatus,
    pub tier: ModelTier,
    pub created_at: DateTime<Utc>,
}

impl Record for Quest {
    fn table() -> &'static str {
        "quests"
    }
    fn id(&self) -> &str {
        &self.id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn in a quest conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub quest_id: QuestId,
    pub role: MessageRole,
    pub content: String,
    /// JSON-encoded tool-call log for assistant messages, empty for user messages.
    pub tool_calls_json: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Message {
    fn table() -> &'static str {
        "quest_messages"
    }
    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveStatus {
    Pending,
    Ready,
    Planning,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for ObjectiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Planning => "planning",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// A tag controlling which prompt template seeds a session, drawn from a
/// closed set. Starting roles have no incoming edges in the role graph
/// requirement sense; terminal roles have no outgoing edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Explorer,
    Planner,
    Designer,
    Creator,
    Critic,
    Editor,
    Resolver,
    Documenter,
    Devops,
}

impl Role {
    pub const STARTING: [Role; 4] = [Role::Explorer, Role::Planner, Role::Designer, Role::Creator];
    pub const TERMINAL: [Role; 3] = [Role::Documenter, Role::Devops, Role::Resolver];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Explorer => "explorer",
            Self::Planner => "planner",
            Self::Designer => "designer",
            Self::Creator => "creator",
            Self::Critic => "critic",
            Self::Editor => "editor",
            Self::Resolver => "resolver",
            Self::Documenter => "documenter",
            Self::Devops => "devops",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "explorer" => Ok(Self::Explorer),
            "planner" => Ok(Self::Planner),
            "designer" => Ok(Self::Designer),
            "creator" => Ok(Self::Creator),
            "critic" => Ok(Self::Critic),
            "editor" => Ok(Self::Editor),
            "resolver" => Ok(Self::Resolver),
            "documenter" => Ok(Self::Documenter),
            "devops" => Ok(Self::Devops),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// Priority 1 (critical) .. 5 (low), per the source's hand-tuned scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Priority(u8);

impl Priority {
    pub fn new(value: u8) -> Option<Self> {
        (1..=5).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(3)
    }
}

/// The unit of work a worker agent attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Objective {
    pub id: ObjectiveId,
    pub project_id: ProjectId,
    pub quest_id: Option<QuestId>,
    pub title: String,
    pub description: String,
    pub role: Role,
    pub priority: Priority,
    pub tier: ModelTier,
    pub status: ObjectiveStatus,
    pub base_branch: String,
    pub worktree_path: Option<String>,
    pub branch_name: Option<String>,
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost_cents: u64,
    /// Count of unsatisfied predecessors; zero means unblocked.
    pub unsatisfied_deps: u32,
    pub created_at: DateTime<Utc>,
}

impl Objective {
    pub fn is_blocked(&self) -> bool {
        self.unsatisfied_deps > 0
    }
}

impl Record for Objective {
    fn table() -> &'static str {
        "tasks"
    }
    fn id(&self) -> &str {
        &self.id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    Pending,
    Done,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub objective_id: ObjectiveId,
    pub ordinal: u32,
    pub description: String,
    pub must_have: bool,
    pub status: ChecklistStatus,
}

impl Record for ChecklistItem {
    fn table() -> &'static str {
        "checklist_items"
    }
    fn id(&self) -> &str {
        &self.id
    }
}

/// Objective -> Objective; the edge means the first depends on the second.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub objective_id: ObjectiveId,
    pub depends_on: ObjectiveId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Ok,
    Incomplete,
    Budget,
    LoopCap,
    Cancelled,
    Error,
}

/// One attempt at completing an objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub objective_id: ObjectiveId,
    pub status: SessionStatus,
    pub iteration_count: u32,
    pub outcome: Option<SessionOutcome>,
    pub current_role: Role,
    pub created_at: DateTime<Utc>,
}

impl Record for Session {
    fn table() -> &'static str {
        "sessions"
    }
    fn id(&self) -> &str {
        &self.id.0
    }
}

/// Per-step metrics for one iteration of a session, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub session_id: SessionId,
    pub iteration: u32,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_cents: u64,
    /// JSON-encoded `[{name, truncated_output, is_error, duration_ms}]`.
    pub tool_calls_json: String,
    pub context_used_tokens: u64,
    pub context_max_tokens: u64,
    pub created_at: DateTime<Utc>,
}

impl Record for IterationRecord {
    fn table() -> &'static str {
        "iterations"
    }
    fn id(&self) -> &str {
        // Iterations key on (session_id, iteration); callers that need a
        // single string key should use the composite accessor instead.
        &self.session_id.0
    }
}

/// Periodic durable snapshot permitting session resume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub session_id: SessionId,
    pub last_assistant_message: String,
    pub current_role: Role,
    pub iteration: u32,
    pub budget_remaining_tokens: u64,
    pub budget_remaining_cents: u64,
    pub created_at: DateTime<Utc>,
}

impl Record for Checkpoint {
    fn table() -> &'static str {
        "checkpoints"
    }
    fn id(&self) -> &str {
        &self.id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    Commit,
    Pr,
    Merge,
    RoleTransition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

/// Pending human decision attached to an objective or quest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub objective_id: Option<ObjectiveId>,
    pub quest_id: Option<QuestId>,
    pub kind: ApprovalType,
    pub status: ApprovalStatus,
    pub created_at: DateTime<Utc>,
}

impl Record for Approval {
    fn table() -> &'static str {
        "approvals"
    }
    fn id(&self) -> &str {
        &self.id.0
    }
}
