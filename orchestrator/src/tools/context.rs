//! `ToolContext` - execution context for tools.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use store::{ProjectId, QuestId, Store};

use super::ToolError;

/// The suspend/resume gateway for `ask_question` and `propose_objective`.
/// Implemented by the quest engine so the tools module stays decoupled
/// from it; only one call may be outstanding per quest at a time, which
/// the implementation (not the tool) is responsible for enforcing.
#[async_trait]
pub trait BlockingGateway: Send + Sync {
    /// Broadcasts a question, suspends until `DeliverAnswer` or cancellation.
    async fn ask_question(&self, question: &str, options: Option<Vec<String>>) -> eyre::Result<String>;

    /// Broadcasts an objective draft, suspends until accepted/rejected.
    async fn propose_objective(&self, draft_json: serde_json::Value) -> eyre::Result<String>;
}

pub type BlockingGatewayRef = Arc<dyn BlockingGateway>;

/// Execution context for tools, scoped to a single quest turn or session
/// iteration. File operations are confined to `worktree` unless the
/// sandbox is explicitly disabled (tests only).
#[derive(Clone)]
pub struct ToolContext {
    /// Root all file operations are confined to. For a QuestEngine turn
    /// this is the project's repo root (read-only tool set); for a
    /// SessionLoop iteration it is the objective's git worktree.
    pub worktree: PathBuf,

    /// Quest or session id, for attributing emitted events.
    pub exec_id: String,

    read_files: Arc<Mutex<HashSet<PathBuf>>>,

    pub sandbox_enabled: bool,

    pub max_tokens: u32,

    /// Present only when `ask_question`/`propose_objective` are in the
    /// active tool set (i.e. a QuestEngine turn, not a SessionLoop).
    pub blocking: Option<BlockingGatewayRef>,

    /// Present for QuestEngine turns, where `complete_quest`,
    /// `list_objectives`, `get_objective_details` and `cancel_objective`
    /// read and mutate durable state directly.
    pub store: Option<Store>,
    pub project_id: Option<ProjectId>,
    pub quest_id: Option<QuestId>,
}

const DEFAULT_MAX_TOKENS: u32 = 16384;

impl ToolContext {
    pub fn new(worktree: PathBuf, exec_id: String) -> Self {
        debug!(?worktree, %exec_id, "ToolContext::new: called");
        Self {
            worktree,
            exec_id,
            read_files: Arc::new(Mutex::new(HashSet::new())),
            sandbox_enabled: true,
            max_tokens: DEFAULT_MAX_TOKENS,
            blocking: None,
            store: None,
            project_id: None,
            quest_id: None,
        }
    }

    /// Context for a QuestEngine turn: adds store access and the blocking
    /// gateway, scoped to one project/quest.
    pub fn for_quest(worktree: PathBuf, project_id: ProjectId, quest_id: QuestId, store: Store, blocking: BlockingGatewayRef) -> Self {
        Self {
            store: Some(store),
            project_id: Some(project_id),
            quest_id: Some(quest_id.clone()),
            blocking: Some(blocking),
            ..Self::new(worktree, quest_id.to_string())
        }
    }

    pub fn with_max_tokens(worktree: PathBuf, exec_id: String, max_tokens: u32) -> Self {
        Self {
            max_tokens,
            ..Self::new(worktree, exec_id)
        }
    }

    /// Context with sandbox disabled, for unit tests only.
    pub fn new_unsandboxed(worktree: PathBuf, exec_id: String) -> Self {
        Self {
            sandbox_enabled: false,
            ..Self::new(worktree, exec_id)
        }
    }

    pub fn with_blocking_gateway(mut self, gateway: BlockingGatewayRef) -> Self {
        self.blocking = Some(gateway);
        self
    }

    /// Track that a file was read, a precondition `edit_file` enforces.
    pub async fn track_read(&self, path: &Path) {
        let mut read_files = self.read_files.lock().await;
        read_files.insert(self.normalize_path(path));
    }

    pub async fn was_read(&self, path: &Path) -> bool {
        let read_files = self.read_files.lock().await;
        read_files.contains(&self.normalize_path(path))
    }

    pub async fn clear_reads(&self) {
        self.read_files.lock().await.clear();
    }

    fn normalize_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.worktree.join(path)
        }
    }

    /// Resolves `path` against `worktree` and rejects it if the resolved
    /// location escapes the worktree root, symlinks included.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        let normalized = self.normalize_path(path);

        if !self.sandbox_enabled {
            return Ok(normalized);
        }

        // A file that doesn't exist yet (new file) can't be canonicalized
        // directly; canonicalize its parent instead and rejoin the name.
        let canonical = if normalized.exists() {
            normalized.canonicalize().unwrap_or_else(|_| normalized.clone())
        } else if let Some(parent) = normalized.parent() {
            if parent.exists() {
                let canonical_parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
                canonical_parent.join(normalized.file_name().unwrap_or_default())
            } else {
                normalized.clone()
            }
        } else {
            normalized.clone()
        };

        let worktree_canonical = self.worktree.canonicalize().unwrap_or_else(|_| self.worktree.clone());

        if canonical.starts_with(&worktree_canonical) {
            Ok(canonical)
        } else {
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                worktree: self.worktree.clone(),
            })
        }
    }
}

#[cfg(test)]
pub(crate) fn noop_gateway() -> BlockingGatewayRef {
    struct Noop;

    #[async_trait]
    impl BlockingGateway for Noop {
        async fn ask_question(&self, _question: &str, _options: Option<Vec<String>>) -> eyre::Result<String> {
            Ok(String::new())
        }

        async fn propose_objective(&self, _draft_json: serde_json::Value) -> eyre::Result<String> {
            Ok(String::new())
        }
    }

    Arc::new(Noop)
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("worktree", &self.worktree)
            .field("exec_id", &self.exec_id)
            .field("sandbox_enabled", &self.sandbox_enabled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_track_and_check_read() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-exec".to_string());
        let file_path = Path::new("src/lib.rs");

        assert!(!ctx.was_read(file_path).await);
        ctx.track_read(file_path).await;
        assert!(ctx.was_read(file_path).await);
    }

    #[tokio::test]
    async fn test_clear_reads() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-exec".to_string());

        ctx.track_read(Path::new("a.rs")).await;
        ctx.track_read(Path::new("b.rs")).await;
        ctx.clear_reads().await;

        assert!(!ctx.was_read(Path::new("a.rs")).await);
        assert!(!ctx.was_read(Path::new("b.rs")).await);
    }

    #[tokio::test]
    async fn test_validate_path_within_worktree() {
        let temp = tempdir().unwrap();
        let worktree = temp.path().to_path_buf();
        fs::write(worktree.join("test.txt"), "content").unwrap();

        let ctx = ToolContext::new(worktree, "test-exec".to_string());
        assert!(ctx.validate_path(Path::new("test.txt")).is_ok());
    }

    #[tokio::test]
    async fn test_validate_path_outside_worktree() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-exec".to_string());

        let result = ctx.validate_path(Path::new("/etc/passwd"));
        assert!(matches!(result.unwrap_err(), ToolError::SandboxViolation { .. }));
    }

    #[tokio::test]
    async fn test_validate_path_with_sandbox_disabled() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new_unsandboxed(temp.path().to_path_buf(), "test-exec".to_string());
        assert!(ctx.validate_path(Path::new("/etc/passwd")).is_ok());
    }

    #[tokio::test]
    async fn test_validate_new_file_path() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().to_path_buf(), "test-exec".to_string());
        assert!(ctx.validate_path(Path::new("new_file.txt")).is_ok());
    }
}
