//! Git worktree allocation, grounded in the teacher's worktree manager but
//! keyed on objectives instead of loop executions: one worktree per
//! objective, checked out on `task/<objective-id>` under the configured
//! base directory, removed again on release.

use std::path::{Path, PathBuf};

use store::{Objective, ObjectiveId, Project};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::GitConfig;

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("worktree already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("worktree not found at {0}")]
    NotFound(PathBuf),

    #[error("path {0} is outside the configured worktree base")]
    PathRejected(PathBuf),

    #[error("insufficient disk space: {0}")]
    DiskQuota(String),

    #[error("git command failed: {0}")]
    VcsError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single allocated worktree.
#[derive(Debug, Clone)]
pub struct WorkspaceHandle {
    pub objective_id: ObjectiveId,
    pub path: PathBuf,
    pub branch: String,
}

/// Point-in-time view of a worktree's relationship to its base branch.
#[derive(Debug, Clone)]
pub struct WorkspaceStatus {
    pub branch: String,
    pub ahead: u32,
    pub behind: u32,
    pub dirty_files: Vec<String>,
}

/// Paths a caller must never be handed, regardless of configured base.
const CLOSED_ROOTS: &[&str] = &["/", "/etc", "/usr", "/bin", "/sbin", "/lib", "/root", "/home", "/var", "/boot", "/sys", "/proc"];

pub struct WorkspaceManager {
    config: GitConfig,
}

impl WorkspaceManager {
    pub fn new(config: GitConfig) -> Self {
        debug!(?config, "WorkspaceManager::new: called");
        Self { config }
    }

    /// Checks out a fresh worktree at `<worktree_dir>/<project>-<short-id>/`
    /// on `task/<objective-id>`, branched from `base_branch`. Any failure
    /// after the worktree add rolls back the directory and branch.
    pub async fn allocate(&self, project: &Project, objective: &Objective, base_branch: &str) -> Result<WorkspaceHandle, WorkspaceError> {
        debug!(objective_id = %objective.id, "WorkspaceManager::allocate: called");

        self.ensure_disk_space().await?;

        let path = self.worktree_path(&project.name, &objective.id);
        if path.exists() {
            warn!(?path, "WorkspaceManager::allocate: path already exists");
            return Err(WorkspaceError::AlreadyExists(path));
        }
        self.validate_path(&path)?;

        tokio::fs::create_dir_all(&self.config.worktree_dir).await?;

        let branch = format!("task/{}", objective.id);
        let repo_root = Path::new(&project.repo_path);

        let output = Command::new("git")
            .args(["worktree", "add", &path.to_string_lossy(), "-b", &branch, base_branch])
            .current_dir(repo_root)
            .output()
            .await
            .map_err(|e| WorkspaceError::VcsError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            warn!(%stderr, "WorkspaceManager::allocate: git worktree add failed");
            self.rollback(repo_root, &path, &branch).await;
            return Err(WorkspaceError::VcsError(stderr));
        }

        info!(?path, %branch, "WorkspaceManager::allocate: worktree created");
        Ok(WorkspaceHandle { objective_id: objective.id.clone(), path, branch })
    }

    async fn rollback(&self, repo_root: &Path, path: &Path, branch: &str) {
        debug!(?path, %branch, "WorkspaceManager::rollback: called");
        let _ = Command::new("git").args(["worktree", "remove", &path.to_string_lossy(), "--force"]).current_dir(repo_root).output().await;
        let _ = tokio::fs::remove_dir_all(path).await;
        let _ = Command::new("git").args(["branch", "-D", branch]).current_dir(repo_root).output().await;
    }

    /// Removes the worktree directory and, if requested, its branch.
    /// Idempotent: releasing a path that is no longer a worktree is not
    /// an error, since the objective's workspace fields are cleared
    /// either way.
    pub async fn release(&self, repo_root: &Path, handle: &WorkspaceHandle, delete_branch: bool) -> Result<(), WorkspaceError> {
        debug!(path = ?handle.path, "WorkspaceManager::release: called");

        if !handle.path.exists() {
            debug!("WorkspaceManager::release: path already gone, skipping");
            return Ok(());
        }

        let output = Command::new("git")
            .args(["worktree", "remove", &handle.path.to_string_lossy(), "--force"])
            .current_dir(repo_root)
            .output()
            .await
            .map_err(|e| WorkspaceError::VcsError(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.contains("is not a working tree") {
                return Err(WorkspaceError::VcsError(stderr.to_string()));
            }
        }

        if delete_branch {
            let _ = Command::new("git").args(["branch", "-D", &handle.branch]).current_dir(repo_root).output().await;
        }

        info!(path = ?handle.path, "WorkspaceManager::release: worktree released");
        Ok(())
    }

    /// Branch name, commits ahead/behind `base_branch`, and dirty paths.
    pub async fn status(&self, path: &Path, base_branch: &str) -> Result<WorkspaceStatus, WorkspaceError> {
        debug!(?path, "WorkspaceManager::status: called");
        if !path.exists() {
            return Err(WorkspaceError::NotFound(path.to_path_buf()));
        }

        let branch_output = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .current_dir(path)
            .output()
            .await
            .map_err(|e| WorkspaceError::VcsError(e.to_string()))?;
        let branch = String::from_utf8_lossy(&branch_output.stdout).trim().to_string();

        let count_output = Command::new("git")
            .args(["rev-list", "--left-right", "--count", &format!("{base_branch}...HEAD")])
            .current_dir(path)
            .output()
            .await
            .map_err(|e| WorkspaceError::VcsError(e.to_string()))?;
        let counts = String::from_utf8_lossy(&count_output.stdout);
        let mut parts = counts.split_whitespace();
        let behind: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let ahead: u32 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);

        let status_output = Command::new("git")
            .args(["status", "--porcelain"])
            .current_dir(path)
            .output()
            .await
            .map_err(|e| WorkspaceError::VcsError(e.to_string()))?;
        let dirty_files = String::from_utf8_lossy(&status_output.stdout)
            .lines()
            .filter_map(|line| line.get(3..).map(str::to_string))
            .collect();

        Ok(WorkspaceStatus { branch, ahead, behind, dirty_files })
    }

    /// Every worktree directory currently allocated for `project_name`.
    pub async fn list(&self, project_name: &str) -> Result<Vec<WorkspaceHandle>, WorkspaceError> {
        debug!(%project_name, "WorkspaceManager::list: called");
        let mut handles = Vec::new();
        if !self.config.worktree_dir.exists() {
            return Ok(handles);
        }

        let prefix = format!("{project_name}-");
        let mut entries = tokio::fs::read_dir(&self.config.worktree_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !path.is_dir() || !name.starts_with(&prefix) {
                continue;
            }
            let branch_output = Command::new("git").args(["rev-parse", "--abbrev-ref", "HEAD"]).current_dir(&path).output().await;
            let branch = branch_output.ok().map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string()).unwrap_or_default();
            handles.push(WorkspaceHandle { objective_id: ObjectiveId::from(name.trim_start_matches(&prefix)), path, branch });
        }

        debug!(count = handles.len(), "WorkspaceManager::list: returning handles");
        Ok(handles)
    }

    fn worktree_path(&self, project_name: &str, objective_id: &ObjectiveId) -> PathBuf {
        self.config.worktree_dir.join(format!("{project_name}-{}", short_id(objective_id)))
    }

    /// Refuses a path outside the configured base or under a closed
    /// system root, regardless of base configuration.
    fn validate_path(&self, path: &Path) -> Result<(), WorkspaceError> {
        if !path.starts_with(&self.config.worktree_dir) {
            return Err(WorkspaceError::PathRejected(path.to_path_buf()));
        }
        for root in CLOSED_ROOTS {
            if path == Path::new(root) {
                return Err(WorkspaceError::PathRejected(path.to_path_buf()));
            }
        }
        Ok(())
    }

    /// Refuses allocation when free space under the worktree base drops
    /// below the configured quota, the same `df`-based guard the teacher
    /// runs before creating a worktree.
    async fn ensure_disk_space(&self) -> Result<(), WorkspaceError> {
        let available_gb = self.available_disk_gb().await?;
        if available_gb < self.config.disk_quota_gb as u64 {
            return Err(WorkspaceError::DiskQuota(format!("only {available_gb}GB free, need {}GB", self.config.disk_quota_gb)));
        }
        Ok(())
    }

    async fn available_disk_gb(&self) -> Result<u64, WorkspaceError> {
        let target = if self.config.worktree_dir.exists() { self.config.worktree_dir.clone() } else { PathBuf::from("/tmp") };
        let output = Command::new("df")
            .args(["-BG", &target.to_string_lossy()])
            .output()
            .await
            .map_err(|e| WorkspaceError::DiskQuota(e.to_string()))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        for line in stdout.lines().skip(1) {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 4 {
                if let Ok(gb) = parts[3].trim_end_matches('G').parse::<u64>() {
                    return Ok(gb);
                }
            }
        }
        Ok(u64::MAX)
    }
}

/// First segment of a UUIDv7 string, short enough for a filesystem name
/// while still unique in practice for the lifetime of one worktree base.
fn short_id(id: &ObjectiveId) -> &str {
    id.as_str().split('-').next().unwrap_or(id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;
    use store::{ModelTier, Priority, ProjectId, QuestId, Role};
    use tempfile::tempdir;

    fn setup_repo(dir: &Path) {
        StdCommand::new("git").args(["init"]).current_dir(dir).output().unwrap();
        StdCommand::new("git").args(["config", "user.email", "test@test.com"]).current_dir(dir).output().unwrap();
        StdCommand::new("git").args(["config", "user.name", "Test"]).current_dir(dir).output().unwrap();
        StdCommand::new("git").args(["checkout", "-b", "main"]).current_dir(dir).output().unwrap();
        StdCommand::new("git").args(["commit", "--allow-empty", "-m", "initial"]).current_dir(dir).output().unwrap();
    }

    fn sample_objective(project_id: ProjectId) -> Objective {
        Objective {
            id: ObjectiveId::new(),
            project_id,
            quest_id: Some(QuestId::new()),
            title: "test".into(),
            description: "test objective".into(),
            role: Role::Creator,
            priority: Priority::default(),
            tier: ModelTier::Fast,
            status: store::ObjectiveStatus::Running,
            base_branch: "main".into(),
            worktree_path: None,
            branch_name: None,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost_cents: 0,
            unsatisfied_deps: 0,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn allocate_and_release_round_trip() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_repo(repo_dir.path());

        let config = GitConfig { worktree_dir: worktree_dir.path().to_path_buf(), disk_quota_gb: 0 };
        let manager = WorkspaceManager::new(config);

        let project = Project { id: ProjectId::new(), name: "demo".into(), repo_path: repo_dir.path().to_string_lossy().to_string(), created_at: chrono::Utc::now() };
        let objective = sample_objective(project.id.clone());

        let handle = manager.allocate(&project, &objective, "main").await.unwrap();
        assert!(handle.path.exists());
        assert!(handle.branch.starts_with("task/"));

        manager.release(repo_dir.path(), &handle, true).await.unwrap();
        assert!(!handle.path.exists());
    }

    #[tokio::test]
    async fn allocate_twice_for_the_same_objective_is_rejected() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_repo(repo_dir.path());

        let config = GitConfig { worktree_dir: worktree_dir.path().to_path_buf(), disk_quota_gb: 0 };
        let manager = WorkspaceManager::new(config);

        let project = Project { id: ProjectId::new(), name: "demo".into(), repo_path: repo_dir.path().to_string_lossy().to_string(), created_at: chrono::Utc::now() };
        let objective = sample_objective(project.id.clone());

        let _handle = manager.allocate(&project, &objective, "main").await.unwrap();
        let result = manager.allocate(&project, &objective, "main").await;
        assert!(matches!(result, Err(WorkspaceError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn status_reports_dirty_files() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_repo(repo_dir.path());

        let config = GitConfig { worktree_dir: worktree_dir.path().to_path_buf(), disk_quota_gb: 0 };
        let manager = WorkspaceManager::new(config);

        let project = Project { id: ProjectId::new(), name: "demo".into(), repo_path: repo_dir.path().to_string_lossy().to_string(), created_at: chrono::Utc::now() };
        let objective = sample_objective(project.id.clone());
        let handle = manager.allocate(&project, &objective, "main").await.unwrap();

        tokio::fs::write(handle.path.join("new.txt"), "content").await.unwrap();

        let status = manager.status(&handle.path, "main").await.unwrap();
        assert_eq!(status.dirty_files, vec!["new.txt".to_string()]);
    }

    #[tokio::test]
    async fn status_on_missing_path_is_not_found() {
        let worktree_dir = tempdir().unwrap();
        let config = GitConfig { worktree_dir: worktree_dir.path().to_path_buf(), disk_quota_gb: 0 };
        let manager = WorkspaceManager::new(config);

        let result = manager.status(Path::new("/nonexistent/path"), "main").await;
        assert!(matches!(result, Err(WorkspaceError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_finds_allocated_worktrees_for_the_project() {
        let repo_dir = tempdir().unwrap();
        let worktree_dir = tempdir().unwrap();
        setup_repo(repo_dir.path());

        let config = GitConfig { worktree_dir: worktree_dir.path().to_path_buf(), disk_quota_gb: 0 };
        let manager = WorkspaceManager::new(config);

        let project = Project { id: ProjectId::new(), name: "demo".into(), repo_path: repo_dir.path().to_string_lossy().to_string(), created_at: chrono::Utc::now() };
        let objective = sample_objective(project.id.clone());
        manager.allocate(&project, &objective, "main").await.unwrap();

        let handles = manager.list("demo").await.unwrap();
        assert_eq!(handles.len(), 1);
    }
}
