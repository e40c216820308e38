//! WorkspaceMgr: allocates and releases the git worktree each objective
//! runs in, one worktree per objective, never reused until released.

mod manager;

pub use manager::{WorkspaceError, WorkspaceHandle, WorkspaceManager, WorkspaceStatus};
