//! Error type for tool setup/validation failures that occur before a
//! `ToolResult` can be produced (sandbox confinement, schema rejection).
//! Failures during execution itself are reported as `ToolResult::error`
//! and fed back to the model, not propagated as `ToolError`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("path {path:?} escapes worktree {worktree:?}")]
    SandboxViolation { path: PathBuf, worktree: PathBuf },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
