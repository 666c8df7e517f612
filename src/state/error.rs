// ABOUTME: Error types for state persistence and run locking
// ABOUTME: StateError is fatal at the run level; LockError degrades observers to plain reads

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("failed to read or write state file: {0}")]
    Io(#[from] std::io::Error),

    #[error("state.json is not valid: {0}")]
    Json(#[from] serde_json::Error),

    #[error("state does not match plan: {0}")]
    PlanMismatch(String),
}

#[derive(Error, Debug)]
pub enum LockError {
    #[error("another process holds the run: {path}")]
    Held { path: PathBuf },

    #[error("failed to manage run lock: {0}")]
    Io(#[from] std::io::Error),
}
