// ABOUTME: Error types for the execution engine
// ABOUTME: Only failures of the scheduler's own machinery surface here; task failures flow through state

use thiserror::Error;

use crate::state::StateError;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("invalid scheduler configuration: {0}")]
    Config(String),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("task worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, ExecError>;
