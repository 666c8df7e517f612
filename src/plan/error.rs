// ABOUTME: Error types for plan loading and validation
// ABOUTME: Every variant carries a human-readable cause surfaced at the CLI boundary

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("failed to read plan file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse plan YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("plan tasks must contain at least one item")]
    EmptyPlan,

    #[error("invalid task id '{id}': {reason}")]
    InvalidTaskId { id: String, reason: String },

    #[error("task id must be unique (case-insensitive): {id}")]
    DuplicateTaskId { id: String },

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    #[error("task '{task}': {reason}")]
    InvalidTask { task: String, reason: String },

    #[error("plan has cyclic dependencies among: {remaining:?}")]
    CyclicDependencies { remaining: Vec<String> },
}

pub type Result<T> = std::result::Result<T, PlanError>;
