// ABOUTME: Serde model of the persisted run state document
// ABOUTME: Defines task/run status enums and the per-task execution record

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::plan::TaskSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Success,
    Failed,
    Skipped,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Canceled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Ready => "READY",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Skipped => "SKIPPED",
            TaskStatus::Canceled => "CANCELED",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Success | RunStatus::Failed | RunStatus::Canceled
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "PENDING",
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Canceled => "CANCELED",
        };
        write!(f, "{}", s)
    }
}

/// Mutable execution record for one task. The spec fields (cmd, deps, retry
/// policy) are denormalized into the state so `status`/`logs` never need the
/// plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
    pub cmd: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub timeout_sec: Option<f64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub retry_backoff_sec: Vec<f64>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub duration_sec: Option<f64>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub canceled: bool,
    #[serde(default)]
    pub skip_reason: Option<String>,
    pub stdout_path: String,
    pub stderr_path: String,
    #[serde(default)]
    pub artifact_paths: Vec<String>,
}

impl TaskState {
    pub fn from_spec(task: &TaskSpec) -> Self {
        Self {
            status: TaskStatus::Pending,
            depends_on: task.depends_on.clone(),
            cmd: task.cmd.clone(),
            cwd: task.cwd.clone(),
            env: task.env.clone(),
            timeout_sec: task.timeout_sec,
            retries: task.retries,
            retry_backoff_sec: task.retry_backoff_sec.clone(),
            outputs: task.outputs.clone(),
            attempts: 0,
            started_at: None,
            ended_at: None,
            duration_sec: None,
            exit_code: None,
            timed_out: false,
            canceled: false,
            skip_reason: None,
            stdout_path: format!("logs/{}.out.log", task.id),
            stderr_path: format!("logs/{}.err.log", task.id),
            artifact_paths: Vec::new(),
        }
    }

    /// Reset execution fields so the task can be launched again on resume.
    /// The attempt counter restarts so the retry budget applies per execution.
    pub fn reset_for_rerun(&mut self) {
        self.status = TaskStatus::Pending;
        self.attempts = 0;
        self.started_at = None;
        self.ended_at = None;
        self.duration_sec = None;
        self.exit_code = None;
        self.timed_out = false;
        self.canceled = false;
        self.skip_reason = None;
        self.artifact_paths.clear();
    }
}

/// Run-level state persisted as `state.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: RunStatus,
    #[serde(default)]
    pub goal: Option<String>,
    pub plan_relpath: String,
    pub home: String,
    pub workdir: String,
    pub max_parallel: usize,
    pub fail_fast: bool,
    pub tasks: IndexMap<String, TaskState>,
}

impl RunState {
    pub fn task(&self, task_id: &str) -> Option<&TaskState> {
        self.tasks.get(task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TaskSpec {
        TaskSpec {
            id: "build".to_string(),
            cmd: vec!["make".to_string()],
            depends_on: vec!["fetch".to_string()],
            cwd: None,
            env: None,
            timeout_sec: Some(10.0),
            retries: 2,
            retry_backoff_sec: vec![1.0],
            outputs: vec![],
        }
    }

    #[test]
    fn test_from_spec_initializes_pending() {
        let state = TaskState::from_spec(&spec());
        assert_eq!(state.status, TaskStatus::Pending);
        assert_eq!(state.attempts, 0);
        assert_eq!(state.stdout_path, "logs/build.out.log");
        assert_eq!(state.stderr_path, "logs/build.err.log");
        assert_eq!(state.depends_on, vec!["fetch"]);
    }

    #[test]
    fn test_reset_for_rerun_clears_outcome() {
        let mut state = TaskState::from_spec(&spec());
        state.status = TaskStatus::Failed;
        state.attempts = 3;
        state.exit_code = Some(1);
        state.timed_out = true;
        state.skip_reason = Some("previous_run_interrupted".to_string());
        state.artifact_paths.push("artifacts/build/a.bin".to_string());

        state.reset_for_rerun();
        assert_eq!(state.status, TaskStatus::Pending);
        assert_eq!(state.exit_code, None);
        assert!(!state.timed_out);
        assert!(state.skip_reason.is_none());
        assert!(state.artifact_paths.is_empty());
        assert_eq!(state.attempts, 0);
    }

    #[test]
    fn test_status_serialization_uppercase() {
        let json = serde_json::to_string(&TaskStatus::Skipped).unwrap();
        assert_eq!(json, "\"SKIPPED\"");
        let back: TaskStatus = serde_json::from_str("\"CANCELED\"").unwrap();
        assert_eq!(back, TaskStatus::Canceled);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let res: Result<TaskStatus, _> = serde_json::from_str("\"EXPLODED\"");
        assert!(res.is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(TaskStatus::Canceled.is_terminal());
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Ready.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }
}
