// ABOUTME: Aggregates the final run state into report-ready rows
// ABOUTME: Problem rows carry a bounded stderr tail for failed/skipped/canceled tasks

use serde::Serialize;
use std::path::Path;

use crate::state::{RunState, RunStatus, TaskStatus};
use crate::util::tail_lines;

const STDERR_TAIL_LINES: usize = 50;

#[derive(Debug, Clone, Serialize)]
pub struct RunOverview {
    pub run_id: String,
    pub goal: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub status: RunStatus,
    pub max_parallel: usize,
    pub fail_fast: bool,
    pub workdir: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskRow {
    pub id: String,
    pub status: TaskStatus,
    pub attempts: u32,
    pub duration_sec: Option<f64>,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub stdout_path: String,
    pub stderr_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProblemRow {
    pub id: String,
    pub status: TaskStatus,
    pub skip_reason: Option<String>,
    pub stderr_tail: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactRow {
    pub task_id: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run: RunOverview,
    pub tasks: Vec<TaskRow>,
    pub problems: Vec<ProblemRow>,
    pub artifacts: Vec<ArtifactRow>,
}

/// Build the report summary from a final state, reading stderr tails for
/// every problem task.
pub fn build_summary(state: &RunState, run_dir: &Path) -> RunSummary {
    let mut tasks = Vec::new();
    let mut problems = Vec::new();
    let mut artifacts = Vec::new();

    for (task_id, task) in &state.tasks {
        tasks.push(TaskRow {
            id: task_id.clone(),
            status: task.status,
            attempts: task.attempts,
            duration_sec: task.duration_sec,
            exit_code: task.exit_code,
            timed_out: task.timed_out,
            stdout_path: task.stdout_path.clone(),
            stderr_path: task.stderr_path.clone(),
        });

        if matches!(
            task.status,
            TaskStatus::Failed | TaskStatus::Skipped | TaskStatus::Canceled
        ) {
            problems.push(ProblemRow {
                id: task_id.clone(),
                status: task.status,
                skip_reason: task.skip_reason.clone(),
                stderr_tail: tail_lines(&run_dir.join(&task.stderr_path), STDERR_TAIL_LINES),
            });
        }

        for artifact in &task.artifact_paths {
            artifacts.push(ArtifactRow {
                task_id: task_id.clone(),
                path: artifact.clone(),
            });
        }
    }

    RunSummary {
        run: RunOverview {
            run_id: state.run_id.clone(),
            goal: state.goal.clone(),
            created_at: state.created_at.clone(),
            updated_at: state.updated_at.clone(),
            status: state.status,
            max_parallel: state.max_parallel,
            fail_fast: state.fail_fast,
            workdir: state.workdir.clone(),
        },
        tasks,
        problems,
        artifacts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::TaskSpec;
    use crate::state::TaskState;
    use indexmap::IndexMap;
    use tempfile::TempDir;

    fn state_with(tasks: Vec<(&str, TaskStatus)>) -> RunState {
        let mut map = IndexMap::new();
        for (id, status) in tasks {
            let spec = TaskSpec {
                id: id.to_string(),
                cmd: vec!["true".to_string()],
                depends_on: vec![],
                cwd: None,
                env: None,
                timeout_sec: None,
                retries: 0,
                retry_backoff_sec: vec![],
                outputs: vec![],
            };
            let mut task = TaskState::from_spec(&spec);
            task.status = status;
            map.insert(id.to_string(), task);
        }
        RunState {
            run_id: "r1".to_string(),
            created_at: "t0".to_string(),
            updated_at: "t1".to_string(),
            status: RunStatus::Failed,
            goal: None,
            plan_relpath: "plan.yaml".to_string(),
            home: "h".to_string(),
            workdir: "w".to_string(),
            max_parallel: 2,
            fail_fast: false,
            tasks: map,
        }
    }

    #[test]
    fn test_problem_rows_only_for_bad_statuses() {
        let dir = TempDir::new().unwrap();
        let state = state_with(vec![
            ("ok", TaskStatus::Success),
            ("bad", TaskStatus::Failed),
            ("skip", TaskStatus::Skipped),
        ]);
        let summary = build_summary(&state, dir.path());
        assert_eq!(summary.tasks.len(), 3);
        let problem_ids: Vec<&str> = summary.problems.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(problem_ids, vec!["bad", "skip"]);
    }

    #[test]
    fn test_stderr_tail_is_read() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("logs")).unwrap();
        std::fs::write(dir.path().join("logs/bad.err.log"), "boom\n").unwrap();

        let state = state_with(vec![("bad", TaskStatus::Failed)]);
        let summary = build_summary(&state, dir.path());
        assert_eq!(summary.problems[0].stderr_tail, vec!["boom"]);
    }

    #[test]
    fn test_artifacts_flattened_per_task() {
        let dir = TempDir::new().unwrap();
        let mut state = state_with(vec![("a", TaskStatus::Success)]);
        state.tasks["a"]
            .artifact_paths
            .extend(["artifacts/a/x".to_string(), "artifacts/a/y".to_string()]);
        let summary = build_summary(&state, dir.path());
        assert_eq!(summary.artifacts.len(), 2);
        assert_eq!(summary.artifacts[0].task_id, "a");
    }
}
