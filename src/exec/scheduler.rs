// ABOUTME: The DAG scheduler: ready-set admission, parallelism bound, skip propagation, resume
// ABOUTME: Persists state atomically on every transition and polls the cancel marker between ticks

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::artifacts::{collect_artifacts, copy_to_aggregate, resolve_artifacts_dir};
use super::error::{ExecError, Result};
use super::retry::backoff_for_attempt;
use super::supervisor::{append_text_best_effort, resolve_task_cwd, run_attempt, AttemptResult};
use crate::dag::{build_adjacency, DagIndex};
use crate::plan::{PlanSpec, TaskSpec};
use crate::state::{
    clear_cancel_request, is_cancel_requested, load_state, save_state_atomic, RunState, RunStatus,
    StateError, TaskState, TaskStatus,
};
use crate::util::now_iso;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Scheduler inputs beyond the plan itself.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_parallel: usize,
    pub fail_fast: bool,
    pub workdir: PathBuf,
    pub resume: bool,
    pub failed_only: bool,
}

fn persist(run_dir: &Path, state: &mut RunState) -> std::result::Result<(), StateError> {
    state.updated_at = now_iso();
    save_state_atomic(run_dir, state)
}

fn initial_state(plan: &PlanSpec, run_dir: &Path, opts: &RunOptions) -> RunState {
    let ts = now_iso();
    let run_id = run_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let home = run_dir
        .parent()
        .and_then(Path::parent)
        .map(|p| {
            std::fs::canonicalize(p)
                .unwrap_or_else(|_| p.to_path_buf())
                .display()
                .to_string()
        })
        .unwrap_or_default();

    let tasks = plan
        .tasks
        .iter()
        .map(|task| (task.id.clone(), TaskState::from_spec(task)))
        .collect();

    RunState {
        run_id,
        created_at: ts.clone(),
        updated_at: ts,
        status: RunStatus::Running,
        goal: plan.goal.clone(),
        plan_relpath: "plan.yaml".to_string(),
        home,
        workdir: opts.workdir.display().to_string(),
        max_parallel: opts.max_parallel,
        fail_fast: opts.fail_fast,
        tasks,
    }
}

fn validate_state_matches_plan(
    plan: &PlanSpec,
    state: &RunState,
) -> std::result::Result<(), StateError> {
    let plan_ids: BTreeSet<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
    let state_ids: BTreeSet<&str> = state.tasks.keys().map(String::as_str).collect();

    let missing: Vec<&&str> = plan_ids.difference(&state_ids).collect();
    if !missing.is_empty() {
        return Err(StateError::PlanMismatch(format!(
            "missing task state entries: {:?}",
            missing
        )));
    }
    let unknown: Vec<&&str> = state_ids.difference(&plan_ids).collect();
    if !unknown.is_empty() {
        return Err(StateError::PlanMismatch(format!(
            "unknown task state entries: {:?}",
            unknown
        )));
    }
    Ok(())
}

/// A task observed RUNNING in the persisted state belongs to an interrupted
/// run; rewrite it to FAILED before scheduling begins.
fn prepare_resume_state(state: &mut RunState) {
    for task in state.tasks.values_mut() {
        if task.status == TaskStatus::Running {
            task.status = TaskStatus::Failed;
            task.canceled = false;
            task.timed_out = false;
            task.skip_reason = Some("previous_run_interrupted".to_string());
            task.ended_at = Some(now_iso());
        }
    }
}

/// Which tasks get re-executed on resume. With `failed_only`, previously
/// FAILED tasks seed the set and non-SUCCESS dependents join transitively.
fn rerun_set(
    plan: &PlanSpec,
    state: &RunState,
    failed_only: bool,
    dag: &DagIndex,
) -> HashSet<String> {
    if !failed_only {
        return plan
            .tasks
            .iter()
            .filter(|t| state.tasks[&t.id].status != TaskStatus::Success)
            .map(|t| t.id.clone())
            .collect();
    }

    let mut to_rerun: HashSet<String> = plan
        .tasks
        .iter()
        .filter(|t| state.tasks[&t.id].status == TaskStatus::Failed)
        .map(|t| t.id.clone())
        .collect();
    let mut queue: Vec<String> = to_rerun.iter().cloned().collect();
    while let Some(current) = queue.pop() {
        for child in dag.dependents_of(&current) {
            if to_rerun.contains(child) {
                continue;
            }
            if state.tasks[child].status != TaskStatus::Success {
                to_rerun.insert(child.clone());
                queue.push(child.clone());
            }
        }
    }
    to_rerun
}

fn should_retry(task: &TaskSpec, result: &AttemptResult, attempts: u32) -> bool {
    if attempts >= task.max_attempts() {
        return false;
    }
    if result.canceled || result.start_failed {
        return false;
    }
    result.timed_out || matches!(result.exit_code, Some(code) if code != 0)
}

fn first_blocking_dep(state: &RunState, task: &TaskSpec) -> Option<String> {
    task.depends_on
        .iter()
        .find(|dep| state.tasks[dep.as_str()].status != TaskStatus::Success)
        .cloned()
}

fn release_children(
    task_id: &str,
    dag: &DagIndex,
    active: &HashSet<String>,
    dep_remaining: &mut HashMap<String, usize>,
    ready: &mut VecDeque<String>,
) {
    for child in dag.dependents_of(task_id) {
        if let Some(count) = dep_remaining.get_mut(child) {
            if *count > 0 {
                *count -= 1;
            }
            if *count == 0 && active.contains(child) {
                ready.push_back(child.clone());
            }
        }
    }
}

fn finalize_run_status(state: &mut RunState) {
    let statuses: Vec<TaskStatus> = state.tasks.values().map(|t| t.status).collect();
    state.status = if statuses.iter().any(|s| *s == TaskStatus::Canceled) {
        RunStatus::Canceled
    } else if statuses
        .iter()
        .any(|s| matches!(s, TaskStatus::Failed | TaskStatus::Skipped))
    {
        RunStatus::Failed
    } else if !statuses.is_empty() && statuses.iter().all(|s| *s == TaskStatus::Success) {
        RunStatus::Success
    } else {
        RunStatus::Failed
    };
}

/// Execute (or resume) a plan inside its run directory until every task is
/// terminal. Returns the final persisted state.
pub async fn run_plan(plan: &PlanSpec, run_dir: &Path, opts: &RunOptions) -> Result<RunState> {
    if opts.max_parallel < 1 {
        return Err(ExecError::Config("max_parallel must be >= 1".to_string()));
    }

    let dag = build_adjacency(plan);
    let spec_by_id: HashMap<&str, &TaskSpec> =
        plan.tasks.iter().map(|t| (t.id.as_str(), t)).collect();
    let aggregate_root = resolve_artifacts_dir(plan.artifacts_dir.as_deref(), &opts.workdir);

    let mut state = if opts.resume {
        // A resume supersedes any earlier cancel request.
        clear_cancel_request(run_dir);
        let mut state = load_state(run_dir)?;
        validate_state_matches_plan(plan, &state)?;
        prepare_resume_state(&mut state);
        state.status = RunStatus::Running;
        state.max_parallel = opts.max_parallel;
        state.fail_fast = opts.fail_fast;
        state.workdir = opts.workdir.display().to_string();
        let rerun = rerun_set(plan, &state, opts.failed_only, &dag);
        info!(count = rerun.len(), failed_only = opts.failed_only, "resuming run");
        for task_id in &rerun {
            state.tasks[task_id.as_str()].reset_for_rerun();
        }
        state
    } else {
        initial_state(plan, run_dir, opts)
    };
    persist(run_dir, &mut state)?;

    // Admission bookkeeping covers only tasks still eligible to execute.
    let mut active: HashSet<String> = state
        .tasks
        .iter()
        .filter(|(_, t)| t.status == TaskStatus::Pending)
        .map(|(id, _)| id.clone())
        .collect();
    let mut dep_remaining: HashMap<String, usize> = plan
        .tasks
        .iter()
        .filter(|t| active.contains(&t.id))
        .map(|t| {
            let count = t.depends_on.iter().filter(|d| active.contains(*d)).count();
            (t.id.clone(), count)
        })
        .collect();
    let mut ready: VecDeque<String> = plan
        .tasks
        .iter()
        .filter(|t| dep_remaining.get(&t.id) == Some(&0))
        .map(|t| t.id.clone())
        .collect();

    let mut running: HashSet<String> = HashSet::new();
    let mut workers: JoinSet<(String, AttemptResult)> = JoinSet::new();
    let semaphore = Arc::new(Semaphore::new(opts.max_parallel));
    let mut cancel_mode = false;
    let mut fail_fast_from: Option<String> = None;
    let mut cancel_poll = tokio::time::interval(CANCEL_POLL_INTERVAL);
    cancel_poll.tick().await;

    while !active.is_empty() || !running.is_empty() {
        if is_cancel_requested(run_dir) {
            cancel_mode = true;
        }

        if cancel_mode {
            let doomed: Vec<String> = plan
                .tasks
                .iter()
                .filter(|t| active.contains(&t.id) && !running.contains(&t.id))
                .map(|t| t.id.clone())
                .collect();
            if !doomed.is_empty() {
                for task_id in &doomed {
                    let task = &mut state.tasks[task_id.as_str()];
                    task.status = TaskStatus::Canceled;
                    task.canceled = true;
                    task.skip_reason = Some("run_canceled".to_string());
                    task.ended_at = Some(now_iso());
                    active.remove(task_id);
                    release_children(task_id, &dag, &active, &mut dep_remaining, &mut ready);
                }
                persist(run_dir, &mut state)?;
            }
        }

        // Admission: dispatch ready tasks in FIFO order up to the bound.
        while !cancel_mode && running.len() < opts.max_parallel {
            let Some(task_id) = ready.pop_front() else {
                break;
            };
            if !active.contains(&task_id) || running.contains(&task_id) {
                continue;
            }
            let spec = spec_by_id[task_id.as_str()];

            if let Some(dep) = first_blocking_dep(&state, spec) {
                let task = &mut state.tasks[task_id.as_str()];
                task.status = TaskStatus::Skipped;
                task.skip_reason = Some(format!("dependency_failed:{}", dep));
                task.ended_at = Some(now_iso());
                active.remove(&task_id);
                release_children(&task_id, &dag, &active, &mut dep_remaining, &mut ready);
                persist(run_dir, &mut state)?;
                continue;
            }

            if let Some(source) = &fail_fast_from {
                let reason = format!("dependency_failed:{}", source);
                let task = &mut state.tasks[task_id.as_str()];
                task.status = TaskStatus::Skipped;
                task.skip_reason = Some(reason);
                task.ended_at = Some(now_iso());
                active.remove(&task_id);
                release_children(&task_id, &dag, &active, &mut dep_remaining, &mut ready);
                persist(run_dir, &mut state)?;
                continue;
            }

            let attempt = {
                let task = &mut state.tasks[task_id.as_str()];
                task.status = TaskStatus::Running;
                if task.started_at.is_none() {
                    task.started_at = Some(now_iso());
                }
                task.attempts += 1;
                task.attempts
            };
            persist(run_dir, &mut state)?;

            debug!(task = %task_id, attempt, "dispatching task");
            running.insert(task_id.clone());
            let spec_owned = spec.clone();
            let run_dir_owned = run_dir.to_path_buf();
            let workdir = opts.workdir.clone();
            let permit_source = Arc::clone(&semaphore);
            workers.spawn(async move {
                let _permit = permit_source
                    .acquire_owned()
                    .await
                    .expect("scheduler semaphore closed");
                let outcome =
                    AssertUnwindSafe(run_attempt(&spec_owned, &run_dir_owned, attempt, &workdir))
                        .catch_unwind()
                        .await;
                let result = match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        let err_path = run_dir_owned
                            .join("logs")
                            .join(format!("{}.err.log", spec_owned.id));
                        append_text_best_effort(&err_path, "task supervisor panicked\n");
                        let ts = now_iso();
                        AttemptResult {
                            exit_code: Some(70),
                            timed_out: false,
                            canceled: false,
                            start_failed: true,
                            started_at: ts.clone(),
                            ended_at: ts,
                            duration_sec: 0.0,
                        }
                    }
                };
                (spec_owned.id, result)
            });
        }

        if running.is_empty() {
            if ready.is_empty() {
                if !active.is_empty() {
                    // Backstop: cannot happen with an acyclic plan, but the
                    // loop must converge even if it does.
                    warn!(count = active.len(), "tasks left with unresolvable dependencies");
                    let stuck: Vec<String> = plan
                        .tasks
                        .iter()
                        .filter(|t| active.contains(&t.id))
                        .map(|t| t.id.clone())
                        .collect();
                    for task_id in &stuck {
                        let spec = spec_by_id[task_id.as_str()];
                        let reason = first_blocking_dep(&state, spec)
                            .map(|dep| format!("dependency_failed:{}", dep));
                        let task = &mut state.tasks[task_id.as_str()];
                        task.status = TaskStatus::Skipped;
                        task.skip_reason = reason;
                        task.ended_at = Some(now_iso());
                        active.remove(task_id);
                    }
                    persist(run_dir, &mut state)?;
                }
                break;
            }
            continue;
        }

        let joined = tokio::select! {
            joined = workers.join_next() => joined,
            _ = cancel_poll.tick() => continue,
        };
        let Some(joined) = joined else {
            continue;
        };
        let (task_id, result) = joined?;
        running.remove(&task_id);

        let spec = spec_by_id[task_id.as_str()];
        {
            let task = &mut state.tasks[task_id.as_str()];
            task.ended_at = Some(result.ended_at.clone());
            task.duration_sec = Some(task.duration_sec.unwrap_or(0.0) + result.duration_sec);
            task.exit_code = result.exit_code;
            task.timed_out = result.timed_out;
            task.canceled = result.canceled;
        }
        let attempts = state.tasks[task_id.as_str()].attempts;

        if should_retry(spec, &result, attempts) {
            let delay = backoff_for_attempt(attempts.saturating_sub(1) as usize, &spec.retry_backoff_sec);
            info!(task = %task_id, attempts, delay_sec = delay, "retrying task");
            state.tasks[task_id.as_str()].status = TaskStatus::Ready;
            persist(run_dir, &mut state)?;
            if delay > 0.0 {
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
            }
            state.tasks[task_id.as_str()].status = TaskStatus::Pending;
            ready.push_back(task_id.clone());
            persist(run_dir, &mut state)?;
            continue;
        }

        if result.canceled {
            let task = &mut state.tasks[task_id.as_str()];
            task.status = TaskStatus::Canceled;
            task.skip_reason = Some("run_canceled".to_string());
            cancel_mode = true;
        } else {
            let task_cwd = resolve_task_cwd(spec.cwd.as_deref(), &opts.workdir);
            let artifact_paths = collect_artifacts(spec, run_dir, &task_cwd);
            if let Some(root) = &aggregate_root {
                copy_to_aggregate(spec, &task_cwd, root);
            }
            let succeeded = result.succeeded();
            let task = &mut state.tasks[task_id.as_str()];
            task.artifact_paths = artifact_paths;
            if succeeded {
                task.status = TaskStatus::Success;
                info!(task = %task_id, attempts, "task succeeded");
            } else {
                task.status = TaskStatus::Failed;
                info!(task = %task_id, attempts, exit_code = ?result.exit_code,
                    timed_out = result.timed_out, "task failed");
                if opts.fail_fast && fail_fast_from.is_none() {
                    fail_fast_from = Some(task_id.clone());
                }
            }
        }

        active.remove(&task_id);
        release_children(&task_id, &dag, &active, &mut dep_remaining, &mut ready);

        if let Some(source) = fail_fast_from.clone() {
            let doomed: Vec<String> = plan
                .tasks
                .iter()
                .filter(|t| active.contains(&t.id) && !running.contains(&t.id))
                .map(|t| t.id.clone())
                .collect();
            for pending_id in &doomed {
                let task = &mut state.tasks[pending_id.as_str()];
                task.status = TaskStatus::Skipped;
                task.skip_reason = Some(format!("dependency_failed:{}", source));
                task.ended_at = Some(now_iso());
                active.remove(pending_id);
                release_children(pending_id, &dag, &active, &mut dep_remaining, &mut ready);
            }
        }

        persist(run_dir, &mut state)?;
    }

    finalize_run_status(&mut state);
    persist(run_dir, &mut state)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: &str, retries: u32) -> TaskSpec {
        TaskSpec {
            id: id.to_string(),
            cmd: vec!["true".to_string()],
            depends_on: vec![],
            cwd: None,
            env: None,
            timeout_sec: None,
            retries,
            retry_backoff_sec: vec![],
            outputs: vec![],
        }
    }

    fn result(exit_code: Option<i32>, timed_out: bool, canceled: bool) -> AttemptResult {
        AttemptResult {
            exit_code,
            timed_out,
            canceled,
            start_failed: false,
            started_at: "2024-01-01T00:00:00+00:00".to_string(),
            ended_at: "2024-01-01T00:00:01+00:00".to_string(),
            duration_sec: 1.0,
        }
    }

    #[test]
    fn test_should_retry_on_failure_within_budget() {
        let task = spec("a", 2);
        assert!(should_retry(&task, &result(Some(1), false, false), 1));
        assert!(should_retry(&task, &result(None, true, false), 2));
        assert!(!should_retry(&task, &result(Some(1), false, false), 3));
    }

    #[test]
    fn test_never_retry_success_or_cancel() {
        let task = spec("a", 5);
        assert!(!should_retry(&task, &result(Some(0), false, false), 1));
        assert!(!should_retry(&task, &result(None, false, true), 1));
    }

    #[test]
    fn test_never_retry_spawn_failure() {
        let task = spec("a", 5);
        let mut r = result(Some(127), false, false);
        r.start_failed = true;
        assert!(!should_retry(&task, &r, 1));
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let task = spec("a", 0);
        assert!(!should_retry(&task, &result(Some(1), false, false), 1));
    }
}
