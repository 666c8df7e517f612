// ABOUTME: Command implementations for the stagehand CLI
// ABOUTME: Wires lock -> plan -> dag -> state -> scheduler -> report and maps outcomes to exit codes

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use tracing::{info, warn};

use super::config::Config;
use crate::dag::{build_adjacency, topological_order};
use crate::exec::{run_plan, RunOptions};
use crate::plan::{load_plan, PlanSpec};
use crate::report::{build_summary, render_markdown};
use crate::state::{
    load_state, request_cancel, LockError, RunLock, RunState, RunStatus,
};
use crate::util::{
    create_regular_file, ensure_run_layout, has_symlink_ancestor, is_symlink_path, new_run_id,
    run_dir, tail_lines,
};

const MAX_RUN_ID_LEN: usize = 128;
const OBSERVER_LOCK_RETRIES: u32 = 5;
const OBSERVER_LOCK_INTERVAL: Duration = Duration::from_millis(100);

pub const EXIT_OK: u8 = 0;
pub const EXIT_PLAN_ERROR: u8 = 2;
pub const EXIT_RUN_FAILED: u8 = 3;
pub const EXIT_RUN_CANCELED: u8 = 4;

fn exit_code_for_state(state: &RunState) -> ExitCode {
    match state.status {
        RunStatus::Success => ExitCode::from(EXIT_OK),
        RunStatus::Canceled => ExitCode::from(EXIT_RUN_CANCELED),
        _ => ExitCode::from(EXIT_RUN_FAILED),
    }
}

fn valid_run_id(run_id: &str) -> bool {
    if run_id.is_empty() || run_id.len() > MAX_RUN_ID_LEN {
        return false;
    }
    let mut chars = run_id.chars();
    let first = chars.next().unwrap();
    first.is_ascii_alphanumeric()
        && run_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

fn resolve_workdir(workdir: &Path) -> Option<PathBuf> {
    let resolved = std::fs::canonicalize(workdir).ok()?;
    let meta = std::fs::symlink_metadata(&resolved).ok()?;
    meta.is_dir().then_some(resolved)
}

/// A home is acceptable when neither it nor any ancestor is a symlink and
/// its nearest existing ancestor is a real directory. Fails closed on
/// metadata errors.
fn valid_home(home: &Path) -> bool {
    if is_symlink_path(home) || has_symlink_ancestor(home) {
        return false;
    }
    let mut current = Some(home);
    while let Some(dir) = current {
        match std::fs::symlink_metadata(dir) {
            Ok(meta) => return meta.is_dir(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => current = dir.parent(),
            Err(_) => return false,
        }
    }
    true
}

fn write_report(state: &RunState, current_run_dir: &Path) -> std::io::Result<PathBuf> {
    use std::io::Write;
    let summary = build_summary(state, current_run_dir);
    let md = render_markdown(&summary);
    let path = current_run_dir.join("report").join("final_report.md");
    let mut file = create_regular_file(&path)?;
    file.write_all(md.as_bytes())?;
    Ok(path)
}

fn print_run_outcome(run_id: &str, state: &RunState, current_run_dir: &Path) {
    let report_path = match write_report(state, current_run_dir) {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "failed to write report");
            current_run_dir.join("report").join("final_report.md")
        }
    };
    println!("run_id: {}", run_id);
    println!("state: {}", state.status);
    println!("report: {}", report_path.display());
}

/// Acquire the lock the way observers do: a few short-backoff attempts, then
/// give up and read without it (the view may be stale; never mutates).
async fn acquire_observer_lock(current_run_dir: &Path, stale_after: Duration) -> Option<RunLock> {
    for attempt in 0..OBSERVER_LOCK_RETRIES {
        match RunLock::acquire(current_run_dir, stale_after) {
            Ok(lock) => return Some(lock),
            Err(LockError::Held { .. }) => {
                if attempt + 1 < OBSERVER_LOCK_RETRIES {
                    tokio::time::sleep(OBSERVER_LOCK_INTERVAL).await;
                }
            }
            Err(_) => return None,
        }
    }
    warn!("run is held by another process; reading state without the lock (view may be stale)");
    None
}

/// A run exists when its directory is a real (non-symlink) directory reached
/// without symlinks and holds a regular state.json or plan.yaml.
fn run_exists(current_run_dir: &Path) -> bool {
    if has_symlink_ancestor(current_run_dir) || is_symlink_path(current_run_dir) {
        return false;
    }
    match std::fs::symlink_metadata(current_run_dir) {
        Ok(meta) if meta.is_dir() => {}
        _ => return false,
    }
    let is_regular = |name: &str| {
        matches!(
            std::fs::symlink_metadata(current_run_dir.join(name)),
            Ok(meta) if meta.is_file()
        )
    };
    is_regular("state.json") || is_regular("plan.yaml")
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    plan_path: PathBuf,
    max_parallel: Option<usize>,
    home: Option<PathBuf>,
    workdir: Option<PathBuf>,
    fail_fast: bool,
    dry_run: bool,
    config: &Config,
) -> ExitCode {
    let plan = match load_plan(&plan_path) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Plan validation error: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };
    let dag = build_adjacency(&plan);
    let order = match topological_order(&plan.task_ids(), &dag) {
        Ok(order) => order,
        Err(e) => {
            eprintln!("Plan validation error: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };

    if dry_run {
        println!("Dry run - topological order:");
        for (idx, task_id) in order.iter().enumerate() {
            println!("{:>4}  {}", idx + 1, task_id);
        }
        return ExitCode::from(EXIT_OK);
    }

    let workdir = workdir.unwrap_or_else(|| PathBuf::from("."));
    let Some(resolved_workdir) = resolve_workdir(&workdir) else {
        eprintln!("Invalid workdir: {}", workdir.display());
        return ExitCode::from(EXIT_PLAN_ERROR);
    };

    let home = home.unwrap_or_else(|| config.home.clone());
    if !valid_home(&home) {
        eprintln!("Invalid home: {}", home.display());
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let run_id = new_run_id(chrono::Local::now());
    let current_run_dir = run_dir(&home, &run_id);
    if let Err(e) = ensure_run_layout(&current_run_dir) {
        eprintln!("Failed to initialize run: {}", e);
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    if let Err(e) = plan.save_snapshot(&current_run_dir.join("plan.yaml")) {
        eprintln!("Failed to initialize run: {}", e);
        return ExitCode::from(EXIT_PLAN_ERROR);
    }

    let _lock = match RunLock::acquire(&current_run_dir, config.lock_stale_after()) {
        Ok(lock) => lock,
        Err(LockError::Held { .. }) => {
            eprintln!("another process holds the run: {}", run_id);
            return ExitCode::from(EXIT_RUN_FAILED);
        }
        Err(e) => {
            eprintln!("Failed to lock run: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };

    info!(run_id, plan = %plan_path.display(), "starting run");
    let opts = RunOptions {
        max_parallel: max_parallel.unwrap_or(config.max_parallel),
        fail_fast,
        workdir: resolved_workdir,
        resume: false,
        failed_only: false,
    };
    let state = match run_plan(&plan, &current_run_dir, &opts).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Run execution failed: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };

    print_run_outcome(&run_id, &state, &current_run_dir);
    exit_code_for_state(&state)
}

#[allow(clippy::too_many_arguments)]
pub async fn resume(
    run_id: String,
    home: Option<PathBuf>,
    max_parallel: Option<usize>,
    workdir: Option<PathBuf>,
    fail_fast: bool,
    failed_only: bool,
    config: &Config,
) -> ExitCode {
    if !valid_run_id(&run_id) {
        eprintln!("Invalid run_id: {}", run_id);
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let workdir = workdir.unwrap_or_else(|| PathBuf::from("."));
    let Some(resolved_workdir) = resolve_workdir(&workdir) else {
        eprintln!("Invalid workdir: {}", workdir.display());
        return ExitCode::from(EXIT_PLAN_ERROR);
    };
    let home = home.unwrap_or_else(|| config.home.clone());
    if !valid_home(&home) {
        eprintln!("Invalid home: {}", home.display());
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let current_run_dir = run_dir(&home, &run_id);

    let _lock = match RunLock::acquire(&current_run_dir, config.lock_stale_after()) {
        Ok(lock) => lock,
        Err(LockError::Held { .. }) => {
            eprintln!("another process holds the run: {}", run_id);
            return ExitCode::from(EXIT_RUN_FAILED);
        }
        Err(e) => {
            eprintln!("Run not found or broken: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };

    let plan = match load_plan(&current_run_dir.join("plan.yaml")) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("Run not found or broken: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };

    info!(run_id, failed_only, "resuming run");
    let opts = RunOptions {
        max_parallel: max_parallel.unwrap_or(config.max_parallel),
        fail_fast,
        workdir: resolved_workdir,
        resume: true,
        failed_only,
    };
    let state = match run_plan(&plan, &current_run_dir, &opts).await {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Run not found or broken: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };

    print_run_outcome(&run_id, &state, &current_run_dir);
    exit_code_for_state(&state)
}

pub async fn status(
    run_id: String,
    home: Option<PathBuf>,
    as_json: bool,
    config: &Config,
) -> ExitCode {
    if !valid_run_id(&run_id) {
        eprintln!("Invalid run_id: {}", run_id);
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let home = home.unwrap_or_else(|| config.home.clone());
    if !valid_home(&home) {
        eprintln!("Invalid home: {}", home.display());
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let current_run_dir = run_dir(&home, &run_id);

    let _lock = acquire_observer_lock(&current_run_dir, config.lock_stale_after()).await;
    let state = match load_state(&current_run_dir) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Failed to load state: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };

    if as_json {
        match serde_json::to_string_pretty(&state) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize state: {}", e);
                return ExitCode::from(EXIT_PLAN_ERROR);
            }
        }
        return ExitCode::from(EXIT_OK);
    }

    println!("Run {} [{}]", run_id, state.status);
    println!(
        "{:<32} {:<10} {:>8} {:>13} {:>10}",
        "task_id", "status", "attempts", "duration_sec", "exit_code"
    );
    for (task_id, task) in &state.tasks {
        let duration = task
            .duration_sec
            .map(|d| format!("{:.2}", d))
            .unwrap_or_else(|| "-".to_string());
        let exit_code = task
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<32} {:<10} {:>8} {:>13} {:>10}",
            task_id,
            task.status.to_string(),
            task.attempts,
            duration,
            exit_code
        );
    }
    ExitCode::from(EXIT_OK)
}

pub async fn logs(
    run_id: String,
    home: Option<PathBuf>,
    task: Option<String>,
    tail: usize,
    config: &Config,
) -> ExitCode {
    if !valid_run_id(&run_id) {
        eprintln!("Invalid run_id: {}", run_id);
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let home = home.unwrap_or_else(|| config.home.clone());
    if !valid_home(&home) {
        eprintln!("Invalid home: {}", home.display());
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let current_run_dir = run_dir(&home, &run_id);

    let _lock = acquire_observer_lock(&current_run_dir, config.lock_stale_after()).await;
    let state = match load_state(&current_run_dir) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("Failed to load state: {}", e);
            return ExitCode::from(EXIT_PLAN_ERROR);
        }
    };

    let task_ids: Vec<String> = match &task {
        Some(id) => vec![id.clone()],
        None => state.tasks.keys().cloned().collect(),
    };

    let mut missing_task = false;
    for task_id in &task_ids {
        let Some(task_state) = state.tasks.get(task_id) else {
            eprintln!("unknown task: {}", task_id);
            missing_task = true;
            continue;
        };
        for (label, path) in [
            ("stdout", &task_state.stdout_path),
            ("stderr", &task_state.stderr_path),
        ] {
            println!("== {} :: {} ==", task_id, label);
            let lines = tail_lines(&current_run_dir.join(path), tail);
            if lines.is_empty() {
                println!("(empty)");
            } else {
                for line in lines {
                    println!("{}", line);
                }
            }
        }
    }

    if task.is_some() && missing_task {
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    ExitCode::from(EXIT_OK)
}

pub async fn cancel(run_id: String, home: Option<PathBuf>, config: &Config) -> ExitCode {
    if !valid_run_id(&run_id) {
        eprintln!("Invalid run_id: {}", run_id);
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let home = home.unwrap_or_else(|| config.home.clone());
    if !valid_home(&home) {
        eprintln!("Invalid home: {}", home.display());
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    let current_run_dir = run_dir(&home, &run_id);

    if !run_exists(&current_run_dir) {
        eprintln!("Run not found: {}", run_id);
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    if let Err(e) = request_cancel(&current_run_dir) {
        eprintln!("Failed to request cancel: {}", e);
        return ExitCode::from(EXIT_PLAN_ERROR);
    }
    println!("cancel requested: {}", run_id);
    ExitCode::from(EXIT_OK)
}

/// Print the dry-run topological order for an already-loaded plan. Exposed
/// for reuse by integration tests.
pub fn topological_preview(plan: &PlanSpec) -> crate::plan::Result<Vec<String>> {
    let dag = build_adjacency(plan);
    topological_order(&plan.task_ids(), &dag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_run_id() {
        assert!(valid_run_id("20240101_000000_abc123"));
        assert!(valid_run_id("r1"));
        assert!(!valid_run_id(""));
        assert!(!valid_run_id("-starts-bad"));
        assert!(!valid_run_id("has space"));
        assert!(!valid_run_id("has/slash"));
        assert!(!valid_run_id(&"x".repeat(129)));
    }

    #[test]
    fn test_run_exists_detection() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(!run_exists(dir.path()));
        std::fs::write(dir.path().join("plan.yaml"), "tasks: []").unwrap();
        assert!(run_exists(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_exists_rejects_symlinked_run_dir() {
        let real = tempfile::TempDir::new().unwrap();
        std::fs::write(real.path().join("state.json"), "{}").unwrap();
        let outer = tempfile::TempDir::new().unwrap();
        let alias = outer.path().join("run-link");
        std::os::unix::fs::symlink(real.path(), &alias).unwrap();

        assert!(run_exists(real.path()));
        assert!(!run_exists(&alias));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_exists_ignores_symlinked_state_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let elsewhere = tempfile::TempDir::new().unwrap();
        let target = elsewhere.path().join("state.json");
        std::fs::write(&target, "{}").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("state.json")).unwrap();

        assert!(!run_exists(dir.path()));
    }

    #[test]
    fn test_valid_home_accepts_missing_tail() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(valid_home(dir.path()));
        assert!(valid_home(&dir.path().join("not-yet/created")));
    }

    #[cfg(unix)]
    #[test]
    fn test_valid_home_rejects_symlinks() {
        let real = tempfile::TempDir::new().unwrap();
        let outer = tempfile::TempDir::new().unwrap();
        let alias = outer.path().join("home-link");
        std::os::unix::fs::symlink(real.path(), &alias).unwrap();

        assert!(!valid_home(&alias));
        assert!(!valid_home(&alias.join("nested")));
    }

    #[cfg(unix)]
    #[test]
    fn test_valid_home_rejects_file_ancestor() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("occupied");
        std::fs::write(&file, "x").unwrap();
        assert!(!valid_home(&file.join("below")));
    }
}
