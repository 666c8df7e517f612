// ABOUTME: Common utilities and helpers for integration tests
// ABOUTME: Provides a plan builder and run-directory scaffolding

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use stagehand::plan::{PlanSpec, TaskSpec};
use stagehand::util::ensure_run_layout;

pub struct PlanBuilder {
    goal: Option<String>,
    artifacts_dir: Option<String>,
    tasks: Vec<TaskSpec>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            goal: None,
            artifacts_dir: None,
            tasks: Vec::new(),
        }
    }

    pub fn goal(mut self, goal: &str) -> Self {
        self.goal = Some(goal.to_string());
        self
    }

    pub fn artifacts_dir(mut self, dir: &str) -> Self {
        self.artifacts_dir = Some(dir.to_string());
        self
    }

    pub fn task(mut self, task: TaskSpec) -> Self {
        self.tasks.push(task);
        self
    }

    /// Shorthand for a shell one-liner task.
    pub fn sh(self, id: &str, script: &str, deps: &[&str]) -> Self {
        self.task(shell_task(id, script, deps))
    }

    pub fn build(self) -> PlanSpec {
        PlanSpec {
            goal: self.goal,
            artifacts_dir: self.artifacts_dir,
            tasks: self.tasks,
        }
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A task running `sh -c <script>` with the given dependencies.
pub fn shell_task(id: &str, script: &str, deps: &[&str]) -> TaskSpec {
    TaskSpec {
        id: id.to_string(),
        cmd: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
        depends_on: deps.iter().map(|s| s.to_string()).collect(),
        cwd: None,
        env: None,
        timeout_sec: None,
        retries: 0,
        retry_backoff_sec: vec![],
        outputs: vec![],
    }
}

pub struct TestRun {
    pub home: TempDir,
    pub workdir: TempDir,
    pub run_dir: PathBuf,
}

impl TestRun {
    /// Fresh home + workdir + laid-out run directory for driving the
    /// scheduler directly.
    pub fn new(run_id: &str) -> Self {
        let home = TempDir::new().unwrap();
        let workdir = TempDir::new().unwrap();
        let run_dir = home.path().join("runs").join(run_id);
        ensure_run_layout(&run_dir).unwrap();
        Self {
            home,
            workdir,
            run_dir,
        }
    }

    pub fn options(&self, max_parallel: usize) -> stagehand::exec::RunOptions {
        stagehand::exec::RunOptions {
            max_parallel,
            fail_fast: false,
            workdir: self.workdir.path().to_path_buf(),
            resume: false,
            failed_only: false,
        }
    }

    pub fn read_log(&self, name: &str) -> String {
        std::fs::read_to_string(self.run_dir.join("logs").join(name)).unwrap_or_default()
    }
}

pub fn env_map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Given a log of `start <id>` / `end <id>` lines, the maximum number of
/// tasks that were alive at once.
pub fn max_overlap(trace_path: &Path) -> usize {
    let Ok(content) = std::fs::read_to_string(trace_path) else {
        return 0;
    };
    let mut alive = 0usize;
    let mut peak = 0usize;
    for line in content.lines() {
        if line.starts_with("start") {
            alive += 1;
            peak = peak.max(alive);
        } else if line.starts_with("end") {
            alive = alive.saturating_sub(1);
        }
    }
    peak
}
