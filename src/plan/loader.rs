// ABOUTME: YAML plan loading, cmd normalization, and full structural validation
// ABOUTME: Enforces id shape, uniqueness, reference integrity, and acyclicity

use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use super::error::{PlanError, Result};
use super::spec::{PlanSpec, TaskSpec};
use crate::dag::{build_adjacency, topological_order};

const MAX_ID_LEN: usize = 128;

/// Raw task as it appears in the YAML document. Unknown fields are rejected.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTask {
    id: String,
    cmd: RawCmd,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: Option<HashMap<String, String>>,
    #[serde(default)]
    timeout_sec: Option<f64>,
    #[serde(default)]
    retries: u32,
    #[serde(default)]
    retry_backoff_sec: Vec<f64>,
    #[serde(default)]
    outputs: Vec<String>,
}

/// A cmd is either a raw shell-style line or an explicit argv list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawCmd {
    Line(String),
    Argv(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPlan {
    #[serde(default)]
    goal: Option<String>,
    #[serde(default)]
    artifacts_dir: Option<String>,
    tasks: Vec<RawTask>,
}

/// Split a string cmd into argv using POSIX shell tokenization. Quoting is
/// honored; no variable expansion or globbing happens, and the child is never
/// run through a shell.
fn normalize_cmd(task_id: &str, cmd: RawCmd) -> Result<Vec<String>> {
    match cmd {
        RawCmd::Line(line) => {
            let argv = shell_words::split(&line).map_err(|e| PlanError::InvalidTask {
                task: task_id.to_string(),
                reason: format!("cmd is not valid shell syntax: {}", e),
            })?;
            if argv.is_empty() {
                return Err(PlanError::InvalidTask {
                    task: task_id.to_string(),
                    reason: "cmd string is empty".to_string(),
                });
            }
            Ok(argv)
        }
        RawCmd::Argv(argv) => {
            if argv.is_empty() {
                return Err(PlanError::InvalidTask {
                    task: task_id.to_string(),
                    reason: "cmd list is empty".to_string(),
                });
            }
            Ok(argv)
        }
    }
}

fn validate_task_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > MAX_ID_LEN {
        return Err(PlanError::InvalidTaskId {
            id: id.to_string(),
            reason: format!("length must be 1..={}", MAX_ID_LEN),
        });
    }
    let mut chars = id.chars();
    let first = chars.next().unwrap();
    if !first.is_ascii_alphanumeric() {
        return Err(PlanError::InvalidTaskId {
            id: id.to_string(),
            reason: "must begin with an alphanumeric character".to_string(),
        });
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
    {
        return Err(PlanError::InvalidTaskId {
            id: id.to_string(),
            reason: "allowed characters are [A-Za-z0-9._-]".to_string(),
        });
    }
    Ok(())
}

fn convert_task(raw: RawTask) -> Result<TaskSpec> {
    validate_task_id(&raw.id)?;
    let cmd = normalize_cmd(&raw.id, raw.cmd)?;

    if let Some(env) = &raw.env {
        for key in env.keys() {
            if key.is_empty() || key.contains('=') {
                return Err(PlanError::InvalidTask {
                    task: raw.id.clone(),
                    reason: format!("env key {:?} must be non-empty and contain no '='", key),
                });
            }
        }
    }

    if let Some(timeout) = raw.timeout_sec {
        if !timeout.is_finite() || timeout <= 0.0 {
            return Err(PlanError::InvalidTask {
                task: raw.id.clone(),
                reason: "timeout_sec must be a positive finite number".to_string(),
            });
        }
    }

    for backoff in &raw.retry_backoff_sec {
        if !backoff.is_finite() || *backoff < 0.0 {
            return Err(PlanError::InvalidTask {
                task: raw.id.clone(),
                reason: "retry_backoff_sec entries must be non-negative finite numbers"
                    .to_string(),
            });
        }
    }

    Ok(TaskSpec {
        id: raw.id,
        cmd,
        depends_on: raw.depends_on,
        cwd: raw.cwd,
        env: raw.env,
        timeout_sec: raw.timeout_sec,
        retries: raw.retries,
        retry_backoff_sec: raw.retry_backoff_sec,
        outputs: raw.outputs,
    })
}

/// Validate plan-level invariants: non-empty, unique ids, known references,
/// and an acyclic dependency graph.
pub fn validate_plan(plan: &PlanSpec) -> Result<()> {
    if plan.tasks.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    let mut seen = HashSet::new();
    for task in &plan.tasks {
        if !seen.insert(task.id.to_ascii_lowercase()) {
            return Err(PlanError::DuplicateTaskId {
                id: task.id.clone(),
            });
        }
    }

    let id_set: HashSet<&str> = plan.tasks.iter().map(|t| t.id.as_str()).collect();
    for task in &plan.tasks {
        for dep in &task.depends_on {
            if !id_set.contains(dep.as_str()) {
                return Err(PlanError::UnknownDependency {
                    task: task.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    let dag = build_adjacency(plan);
    topological_order(&plan.task_ids(), &dag)?;
    Ok(())
}

/// Parse a plan from YAML text and validate it.
pub fn plan_from_yaml(content: &str) -> Result<PlanSpec> {
    let raw: RawPlan = serde_yaml::from_str(content)?;
    let tasks = raw
        .tasks
        .into_iter()
        .map(convert_task)
        .collect::<Result<Vec<_>>>()?;
    let plan = PlanSpec {
        goal: raw.goal,
        artifacts_dir: raw.artifacts_dir,
        tasks,
    };
    validate_plan(&plan)?;
    Ok(plan)
}

/// Load and validate a plan YAML file.
pub fn load_plan(path: &Path) -> Result<PlanSpec> {
    let content = std::fs::read_to_string(path)?;
    plan_from_yaml(&content)
}
