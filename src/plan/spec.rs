// ABOUTME: Static plan data structures shared by the loader, scheduler, and snapshot writer
// ABOUTME: Defines TaskSpec and PlanSpec with YAML round-trip support

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::error::{PlanError, Result};

/// One external command invocation declared by the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    pub id: String,
    pub cmd: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<f64>,
    #[serde(default)]
    pub retries: u32,
    #[serde(default)]
    pub retry_backoff_sec: Vec<f64>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

impl TaskSpec {
    /// Total launches allowed for this task.
    pub fn max_attempts(&self) -> u32 {
        self.retries + 1
    }
}

/// The validated plan: a goal, an optional aggregate artifact directory, and
/// the ordered task list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifacts_dir: Option<String>,
    pub tasks: Vec<TaskSpec>,
}

impl PlanSpec {
    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id.clone()).collect()
    }

    pub fn get_task(&self, task_id: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Serialize the plan back to YAML (the frozen run-dir snapshot format).
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(PlanError::Yaml)
    }

    /// Write the plan snapshot used as the source of truth for resumes.
    /// The destination must be a regular file reached without symlinks.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let yaml = self.to_yaml()?;
        let mut file = crate::util::create_regular_file(path).map_err(PlanError::Io)?;
        file.write_all(yaml.as_bytes()).map_err(PlanError::Io)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_attempts() {
        let task = TaskSpec {
            id: "a".to_string(),
            cmd: vec!["true".to_string()],
            depends_on: vec![],
            cwd: None,
            env: None,
            timeout_sec: None,
            retries: 2,
            retry_backoff_sec: vec![],
            outputs: vec![],
        };
        assert_eq!(task.max_attempts(), 3);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let plan = PlanSpec {
            goal: Some("demo".to_string()),
            artifacts_dir: None,
            tasks: vec![TaskSpec {
                id: "build".to_string(),
                cmd: vec!["make".to_string(), "all".to_string()],
                depends_on: vec![],
                cwd: Some("src".to_string()),
                env: None,
                timeout_sec: Some(30.0),
                retries: 1,
                retry_backoff_sec: vec![0.5],
                outputs: vec!["out/*.bin".to_string()],
            }],
        };

        let yaml = plan.to_yaml().unwrap();
        let parsed: PlanSpec = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.goal.as_deref(), Some("demo"));
        assert_eq!(parsed.tasks.len(), 1);
        assert_eq!(parsed.tasks[0].cmd, vec!["make", "all"]);
        assert_eq!(parsed.tasks[0].timeout_sec, Some(30.0));
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_refuses_symlink_destination() {
        use tempfile::TempDir;

        let dir = TempDir::new().unwrap();
        let victim = dir.path().join("victim.yaml");
        std::fs::write(&victim, "untouched").unwrap();
        let link = dir.path().join("plan.yaml");
        std::os::unix::fs::symlink(&victim, &link).unwrap();

        let plan = PlanSpec {
            goal: None,
            artifacts_dir: None,
            tasks: vec![TaskSpec {
                id: "a".to_string(),
                cmd: vec!["true".to_string()],
                depends_on: vec![],
                cwd: None,
                env: None,
                timeout_sec: None,
                retries: 0,
                retry_backoff_sec: vec![],
                outputs: vec![],
            }],
        };
        assert!(plan.save_snapshot(&link).is_err());
        assert_eq!(std::fs::read_to_string(&victim).unwrap(), "untouched");
    }
}
