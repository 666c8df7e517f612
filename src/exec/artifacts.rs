// ABOUTME: Best-effort artifact collection after a task exits, success or not
// ABOUTME: Glob matches under the task cwd are copied into the run dir preserving relative structure

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use globset::GlobBuilder;
use tracing::debug;
use walkdir::WalkDir;

use crate::plan::TaskSpec;

fn has_glob_meta(part: &str) -> bool {
    part.contains(['*', '?', '[', '{'])
}

/// Longest leading run of literal (non-glob) components of a pattern.
fn literal_prefix(pattern: &Path) -> PathBuf {
    let mut prefix = PathBuf::new();
    for component in pattern.components() {
        match component {
            Component::Normal(part) => {
                if has_glob_meta(&part.to_string_lossy()) {
                    break;
                }
                prefix.push(part);
            }
            other => prefix.push(other.as_os_str()),
        }
    }
    prefix
}

/// Resolve an `outputs` glob to matching regular files. Relative patterns
/// match against paths relative to `cwd`; absolute patterns are walked from
/// their literal prefix. Errors yield an empty match set.
pub fn iter_output_matches(pattern: &str, cwd: &Path) -> Vec<PathBuf> {
    let pattern_path = Path::new(pattern);
    let absolute = pattern_path.is_absolute();
    let root = if absolute {
        literal_prefix(pattern_path)
    } else {
        cwd.to_path_buf()
    };

    let glob = match GlobBuilder::new(pattern).literal_separator(true).build() {
        Ok(glob) => glob.compile_matcher(),
        Err(e) => {
            debug!(pattern, error = %e, "ignoring unbuildable output glob");
            return Vec::new();
        }
    };

    let mut matches = Vec::new();
    for entry in WalkDir::new(&root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = if absolute {
            glob.is_match(entry.path())
        } else {
            entry
                .path()
                .strip_prefix(&root)
                .map(|rel| glob.is_match(rel))
                .unwrap_or(false)
        };
        if matched {
            matches.push(entry.path().to_path_buf());
        }
    }
    matches.sort();
    matches
}

fn sanitize_parts(path: &Path) -> Vec<String> {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().replace(':', "_")),
            Component::ParentDir => Some("__up__".to_string()),
            _ => None,
        })
        .collect()
}

/// Destination path for a matched file, relative to the task's artifact root.
/// Matches under the cwd keep their structure; anything else is quarantined
/// under `__abs__/` or `__external__/`.
pub fn artifact_relative_path(matched: &Path, cwd: &Path) -> PathBuf {
    if let Ok(rel) = matched.strip_prefix(cwd) {
        let parts = sanitize_parts(rel);
        if parts.is_empty() {
            return PathBuf::from("root");
        }
        return parts.iter().collect();
    }

    let parts = sanitize_parts(matched);
    let bucket = if matched.is_absolute() {
        "__abs__"
    } else {
        "__external__"
    };
    let mut dest = PathBuf::from(bucket);
    if parts.is_empty() {
        dest.push("root");
    } else {
        for part in parts {
            dest.push(part);
        }
    }
    dest
}

/// Copy every `outputs` match into `<run_dir>/artifacts/<task_id>/`, returning
/// run-dir-relative paths, sorted and deduplicated. Individual copy failures
/// are logged and skipped; they never fail the task.
pub fn collect_artifacts(task: &TaskSpec, run_dir: &Path, cwd: &Path) -> Vec<String> {
    if task.outputs.is_empty() {
        return Vec::new();
    }
    let task_root = run_dir.join("artifacts").join(&task.id);
    if let Err(e) = std::fs::create_dir_all(&task_root) {
        debug!(task = %task.id, error = %e, "failed to create artifact dir");
        return Vec::new();
    }

    let mut copied = BTreeSet::new();
    for pattern in &task.outputs {
        for matched in iter_output_matches(pattern, cwd) {
            let rel = artifact_relative_path(&matched, cwd);
            let dest = task_root.join(&rel);
            if let Some(parent) = dest.parent() {
                if std::fs::create_dir_all(parent).is_err() {
                    continue;
                }
            }
            match std::fs::copy(&matched, &dest) {
                Ok(_) => {
                    if let Ok(rel_to_run) = dest.strip_prefix(run_dir) {
                        copied.insert(rel_to_run.to_string_lossy().into_owned());
                    }
                }
                Err(e) => {
                    debug!(task = %task.id, source = %matched.display(), error = %e,
                        "failed to copy artifact");
                }
            }
        }
    }
    copied.into_iter().collect()
}

/// Second, best-effort copy into the plan-level aggregate directory. Existing
/// content is preserved; only paths produced by this run are overwritten.
pub fn copy_to_aggregate(task: &TaskSpec, cwd: &Path, aggregate_root: &Path) {
    let task_root = aggregate_root.join(&task.id);
    if std::fs::create_dir_all(&task_root).is_err() {
        return;
    }
    for pattern in &task.outputs {
        for matched in iter_output_matches(pattern, cwd) {
            let dest = task_root.join(artifact_relative_path(&matched, cwd));
            if let Some(parent) = dest.parent() {
                if std::fs::create_dir_all(parent).is_err() {
                    continue;
                }
            }
            let _ = std::fs::copy(&matched, &dest);
        }
    }
}

/// Resolve the plan's `artifacts_dir` against the run workdir unless absolute.
pub fn resolve_artifacts_dir(artifacts_dir: Option<&str>, workdir: &Path) -> Option<PathBuf> {
    artifacts_dir.map(|dir| {
        let path = Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            workdir.join(path)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn task_with_outputs(outputs: &[&str]) -> TaskSpec {
        TaskSpec {
            id: "collect".to_string(),
            cmd: vec!["true".to_string()],
            depends_on: vec![],
            cwd: None,
            env: None,
            timeout_sec: None,
            retries: 0,
            retry_backoff_sec: vec![],
            outputs: outputs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_relative_glob_matches() {
        let cwd = TempDir::new().unwrap();
        std::fs::create_dir_all(cwd.path().join("out")).unwrap();
        std::fs::write(cwd.path().join("out/a.bin"), "a").unwrap();
        std::fs::write(cwd.path().join("out/b.txt"), "b").unwrap();

        let matches = iter_output_matches("out/*.bin", cwd.path());
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("out/a.bin"));
    }

    #[test]
    fn test_star_does_not_cross_directories() {
        let cwd = TempDir::new().unwrap();
        std::fs::create_dir_all(cwd.path().join("sub")).unwrap();
        std::fs::write(cwd.path().join("top.txt"), "t").unwrap();
        std::fs::write(cwd.path().join("sub/inner.txt"), "i").unwrap();

        let matches = iter_output_matches("*.txt", cwd.path());
        assert_eq!(matches.len(), 1);
        assert!(matches[0].ends_with("top.txt"));

        let recursive = iter_output_matches("**/*.txt", cwd.path());
        assert_eq!(recursive.len(), 2);
    }

    #[test]
    fn test_bad_pattern_yields_nothing() {
        let cwd = TempDir::new().unwrap();
        assert!(iter_output_matches("[unclosed", cwd.path()).is_empty());
    }

    #[test]
    fn test_artifact_relative_path_under_cwd() {
        let cwd = Path::new("/work");
        assert_eq!(
            artifact_relative_path(Path::new("/work/out/a.bin"), cwd),
            PathBuf::from("out/a.bin")
        );
    }

    #[test]
    fn test_artifact_relative_path_absolute_outside() {
        let cwd = Path::new("/work");
        let dest = artifact_relative_path(Path::new("/var/log/x:y.log"), cwd);
        assert_eq!(dest, PathBuf::from("__abs__/var/log/x_y.log"));
    }

    #[test]
    fn test_collect_artifacts_copies_and_reports_relative_paths() {
        let run_dir = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        std::fs::create_dir_all(cwd.path().join("dist")).unwrap();
        std::fs::write(cwd.path().join("dist/app"), "bin").unwrap();

        let task = task_with_outputs(&["dist/*"]);
        let copied = collect_artifacts(&task, run_dir.path(), cwd.path());

        assert_eq!(copied, vec!["artifacts/collect/dist/app".to_string()]);
        assert!(run_dir
            .path()
            .join("artifacts/collect/dist/app")
            .is_file());
    }

    #[test]
    fn test_collect_artifacts_dedupes_overlapping_patterns() {
        let run_dir = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        std::fs::write(cwd.path().join("a.txt"), "a").unwrap();

        let task = task_with_outputs(&["*.txt", "a.*"]);
        let copied = collect_artifacts(&task, run_dir.path(), cwd.path());
        assert_eq!(copied.len(), 1);
    }

    #[test]
    fn test_collect_artifacts_empty_outputs() {
        let run_dir = TempDir::new().unwrap();
        let cwd = TempDir::new().unwrap();
        let task = task_with_outputs(&[]);
        assert!(collect_artifacts(&task, run_dir.path(), cwd.path()).is_empty());
    }

    #[test]
    fn test_aggregate_copy_preserves_existing_content() {
        let cwd = TempDir::new().unwrap();
        let aggregate = TempDir::new().unwrap();
        std::fs::write(cwd.path().join("new.txt"), "new").unwrap();
        std::fs::create_dir_all(aggregate.path().join("collect")).unwrap();
        std::fs::write(aggregate.path().join("collect/old.txt"), "old").unwrap();

        let task = task_with_outputs(&["*.txt"]);
        copy_to_aggregate(&task, cwd.path(), aggregate.path());

        assert!(aggregate.path().join("collect/new.txt").is_file());
        assert!(aggregate.path().join("collect/old.txt").is_file());
    }

    #[test]
    fn test_resolve_artifacts_dir() {
        let workdir = Path::new("/work");
        assert_eq!(resolve_artifacts_dir(None, workdir), None);
        assert_eq!(
            resolve_artifacts_dir(Some("bundle"), workdir),
            Some(PathBuf::from("/work/bundle"))
        );
        assert_eq!(
            resolve_artifacts_dir(Some("/abs/bundle"), workdir),
            Some(PathBuf::from("/abs/bundle"))
        );
    }
}
