// ABOUTME: Run directory layout helpers
// ABOUTME: Maps a home directory and run id to the on-disk run tree

use std::io;
use std::path::{Path, PathBuf};

use super::path_guard::{has_symlink_ancestor, is_symlink_path};

/// Directory holding everything for one run: `<home>/runs/<run_id>/`.
pub fn run_dir(home: &Path, run_id: &str) -> PathBuf {
    home.join("runs").join(run_id)
}

/// Create the run directory tree (logs/, artifacts/, report/). Refuses a run
/// directory that is, or traverses, a symlink.
pub fn ensure_run_layout(run_dir: &Path) -> io::Result<()> {
    if has_symlink_ancestor(run_dir) || is_symlink_path(run_dir) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "run directory must not be or traverse a symlink: {}",
                run_dir.display()
            ),
        ));
    }
    std::fs::create_dir_all(run_dir)?;
    std::fs::create_dir_all(run_dir.join("logs"))?;
    std::fs::create_dir_all(run_dir.join("artifacts"))?;
    std::fs::create_dir_all(run_dir.join("report"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_run_dir_layout() {
        let home = TempDir::new().unwrap();
        let dir = run_dir(home.path(), "20240101_000000_abc123");
        assert!(dir.ends_with("runs/20240101_000000_abc123"));

        ensure_run_layout(&dir).unwrap();
        assert!(dir.join("logs").is_dir());
        assert!(dir.join("artifacts").is_dir());
        assert!(dir.join("report").is_dir());
    }

    #[test]
    fn test_ensure_run_layout_idempotent() {
        let home = TempDir::new().unwrap();
        let dir = run_dir(home.path(), "r1");
        ensure_run_layout(&dir).unwrap();
        ensure_run_layout(&dir).unwrap();
        assert!(dir.join("report").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn test_ensure_run_layout_refuses_symlinked_home() {
        let real = TempDir::new().unwrap();
        let outer = TempDir::new().unwrap();
        let alias = outer.path().join("home-link");
        std::os::unix::fs::symlink(real.path(), &alias).unwrap();

        let dir = run_dir(&alias, "r1");
        assert!(ensure_run_layout(&dir).is_err());
        assert!(!real.path().join("runs").exists());
    }
}
