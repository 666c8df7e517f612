// ABOUTME: Per-run exclusive lock via exclusive-create of .lock in the run directory
// ABOUTME: Stale locks (old mtime) are reclaimed; the guard removes the file on drop

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::warn;

use super::error::LockError;

pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(3600);

/// Exclusive run-directory lock. Holding the guard means this process owns the
/// run; dropping it releases the lock.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

fn is_stale(lock_path: &Path, stale_after: Duration) -> bool {
    let Ok(meta) = std::fs::metadata(lock_path) else {
        return false;
    };
    let Ok(mtime) = meta.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(mtime) {
        Ok(age) => age > stale_after,
        Err(_) => false,
    }
}

impl RunLock {
    /// Acquire the lock, reclaiming an abandoned one whose mtime is older than
    /// `stale_after`. Reclamation re-races through exclusive-create, so two
    /// concurrent reclaimers cannot both win.
    pub fn acquire(run_dir: &Path, stale_after: Duration) -> Result<Self, LockError> {
        let path = run_dir.join(".lock");
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if is_stale(&path, stale_after) && attempts < 3 {
                        warn!(path = %path.display(), "reclaiming stale run lock");
                        match std::fs::remove_file(&path) {
                            Ok(()) => continue,
                            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                            Err(e) => return Err(LockError::Io(e)),
                        }
                    }
                    return Err(LockError::Held { path });
                }
                Err(e) => return Err(LockError::Io(e)),
            }
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
