// ABOUTME: The on-disk cancellation rendezvous between the cancel CLI and the scheduler
// ABOUTME: A marker file inside the run directory; existence is the whole protocol

use std::io;
use std::path::{Path, PathBuf};

fn marker_path(run_dir: &Path) -> PathBuf {
    run_dir.join("cancel.request")
}

/// Request cancellation of a run. Idempotent; content is irrelevant.
pub fn request_cancel(run_dir: &Path) -> io::Result<()> {
    std::fs::write(marker_path(run_dir), "cancel requested\n")
}

/// Cheap existence check polled by the scheduler.
pub fn is_cancel_requested(run_dir: &Path) -> bool {
    marker_path(run_dir).is_file()
}

/// Remove the marker; a resume supersedes a prior cancel.
pub fn clear_cancel_request(run_dir: &Path) {
    let path = marker_path(run_dir);
    if let Err(e) = std::fs::remove_file(&path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "failed to clear cancel marker");
        }
    }
}
