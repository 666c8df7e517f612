// ABOUTME: Atomic persistence of state.json inside a run directory
// ABOUTME: Saves write a temp file, fsync best-effort, then rename over the target

use std::fs::File;
use std::io::Write;
use std::path::Path;

use super::error::StateError;
use super::model::RunState;

fn state_path(run_dir: &Path) -> std::path::PathBuf {
    run_dir.join("state.json")
}

/// Load `state.json` for a run. Unknown statuses are rejected by the model.
pub fn load_state(run_dir: &Path) -> Result<RunState, StateError> {
    let raw = std::fs::read_to_string(state_path(run_dir))?;
    let state: RunState = serde_json::from_str(&raw)?;
    Ok(state)
}

/// Atomically replace `state.json`: serialize to `state.json.tmp` in the same
/// directory, fsync (best-effort), then rename over the target. A reader never
/// observes a partial document.
pub fn save_state_atomic(run_dir: &Path, state: &RunState) -> Result<(), StateError> {
    let path = state_path(run_dir);
    let tmp = run_dir.join("state.json.tmp");

    let mut payload = serde_json::to_string_pretty(state)?;
    payload.push('\n');

    let mut file = File::create(&tmp)?;
    file.write_all(payload.as_bytes())?;
    let _ = file.sync_all();
    drop(file);

    std::fs::rename(&tmp, &path)?;
    Ok(())
}
