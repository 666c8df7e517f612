// ABOUTME: Per-task supervisor: spawns the child from argv, streams output, enforces timeout/cancel
// ABOUTME: Escalates terminate -> grace -> kill; one supervisor owns one child process lifetime

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Local, SecondsFormat};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use super::capture::stream_to_file;
use crate::plan::TaskSpec;
use crate::state::is_cancel_requested;
use crate::util::duration_sec;

const MONITOR_INTERVAL: Duration = Duration::from_millis(100);
const KILL_GRACE: Duration = Duration::from_secs(1);

/// Outcome of one launch of a task's command.
#[derive(Debug, Clone)]
pub struct AttemptResult {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub canceled: bool,
    pub start_failed: bool,
    pub started_at: String,
    pub ended_at: String,
    pub duration_sec: f64,
}

impl AttemptResult {
    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0) && !self.timed_out && !self.canceled
    }
}

/// Resolve a task's cwd: absolute stays, relative joins the run workdir,
/// absent means the workdir itself.
pub fn resolve_task_cwd(task_cwd: Option<&str>, default_cwd: &Path) -> PathBuf {
    match task_cwd {
        None => default_cwd.to_path_buf(),
        Some(cwd) => {
            let path = Path::new(cwd);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                default_cwd.join(path)
            }
        }
    }
}

pub(crate) fn append_text_best_effort(path: &Path, text: &str) {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Ok(mut file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        let _ = file.write_all(text.as_bytes());
    }
}

fn append_attempt_header(path: &Path, attempt: u32, max_attempts: u32) {
    append_text_best_effort(path, &format!("\n===== attempt {} / {} =====\n", attempt, max_attempts));
}

fn now_local() -> (DateTime<Local>, String) {
    let now = Local::now();
    let iso = now.to_rfc3339_opts(SecondsFormat::Secs, false);
    (now, iso)
}

/// Send a graceful terminate, wait a short grace period, then force-kill.
async fn terminate_then_kill(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    #[cfg(not(unix))]
    {
        let _ = child.start_kill();
    }

    if tokio::time::timeout(KILL_GRACE, child.wait()).await.is_err() {
        if let Err(e) = child.kill().await {
            warn!(error = %e, "failed to kill child after grace period");
        }
    }
}

#[cfg(unix)]
fn exit_code_of(status: std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|sig| -sig))
}

#[cfg(not(unix))]
fn exit_code_of(status: std::process::ExitStatus) -> Option<i32> {
    status.code()
}

/// Run one attempt of `task`: spawn the child directly from argv (never via a
/// shell), stream stdout/stderr to the task's log files, and enforce the
/// timeout and the run's cancel marker while the child runs.
pub async fn run_attempt(
    task: &TaskSpec,
    run_dir: &Path,
    attempt: u32,
    default_cwd: &Path,
) -> AttemptResult {
    let (started_dt, started_iso) = now_local();
    let out_path = run_dir.join("logs").join(format!("{}.out.log", task.id));
    let err_path = run_dir.join("logs").join(format!("{}.err.log", task.id));
    append_attempt_header(&out_path, attempt, task.max_attempts());
    append_attempt_header(&err_path, attempt, task.max_attempts());

    let cwd = resolve_task_cwd(task.cwd.as_deref(), default_cwd);
    let mut command = Command::new(&task.cmd[0]);
    command
        .args(&task.cmd[1..])
        .current_dir(&cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(env) = &task.env {
        command.envs(env);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            append_text_best_effort(&err_path, &format!("failed to start process: {}\n", e));
            let (ended_dt, ended_iso) = now_local();
            return AttemptResult {
                exit_code: Some(127),
                timed_out: false,
                canceled: false,
                start_failed: true,
                started_at: started_iso,
                ended_at: ended_iso,
                duration_sec: duration_sec(started_dt, ended_dt),
            };
        }
    };

    debug!(task = %task.id, attempt, cmd = ?task.cmd, "child process started");

    let out_reader = tokio::spawn(stream_to_file(child.stdout.take(), out_path));
    let err_reader = tokio::spawn(stream_to_file(child.stderr.take(), err_path.clone()));

    let mut timed_out = false;
    let mut canceled = false;
    let mut monitor = tokio::time::interval(MONITOR_INTERVAL);
    monitor.tick().await; // first tick fires immediately

    let exit_code = loop {
        tokio::select! {
            res = child.wait() => {
                match res {
                    Ok(status) => break exit_code_of(status),
                    Err(e) => {
                        append_text_best_effort(&err_path, &format!("failed to wait for process: {}\n", e));
                        break None;
                    }
                }
            }
            _ = monitor.tick() => {
                // Cancel wins over a racing timeout: check the marker first.
                if is_cancel_requested(run_dir) {
                    canceled = true;
                    terminate_then_kill(&mut child).await;
                    break None;
                }
                if let Some(limit) = task.timeout_sec {
                    if duration_sec(started_dt, Local::now()) > limit {
                        timed_out = true;
                        terminate_then_kill(&mut child).await;
                        break None;
                    }
                }
            }
        }
    };

    for reader in [out_reader, err_reader] {
        match reader.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task = %task.id, error = %e, "log streaming failed"),
            Err(e) => warn!(task = %task.id, error = %e, "log reader task failed"),
        }
    }

    let (ended_dt, ended_iso) = now_local();
    AttemptResult {
        exit_code,
        timed_out,
        canceled,
        start_failed: false,
        started_at: started_iso,
        ended_at: ended_iso,
        duration_sec: duration_sec(started_dt, ended_dt),
    }
}
