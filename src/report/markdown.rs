// ABOUTME: Renders the final run report as Markdown
// ABOUTME: Overview, task table, problem details with stderr tails, artifact list

use std::fmt::Write;

use super::summary::RunSummary;

fn opt<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

/// Render `final_report.md` content from a run summary.
pub fn render_markdown(summary: &RunSummary) -> String {
    let mut md = String::new();
    let run = &summary.run;

    let _ = writeln!(md, "# Final Run Report");
    let _ = writeln!(md);
    let _ = writeln!(md, "## Run Overview");
    let _ = writeln!(md);
    let _ = writeln!(md, "- run_id: `{}`", run.run_id);
    let _ = writeln!(md, "- goal: {}", run.goal.as_deref().unwrap_or("(none)"));
    let _ = writeln!(md, "- status: **{}**", run.status);
    let _ = writeln!(md, "- started: {}", run.created_at);
    let _ = writeln!(md, "- ended: {}", run.updated_at);
    let _ = writeln!(md, "- max_parallel: {}", run.max_parallel);
    let _ = writeln!(md, "- fail_fast: {}", yes_no(run.fail_fast));
    let _ = writeln!(md, "- workdir: `{}`", run.workdir);
    let _ = writeln!(md);
    let _ = writeln!(md, "## Task Results");
    let _ = writeln!(md);
    let _ = writeln!(
        md,
        "| id | status | attempts | duration_sec | exit_code | timed_out | logs |"
    );
    let _ = writeln!(md, "|---|---:|---:|---:|---:|---:|---|");
    for row in &summary.tasks {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} | {} | {} | `{}` / `{}` |",
            row.id,
            row.status,
            row.attempts,
            opt(&row.duration_sec),
            opt(&row.exit_code),
            row.timed_out,
            row.stdout_path,
            row.stderr_path
        );
    }
    let _ = writeln!(md);
    let _ = writeln!(md, "## Failed / Skipped / Canceled Details");
    let _ = writeln!(md);
    if summary.problems.is_empty() {
        let _ = writeln!(md, "No failed/skipped/canceled tasks.");
        let _ = writeln!(md);
    } else {
        for problem in &summary.problems {
            let _ = writeln!(md, "### {} ({})", problem.id, problem.status);
            if let Some(reason) = &problem.skip_reason {
                let _ = writeln!(md, "- skip_reason: `{}`", reason);
            }
            let _ = writeln!(md, "- stderr tail:");
            let _ = writeln!(md, "```");
            if problem.stderr_tail.is_empty() {
                let _ = writeln!(md, "(empty)");
            } else {
                for line in &problem.stderr_tail {
                    let _ = writeln!(md, "{}", line);
                }
            }
            let _ = writeln!(md, "```");
            let _ = writeln!(md);
        }
    }
    let _ = writeln!(md, "## Artifacts");
    let _ = writeln!(md);
    if summary.artifacts.is_empty() {
        let _ = writeln!(md, "- (none)");
    } else {
        for artifact in &summary.artifacts {
            let _ = writeln!(md, "- `{}` (task: `{}`)", artifact.path, artifact.task_id);
        }
    }
    md
}
