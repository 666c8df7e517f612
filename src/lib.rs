// ABOUTME: Main library module for the stagehand task orchestrator
// ABOUTME: Exports all core modules and provides the public API

pub mod cli;
pub mod dag;
pub mod exec;
pub mod plan;
pub mod report;
pub mod state;
pub mod util;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use exec::{run_plan, AttemptResult, ExecError, RunOptions};
pub use plan::{load_plan, PlanError, PlanSpec, TaskSpec};
pub use report::{build_summary, render_markdown};
pub use state::{RunState, RunStatus, TaskState, TaskStatus};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
