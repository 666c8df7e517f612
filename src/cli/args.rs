// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the run/resume/status/logs/cancel subcommands and global flags

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "A CLI task orchestrator that executes DAG plans of subprocess invocations")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Execute a plan from a YAML file
    Run {
        #[arg(help = "Path to plan YAML file")]
        plan: PathBuf,

        #[arg(long, help = "Maximum number of concurrently running tasks")]
        max_parallel: Option<usize>,

        #[arg(long, help = "Orchestrator home directory (runs live under <home>/runs)")]
        home: Option<PathBuf>,

        #[arg(long, help = "Default working directory for tasks")]
        workdir: Option<PathBuf>,

        #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_fail_fast",
              help = "Stop admitting new tasks after the first failure")]
        fail_fast: bool,

        #[arg(long, action = ArgAction::SetTrue, overrides_with = "fail_fast",
              help = "Keep admitting tasks after failures")]
        no_fail_fast: bool,

        #[arg(long, help = "Validate and print topological order without executing")]
        dry_run: bool,
    },

    /// Resume an interrupted or failed run
    Resume {
        #[arg(help = "Run id to resume")]
        run_id: String,

        #[arg(long, help = "Orchestrator home directory")]
        home: Option<PathBuf>,

        #[arg(long, help = "Maximum number of concurrently running tasks")]
        max_parallel: Option<usize>,

        #[arg(long, help = "Default working directory for tasks")]
        workdir: Option<PathBuf>,

        #[arg(long, action = ArgAction::SetTrue, overrides_with = "no_fail_fast",
              help = "Stop admitting new tasks after the first failure")]
        fail_fast: bool,

        #[arg(long, action = ArgAction::SetTrue, overrides_with = "fail_fast",
              help = "Keep admitting tasks after failures")]
        no_fail_fast: bool,

        #[arg(long, help = "Re-execute only previously failed tasks (and their dependents)")]
        failed_only: bool,
    },

    /// Print the state of a run
    Status {
        #[arg(help = "Run id to inspect")]
        run_id: String,

        #[arg(long, help = "Orchestrator home directory")]
        home: Option<PathBuf>,

        #[arg(long, help = "Emit the raw state as JSON")]
        json: bool,
    },

    /// Print the tail of task logs
    Logs {
        #[arg(help = "Run id to inspect")]
        run_id: String,

        #[arg(long, help = "Orchestrator home directory")]
        home: Option<PathBuf>,

        #[arg(long, help = "Only this task's logs")]
        task: Option<String>,

        #[arg(long, default_value_t = 100, help = "Number of tail lines per stream")]
        tail: usize,
    },

    /// Request cancellation of a running run
    Cancel {
        #[arg(help = "Run id to cancel")]
        run_id: String,

        #[arg(long, help = "Orchestrator home directory")]
        home: Option<PathBuf>,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Effective fail-fast value from the flag pair and the configured default.
pub fn resolve_fail_fast(fail_fast: bool, no_fail_fast: bool, default: bool) -> bool {
    if no_fail_fast {
        false
    } else if fail_fast {
        true
    } else {
        default
    }
}
