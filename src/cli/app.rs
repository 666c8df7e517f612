// ABOUTME: Main application orchestration for the stagehand CLI
// ABOUTME: Coordinates logging setup, configuration, and command dispatch

use std::process::ExitCode;

use tracing::debug;
use tracing_subscriber::EnvFilter;

use super::args::resolve_fail_fast;
use super::commands;
use super::{Args, Commands, Config};

pub struct App {
    config: Config,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Initialize logging. Precedence: STAGEHAND_LOG env filter, then the
    /// --verbose flag, then the configured level.
    pub fn init_logging(&self, verbose: bool, no_color: bool) {
        let level = if verbose {
            "debug"
        } else {
            &self.config.logging.level
        };
        let env_filter =
            EnvFilter::try_from_env("STAGEHAND_LOG").unwrap_or_else(|_| EnvFilter::new(level));

        match self.config.logging.format.as_str() {
            "compact" => {
                tracing_subscriber::fmt()
                    .compact()
                    .with_env_filter(env_filter)
                    .with_ansi(!no_color)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .init();
            }
            _ => {
                tracing_subscriber::fmt()
                    .with_env_filter(env_filter)
                    .with_ansi(!no_color)
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .init();
            }
        }

        debug!("logging initialized at level {}", level);
    }

    /// Dispatch the parsed arguments to a command; the returned code is the
    /// process exit status.
    pub async fn run(&self, args: Args) -> ExitCode {
        self.init_logging(args.verbose, args.no_color);

        match args.command {
            Commands::Run {
                plan,
                max_parallel,
                home,
                workdir,
                fail_fast,
                no_fail_fast,
                dry_run,
            } => {
                let fail_fast = resolve_fail_fast(fail_fast, no_fail_fast, self.config.fail_fast);
                commands::run(
                    plan,
                    max_parallel,
                    home,
                    workdir,
                    fail_fast,
                    dry_run,
                    &self.config,
                )
                .await
            }

            Commands::Resume {
                run_id,
                home,
                max_parallel,
                workdir,
                fail_fast,
                no_fail_fast,
                failed_only,
            } => {
                let fail_fast = resolve_fail_fast(fail_fast, no_fail_fast, self.config.fail_fast);
                commands::resume(
                    run_id,
                    home,
                    max_parallel,
                    workdir,
                    fail_fast,
                    failed_only,
                    &self.config,
                )
                .await
            }

            Commands::Status { run_id, home, json } => {
                commands::status(run_id, home, json, &self.config).await
            }

            Commands::Logs {
                run_id,
                home,
                task,
                tail,
            } => commands::logs(run_id, home, task, tail, &self.config).await,

            Commands::Cancel { run_id, home } => {
                commands::cancel(run_id, home, &self.config).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_holds_config() {
        let app = App::new(Config::default());
        assert_eq!(app.config.max_parallel, 4);
    }
}
