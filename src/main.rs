use std::process::ExitCode;

use stagehand::cli::{App, Args, Config};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();
    let config = match Config::load(args.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return ExitCode::from(2);
        }
    };

    App::new(config).run(args).await
}
