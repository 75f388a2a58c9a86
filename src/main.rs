use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use itest_bridge::{Cli, Logger, Orchestrator, Result, RunOptions};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Initialize error handling and logging
    color_eyre::install()?;

    // Diagnostics go to stderr so they never mix with the run transcript
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Convert CLI to run options
    let options = RunOptions::from_cli(cli)?;
    debug!("run options: {:?}", options);

    let verdict = Orchestrator::new(&options, Logger::stdout()).run().await;

    info!(
        "itest-bridge exiting with code {} ({:?})",
        verdict.exit_code, verdict.reason
    );
    Ok(ExitCode::from(verdict.process_exit_code()))
}
