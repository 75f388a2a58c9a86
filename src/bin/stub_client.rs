use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use itest_bridge::fixture::client::run_checks;
use itest_bridge::Result;

/// HTTP client tests against the stub server
#[derive(Parser)]
#[command(name = "stub-client")]
#[command(about = "HTTP client tests against the stub server")]
struct Cli {
    /// Base URL for tests
    #[arg(long, default_value = "http://localhost:8080")]
    url: String,

    /// Exit with this code when every check passes
    #[arg(long, default_value = "0")]
    exit_code: u8,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .without_time()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::io::stdout),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let outcomes = run_checks(&cli.url).await?;

    let mut failures = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(()) => info!("{} ... ok", outcome.name),
            Err(e) => {
                failures += 1;
                error!("{} ... FAIL: {:#}", outcome.name, e);
            }
        }
    }
    info!(
        "Ran {} tests, {} failed",
        outcomes.len(),
        failures
    );

    if failures > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::from(cli.exit_code))
}
