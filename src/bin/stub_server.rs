use clap::Parser;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use itest_bridge::fixture::server::{self, ServerConfig};
use itest_bridge::Result;

/// HTTP server for testing the harness
#[derive(Parser)]
#[command(name = "stub-server")]
#[command(about = "HTTP server for testing the harness")]
struct Cli {
    /// Host to bind to
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Prefer IPv6 and accept IPv4 on the same socket
    #[arg(long)]
    ipv6: bool,

    /// Answer CORS preflights and add CORS headers
    #[arg(long)]
    cors: bool,

    /// Path of the health endpoint
    #[arg(long, default_value = "/health")]
    health_path: String,

    /// Serve no health endpoint
    #[arg(long)]
    no_health: bool,

    /// Log every handled request
    #[arg(long)]
    verbose: bool,

    /// Delay before binding (ms)
    #[arg(long)]
    startup_delay_ms: Option<u64>,

    /// Exit with status 1 after this long without ever binding (ms)
    #[arg(long)]
    crash_after_ms: Option<u64>,

    /// Keep running when interrupted
    #[arg(long)]
    ignore_interrupt: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // The harness timestamps every line itself
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
    let config = ServerConfig {
        host: cli.host,
        port: cli.port,
        ipv6: cli.ipv6,
        cors: cli.cors,
        health_path: (!cli.no_health).then_some(cli.health_path),
        verbose: cli.verbose,
        startup_delay: cli.startup_delay_ms.map(Duration::from_millis),
        crash_after: cli.crash_after_ms.map(Duration::from_millis),
        ignore_interrupt: cli.ignore_interrupt,
    };

    server::run(config).await
}
