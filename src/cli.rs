use clap::Parser;
use eyre::eyre;
use std::path::PathBuf;
use std::time::Duration;

use crate::process_runner::LaunchMode;

type Result<T> = color_eyre::eyre::Result<T>;

/// Runs a client binary against a server binary for an integration test
#[derive(Debug, Parser)]
#[command(name = "itest-bridge")]
#[command(about = "Runs a client binary against a server binary for an integration test")]
#[command(version)]
pub struct Cli {
    /// Server binary path
    pub server_binary: PathBuf,

    /// Client test binary path
    pub client_binary: PathBuf,

    /// Server host
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Server port
    #[arg(long, default_value = "8080")]
    pub port: u16,

    /// Server startup timeout (seconds)
    #[arg(long, default_value = "30")]
    pub timeout: u64,

    /// Path polled to decide the server is ready
    #[arg(long, default_value = "/health")]
    pub health_path: String,

    /// Time the server gets to exit after the stop request (seconds)
    #[arg(long, default_value = "3")]
    pub grace_period: u64,

    /// Pause between health checks (ms)
    #[arg(long, default_value = "500")]
    pub poll_interval_ms: u64,

    /// Argument passed to the server (repeatable)
    #[arg(long = "server-arg", allow_hyphen_values = true)]
    pub server_args: Vec<String>,

    /// Launch both binaries through the platform shell
    #[arg(long)]
    pub shell: bool,

    /// Arguments passed verbatim to the client
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub client_args: Vec<String>,
}

/// Options for one orchestration run
///
/// Built once at startup and passed by reference to every component.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub server_binary: PathBuf,
    pub client_binary: PathBuf,
    pub server_args: Vec<String>,
    pub client_args: Vec<String>,
    pub host: String,
    pub port: u16,
    /// How long the server may take to answer its health endpoint
    pub startup_timeout: Duration,
    pub health_path: String,
    /// How long the server may take to exit after the stop request
    pub grace_period: Duration,
    /// Pause between failed health checks
    pub poll_interval: Duration,
    pub launch_mode: LaunchMode,
}

impl RunOptions {
    /// Options with the command-line defaults for the given binaries
    pub fn new(server_binary: impl Into<PathBuf>, client_binary: impl Into<PathBuf>) -> Self {
        Self {
            server_binary: server_binary.into(),
            client_binary: client_binary.into(),
            server_args: Vec::new(),
            client_args: Vec::new(),
            host: "localhost".to_string(),
            port: 8080,
            startup_timeout: Duration::from_secs(30),
            health_path: "/health".to_string(),
            grace_period: Duration::from_secs(3),
            poll_interval: Duration::from_millis(500),
            launch_mode: LaunchMode::Direct,
        }
    }

    /// Converts parsed command-line arguments into run options
    pub fn from_cli(cli: Cli) -> Result<Self> {
        if cli.host.trim().is_empty() {
            return Err(eyre!("Invalid host: must not be empty"));
        }
        if cli.poll_interval_ms == 0 {
            return Err(eyre!("Invalid poll interval: must be at least 1ms"));
        }

        let health_path = if cli.health_path.starts_with('/') {
            cli.health_path
        } else {
            format!("/{}", cli.health_path)
        };

        Ok(RunOptions {
            server_binary: cli.server_binary,
            client_binary: cli.client_binary,
            server_args: cli.server_args,
            client_args: cli.client_args,
            host: cli.host,
            port: cli.port,
            startup_timeout: Duration::from_secs(cli.timeout),
            health_path,
            grace_period: Duration::from_secs(cli.grace_period),
            poll_interval: Duration::from_millis(cli.poll_interval_ms),
            launch_mode: if cli.shell {
                LaunchMode::Shell
            } else {
                LaunchMode::Direct
            },
        })
    }

    /// Base URL of the server, e.g. `http://localhost:8080`
    ///
    /// IPv6 literals are bracketed.
    pub fn server_url(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("http://[{}]:{}", self.host, self.port)
        } else {
            format!("http://{}:{}", self.host, self.port)
        }
    }

    /// URL polled for readiness
    pub fn health_url(&self) -> String {
        format!("{}{}", self.server_url(), self.health_path)
    }
}
