//! The run sequence: server, readiness, client, teardown, verdict.

use crate::cli::RunOptions;
use crate::error::HarnessError;
use crate::logger::Logger;
use crate::process_runner::{ProcessHandle, ProcessRunner};
use crate::readiness::ReadinessProbe;
use futures_util::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, warn};

const SERVER_PREFIX: &str = "[srv] ";
const CLIENT_PREFIX: &str = "[cli] ";

/// Bound on waiting for a process's output after it exited; a grandchild
/// may still hold the pipe open
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Phases of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ServerStarting,
    WaitingForReady,
    ClientRunning,
    ShuttingDown,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Phase::Idle => "idle",
            Phase::ServerStarting => "server-starting",
            Phase::WaitingForReady => "waiting-for-ready",
            Phase::ClientRunning => "client-running",
            Phase::ShuttingDown => "shutting-down",
            Phase::Done => "done",
        };
        f.write_str(tag)
    }
}

/// Outcome of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub success: bool,
    pub exit_code: i32,
    pub reason: Option<String>,
}

impl Verdict {
    pub fn passed() -> Self {
        Self {
            success: true,
            exit_code: 0,
            reason: None,
        }
    }

    pub fn failed(exit_code: i32, reason: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            reason: Some(reason.into()),
        }
    }

    /// Exit code clamped to what a process can report
    ///
    /// Failures whose code does not fit in `1..=255` report 1 so that a
    /// failing run can never look like success.
    pub fn process_exit_code(&self) -> u8 {
        match u8::try_from(self.exit_code) {
            Ok(0) if !self.success => 1,
            Ok(code) => code,
            Err(_) => 1,
        }
    }
}

impl From<&HarnessError> for Verdict {
    fn from(error: &HarnessError) -> Self {
        Verdict::failed(error.exit_code(), error.to_string())
    }
}

/// Drives one server/client run and produces its [`Verdict`]
pub struct Orchestrator<'a> {
    options: &'a RunOptions,
    logger: Logger,
    runner: ProcessRunner,
    phase: Phase,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator for `options`, writing its transcript to
    /// `logger`
    pub fn new(options: &'a RunOptions, logger: Logger) -> Self {
        Self {
            runner: ProcessRunner::new(logger.clone(), options.launch_mode),
            options,
            logger,
            phase: Phase::Idle,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Runs the whole sequence
    ///
    /// Once the server has been launched it is shut down on every path,
    /// including a panic in the run itself, and the shutdown never changes
    /// the verdict.
    pub async fn run(&mut self) -> Verdict {
        if let Err(e) = self.validate_binaries() {
            return self.finish(Err(e));
        }

        self.logger.header("HTTP Integration Test");

        let probe = match ReadinessProbe::new(self.logger.clone(), self.options.poll_interval) {
            Ok(probe) => probe,
            Err(e) => {
                error!("failed to build HTTP client: {}", e);
                self.logger
                    .info(&format!("Error: failed to build HTTP client: {e}"));
                return self.done(Verdict::failed(1, format!("failed to build HTTP client: {e}")));
            }
        };

        self.enter(Phase::ServerStarting);
        let mut server = match self.runner.start(
            &self.options.server_binary,
            &self.options.server_args,
            SERVER_PREFIX,
        ) {
            Ok(server) => server,
            Err(e) => return self.finish(Err(e)),
        };
        self.enter(Phase::WaitingForReady);

        let outcome = AssertUnwindSafe(self.exercise(&probe, &mut server))
            .catch_unwind()
            .await;

        self.enter(Phase::ShuttingDown);
        if let Err(e) = server.shutdown(self.options.grace_period).await {
            warn!("server shutdown failed: {}", e);
            self.logger.info(&format!("Error during server shutdown: {e}"));
        }
        if timeout(OUTPUT_DRAIN_TIMEOUT, server.drain()).await.is_err() {
            debug!("server output still open after shutdown");
        }

        match outcome {
            Ok(result) => self.finish(result),
            Err(_) => {
                self.logger
                    .info("Error during integration test: run panicked");
                self.done(Verdict::failed(1, "run panicked"))
            }
        }
    }

    fn validate_binaries(&self) -> Result<(), HarnessError> {
        let binaries = [
            ("Server", &self.options.server_binary),
            ("Client", &self.options.client_binary),
        ];
        for (role, path) in binaries {
            if !path.exists() {
                return Err(HarnessError::MissingBinary {
                    role,
                    path: path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Readiness and client phases, with the server already running
    async fn exercise(
        &mut self,
        probe: &ReadinessProbe,
        server: &mut ProcessHandle,
    ) -> Result<(), HarnessError> {
        let health_url = self.options.health_url();
        self.logger
            .phase(self.phase, &format!("Waiting for server to be ready at {health_url}..."));
        probe
            .wait_until_ready(&health_url, server, self.options.startup_timeout)
            .await?;
        self.logger.phase(self.phase, "Server is ready!");

        self.enter(Phase::ClientRunning);
        let mut client = self.runner.start(
            &self.options.client_binary,
            &self.options.client_args,
            CLIENT_PREFIX,
        )?;
        let exit_code = client.wait().await?;
        if timeout(OUTPUT_DRAIN_TIMEOUT, client.drain()).await.is_err() {
            debug!("client output still open after exit");
        }
        self.logger
            .phase(self.phase, &format!("Client exited with code {exit_code}"));

        if exit_code != 0 {
            return Err(HarnessError::ClientFailure { exit_code });
        }
        Ok(())
    }

    fn enter(&mut self, phase: Phase) {
        debug!("phase {} -> {}", self.phase, phase);
        self.phase = phase;
        self.logger.phase(phase, "entered");
    }

    fn finish(&mut self, result: Result<(), HarnessError>) -> Verdict {
        match result {
            Ok(()) => {
                self.logger.header("All tests passed!");
                self.done(Verdict::passed())
            }
            Err(e) => {
                error!("{}", e);
                self.logger.phase(self.phase, &format!("Error: {e}"));
                self.done(Verdict::from(&e))
            }
        }
    }

    fn done(&mut self, verdict: Verdict) -> Verdict {
        self.phase = Phase::Done;
        self.logger.phase(
            Phase::Done,
            &format!(
                "verdict: {} (exit code {})",
                if verdict.success { "PASS" } else { "FAIL" },
                verdict.exit_code
            ),
        );
        verdict
    }
}
