use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures of a single orchestration run
///
/// Every variant maps onto a deterministic process exit code through
/// [`HarnessError::exit_code`].
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A binary given on the command line does not exist
    #[error("{role} binary not found: {}", .path.display())]
    MissingBinary { role: &'static str, path: PathBuf },

    /// The executable could not be found or spawned
    #[error("failed to launch {command}: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The health endpoint never answered within the startup timeout
    #[error("server failed to start within {}s (polled {url})", .timeout.as_secs_f64())]
    ReadinessTimeout { url: String, timeout: Duration },

    /// The server exited before its health endpoint answered
    #[error("server process terminated with exit code {exit_code} before becoming ready")]
    ProcessDiedEarly { exit_code: i32 },

    /// The client ran to completion but reported failure
    #[error("client tests failed with exit code {exit_code}")]
    ClientFailure { exit_code: i32 },

    /// A process ignored the graceful stop request
    ///
    /// Recovered locally by force-killing; only ever logged.
    #[error("{name} did not shut down gracefully within {}s, terminating...", .grace.as_secs_f64())]
    ShutdownTimeout { name: String, grace: Duration },

    /// The OS failed while polling, signalling or waiting on a process
    #[error("error while managing {name}: {source}")]
    Process {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl HarnessError {
    /// Exit code the harness reports for this failure
    ///
    /// A failing client's own code is propagated; every other condition is
    /// a setup or readiness failure and maps to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::ClientFailure { exit_code } if *exit_code != 0 => *exit_code,
            _ => 1,
        }
    }

    pub(crate) fn process(name: &str, source: io::Error) -> Self {
        HarnessError::Process {
            name: name.to_string(),
            source,
        }
    }
}
