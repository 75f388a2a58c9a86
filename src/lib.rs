//! Process orchestration harness for black-box integration tests.
//!
//! The harness launches a server binary, waits for its health endpoint to
//! answer, runs a client binary against it, and tears the server down with
//! an escalating graceful-shutdown sequence. Output of both processes is
//! forwarded, timestamped and prefixed, into a shared [`Logger`].
//!
//! The `fixture` module holds the stub server and client that the crate's
//! own end-to-end tests drive through the harness.

pub type Result<T> = color_eyre::eyre::Result<T>;

pub mod cli;
pub mod command_line;
pub mod error;
pub mod fixture;
pub mod logger;
pub mod orchestrator;
pub mod output;
pub mod process_runner;
pub mod readiness;
mod signals;

pub use cli::{Cli, RunOptions};
pub use error::HarnessError;
pub use logger::{Logger, MemorySink};
pub use orchestrator::{Orchestrator, Phase, Verdict};
pub use process_runner::{LaunchMode, ProcessHandle, ProcessRunner, ProcessState};
pub use readiness::{ExitWatch, ReadinessProbe};
