use crate::command_line;
use crate::error::HarnessError;
use crate::logger::Logger;
use crate::output::spawn_forwarder;
use crate::readiness::ExitWatch;
use crate::signals::request_graceful_stop;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// How a process is launched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchMode {
    /// Execute the program directly with its argument vector
    #[default]
    Direct,
    /// Run one quoted command line through the platform shell
    Shell,
}

/// Lifecycle state of a launched process
///
/// A handle only exists once the spawn succeeded, so it starts out
/// `Running` and never returns to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process is running
    Running,
    /// Process exited on its own or after a graceful stop request
    Exited,
    /// Process was force-killed
    Killed,
}

/// Launches external programs with their output forwarded to the [`Logger`]
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    logger: Logger,
    launch_mode: LaunchMode,
}

impl ProcessRunner {
    /// Creates a new runner
    ///
    /// # Arguments
    /// * `logger` - Transcript sink shared with the forwarding tasks
    /// * `launch_mode` - Whether programs run directly or through a shell
    pub fn new(logger: Logger, launch_mode: LaunchMode) -> Self {
        Self { logger, launch_mode }
    }

    /// Launches `command` with `args`
    ///
    /// Standard output and error are both captured and forwarded line by
    /// line, each line prefixed with `log_prefix` and timestamped, by a
    /// background task that lives until the process closes its output.
    ///
    /// # Arguments
    /// * `command` - Path of the executable
    /// * `args` - Argument vector passed to it
    /// * `log_prefix` - Prefix for forwarded lines, e.g. `"[srv] "`
    ///
    /// # Returns
    /// * `Result<ProcessHandle, HarnessError>` - The running process, or
    ///   `HarnessError::Launch` if it could not be spawned
    pub fn start(
        &self,
        command: &Path,
        args: &[String],
        log_prefix: &str,
    ) -> Result<ProcessHandle, HarnessError> {
        let program = command.to_string_lossy().into_owned();
        let launch_error = |source: std::io::Error| HarnessError::Launch {
            command: program.clone(),
            source,
        };

        let words = std::iter::once(program.as_str()).chain(args.iter().map(String::as_str));
        let command_line = command_line::join(words).map_err(launch_error)?;

        let (mut process, invocation) = match self.launch_mode {
            LaunchMode::Direct => {
                let mut process = Command::new(command);
                process.args(args);
                (process, command_line)
            }
            LaunchMode::Shell => shell_command(&command_line).map_err(launch_error)?,
        };
        self.logger
            .info(&format!("--- STARTING {log_prefix}{invocation}"));
        process
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = process.spawn().map_err(launch_error)?;
        let pid = child.id();
        info!("spawned {} with pid {:?}", program, pid);

        let forwarder = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => Some(spawn_forwarder(
                stdout,
                stderr,
                log_prefix.to_string(),
                self.logger.clone(),
            )),
            _ => None,
        };

        Ok(ProcessHandle {
            name: log_prefix.trim().to_string(),
            command: command.to_path_buf(),
            args: args.to_vec(),
            launched_at: Local::now(),
            started: Instant::now(),
            pid,
            state: ProcessState::Running,
            exit_code: None,
            child,
            forwarder,
            logger: self.logger.clone(),
        })
    }
}

/// Builds the shell invocation for `command_line` and the line that
/// describes it in the transcript
#[cfg(unix)]
fn shell_command(command_line: &str) -> std::io::Result<(Command, String)> {
    // exec keeps the pid we signal equal to the program's pid
    let script = format!("exec {command_line}");
    let invocation = command_line::join(["sh", "-c", script.as_str()])?;
    let mut process = Command::new("sh");
    process.arg("-c").arg(script);
    Ok((process, invocation))
}

#[cfg(windows)]
fn shell_command(command_line: &str) -> std::io::Result<(Command, String)> {
    let mut process = Command::new("cmd");
    process.arg("/C").raw_arg(command_line);
    Ok((process, format!("cmd /C {command_line}")))
}

/// A launched process and its output-forwarding task
///
/// The handle exclusively owns the child. Dropping a handle whose process
/// is still running kills it.
pub struct ProcessHandle {
    name: String,
    command: PathBuf,
    args: Vec<String>,
    launched_at: DateTime<Local>,
    started: Instant,
    pid: Option<u32>,
    state: ProcessState,
    exit_code: Option<i32>,
    child: Child,
    forwarder: Option<JoinHandle<()>>,
    logger: Logger,
}

impl ProcessHandle {
    /// Name used in log lines, derived from the log prefix
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Wall-clock time the process was launched
    pub fn launched_at(&self) -> DateTime<Local> {
        self.launched_at
    }

    /// Time since launch
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// OS process id assigned at spawn
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// Exit code, once the process has been observed to exit
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Polls whether the process is still running without blocking
    ///
    /// Once an exit has been observed the code is cached and later calls
    /// return `false` without touching the OS again.
    pub fn is_alive(&mut self) -> Result<bool, HarnessError> {
        if self.state != ProcessState::Running {
            return Ok(false);
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.record_exit(status, ProcessState::Exited);
                Ok(false)
            }
            Ok(None) => Ok(true),
            Err(e) => Err(HarnessError::process(&self.name, e)),
        }
    }

    /// Waits for the process to exit and returns its exit code
    ///
    /// Returns the cached code immediately if the exit was already seen.
    pub async fn wait(&mut self) -> Result<i32, HarnessError> {
        if let Some(code) = self.exit_code {
            return Ok(code);
        }
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| HarnessError::process(&self.name, e))?;
        Ok(self.record_exit(status, ProcessState::Exited))
    }

    /// Stops the process, escalating to a forced kill
    ///
    /// A process that already exited is left alone and only its cached exit
    /// code is logged, so calling this twice is harmless. Otherwise a
    /// graceful stop request is sent and the process gets `grace_period` to
    /// exit before it is killed.
    pub async fn shutdown(&mut self, grace_period: Duration) -> Result<(), HarnessError> {
        if !self.is_alive()? {
            self.logger.info(&format!(
                "{} already terminated with exit code {}",
                self.name,
                self.exit_code.unwrap_or_default()
            ));
            return Ok(());
        }

        self.logger
            .info(&format!("--- Shutting down {} ---", self.name));

        if let Err(e) = request_graceful_stop(&mut self.child) {
            warn!("failed to request graceful stop of {}: {}", self.name, e);
        }

        match timeout(grace_period, self.child.wait()).await {
            Ok(Ok(status)) => {
                self.record_exit(status, ProcessState::Exited);
            }
            Ok(Err(e)) => return Err(HarnessError::process(&self.name, e)),
            Err(_) => {
                let stalled = HarnessError::ShutdownTimeout {
                    name: self.name.clone(),
                    grace: grace_period,
                };
                self.logger.info(&stalled.to_string());
                self.force_kill().await?;
            }
        }

        self.logger.info(&format!("{} stopped.", self.name));
        debug!(
            "{} ({}) launched at {} stopped after {:?}",
            self.name,
            self.command.display(),
            self.launched_at.format("%H:%M:%S%.3f"),
            self.uptime()
        );
        Ok(())
    }

    /// Kills the process and waits for it unconditionally
    pub async fn force_kill(&mut self) -> Result<(), HarnessError> {
        if self.state != ProcessState::Running {
            return Ok(());
        }
        info!("force killing {} (pid {:?})", self.name, self.pid);

        // Child::kill waits for the process after delivering the kill
        self.child
            .kill()
            .await
            .map_err(|e| HarnessError::process(&self.name, e))?;
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| HarnessError::process(&self.name, e))?;
        self.record_exit(status, ProcessState::Killed);
        Ok(())
    }

    /// Waits until every line the process wrote has reached the logger
    ///
    /// Resolves when the process closes its output streams. Later calls
    /// return immediately.
    pub async fn drain(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            if let Err(e) = forwarder.await {
                warn!("output forwarder for {} failed: {}", self.name, e);
            }
        }
    }

    fn record_exit(&mut self, status: ExitStatus, state: ProcessState) -> i32 {
        let code = exit_code_of(status);
        self.exit_code = Some(code);
        self.state = state;
        debug!(
            "{} exited with status {:?} after {:?}",
            self.name,
            status,
            self.uptime()
        );
        code
    }
}

impl ExitWatch for ProcessHandle {
    fn poll_exit(&mut self) -> Result<Option<i32>, HarnessError> {
        Ok(if self.is_alive()? { None } else { self.exit_code })
    }
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("name", &self.name)
            .field("command", &self.command)
            .field("args", &self.args)
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("exit_code", &self.exit_code)
            .finish()
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        // kill_on_drop reaps the child; this only records that it happened
        if self.state == ProcessState::Running && matches!(self.child.try_wait(), Ok(None)) {
            warn!(
                "{} dropped while running (pid {:?}), killing it",
                self.name, self.pid
            );
        }
    }
}

/// Maps an exit status to a shell-style exit code
///
/// A process killed by signal N reports 128 + N.
pub fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
