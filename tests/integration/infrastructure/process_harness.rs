use anyhow::{Context, Result};
use chrono::{NaiveTime, TimeDelta};
use itest_bridge::{Logger, MemorySink, Orchestrator, RunOptions, Verdict};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::timeout;

/// Core testing harness for running the bridge against the stub fixtures
pub struct BridgeTestHarness {
    bridge_binary: PathBuf,
    server_binary: PathBuf,
    client_binary: PathBuf,
    temp_dir: TempDir,
    port: u16,
}

impl BridgeTestHarness {
    /// Create a new test harness on a free local port
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().context("Failed to create temporary directory")?;

        Ok(Self {
            bridge_binary: PathBuf::from(env!("CARGO_BIN_EXE_itest-bridge")),
            server_binary: PathBuf::from(env!("CARGO_BIN_EXE_stub-server")),
            client_binary: PathBuf::from(env!("CARGO_BIN_EXE_stub-client")),
            temp_dir,
            port: free_port()?,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn server_binary(&self) -> &Path {
        &self.server_binary
    }

    pub fn client_binary(&self) -> &Path {
        &self.client_binary
    }

    /// Get the temporary directory path for test files
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Run options wiring the stub server and client to this harness' port
    ///
    /// Timings are shortened so failing scenarios finish quickly.
    pub fn options(&self) -> RunOptions {
        let mut options = RunOptions::new(&self.server_binary, &self.client_binary);
        options.host = "127.0.0.1".to_string();
        options.port = self.port;
        options.startup_timeout = Duration::from_secs(10);
        options.poll_interval = Duration::from_millis(100);
        options.server_args = vec![
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            self.port.to_string(),
        ];
        options.client_args = vec!["--url".to_string(), self.base_url()];
        options
    }

    /// Run the orchestrator in-process, capturing its transcript
    pub async fn run(&self, options: &RunOptions) -> Result<TestRun> {
        let sink = MemorySink::new();
        let start_time = Instant::now();

        let mut orchestrator = Orchestrator::new(options, Logger::from_writer(sink.clone()));
        let verdict = timeout(Duration::from_secs(60), orchestrator.run())
            .await
            .context("orchestrator did not finish within 60s")?;

        Ok(TestRun {
            verdict,
            transcript: sink.contents(),
            elapsed: start_time.elapsed(),
        })
    }

    /// Spawn the bridge binary with the given arguments and collect its output
    pub async fn run_bridge(&self, args: &[&str]) -> Result<Output> {
        let mut cmd = Command::new(&self.bridge_binary);
        cmd.args(args)
            .env_remove("RUST_LOG")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().context("Failed to spawn itest-bridge")?;
        timeout(Duration::from_secs(60), child.wait_with_output())
            .await
            .context("itest-bridge did not exit within 60s")?
            .context("Failed to collect itest-bridge output")
    }

    /// Bridge arguments for a full run against this harness' port
    pub fn bridge_args(&self) -> Vec<String> {
        let port = self.port.to_string();
        vec![
            "--host".to_string(),
            "127.0.0.1".to_string(),
            "--port".to_string(),
            port.clone(),
            "--poll-interval-ms".to_string(),
            "100".to_string(),
            "--server-arg=--host".to_string(),
            "--server-arg=127.0.0.1".to_string(),
            "--server-arg=--port".to_string(),
            format!("--server-arg={port}"),
            self.server_binary.display().to_string(),
            self.client_binary.display().to_string(),
            "--url".to_string(),
            self.base_url(),
        ]
    }
}

/// Outcome of one in-process orchestration run
pub struct TestRun {
    pub verdict: Verdict,
    pub transcript: String,
    pub elapsed: Duration,
}

impl TestRun {
    pub fn contains(&self, needle: &str) -> bool {
        self.transcript.contains(needle)
    }

    /// Timestamp of the first transcript line containing `needle`
    pub fn logged_at(&self, needle: &str) -> Option<NaiveTime> {
        let line = self.transcript.lines().find(|line| line.contains(needle))?;
        let stamp = line.strip_prefix('[')?.split_once(']')?.0;
        NaiveTime::parse_from_str(stamp, "%H:%M:%S%.3f").ok()
    }

    /// Time between the first lines containing `from` and `to`
    pub fn time_between(&self, from: &str, to: &str) -> Option<Duration> {
        let mut delta = self.logged_at(to)? - self.logged_at(from)?;
        if delta < TimeDelta::zero() {
            // The run crossed midnight
            delta += TimeDelta::days(1);
        }
        delta.to_std().ok()
    }

    /// Assert the transcript mentions `needle`, printing it otherwise
    pub fn assert_logged(&self, needle: &str) {
        assert!(
            self.contains(needle),
            "expected {:?} in transcript:\n{}",
            needle,
            self.transcript
        );
    }
}

fn free_port() -> Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("Failed to reserve a port")?;
    Ok(listener.local_addr()?.port())
}
