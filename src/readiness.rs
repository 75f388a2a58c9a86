use crate::error::HarnessError;
use crate::logger::Logger;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Upper bound for a single health request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

/// Default pause between failed health requests
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Non-blocking view of whether a watched process has exited
pub trait ExitWatch {
    /// Returns the exit code once the process has exited, `None` while it
    /// is still running
    fn poll_exit(&mut self) -> Result<Option<i32>, HarnessError>;
}

/// Polls a health endpoint until a server answers
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    client: reqwest::Client,
    interval: Duration,
    logger: Logger,
}

impl ReadinessProbe {
    /// Creates a probe that waits `interval` between failed attempts
    pub fn new(logger: Logger, interval: Duration) -> Result<Self, reqwest::Error> {
        // Health checks target the local server, never an ambient proxy
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            interval,
            logger,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until `url` answers, the watched process exits, or `timeout`
    /// elapses
    ///
    /// Any HTTP response counts as ready, whatever its status. Refused or
    /// timed-out connections are only logged; the deadline and the process
    /// exit are the only terminal conditions.
    ///
    /// # Returns
    /// * `Ok(())` - The endpoint answered
    /// * `Err(HarnessError::ProcessDiedEarly)` - The process exited first
    /// * `Err(HarnessError::ReadinessTimeout)` - The deadline passed
    pub async fn wait_until_ready<W: ExitWatch + ?Sized>(
        &self,
        url: &str,
        process: &mut W,
        timeout: Duration,
    ) -> Result<(), HarnessError> {
        let deadline = Instant::now() + timeout;
        let mut attempt = 0u32;
        debug!(
            "probing {} every {:?} for up to {:?}",
            url,
            self.interval(),
            timeout
        );

        loop {
            if let Some(exit_code) = process.poll_exit()? {
                return Err(HarnessError::ProcessDiedEarly { exit_code });
            }

            attempt += 1;
            match self.client.get(url).send().await {
                Ok(response) => {
                    debug!(
                        "health check {} answered {} on attempt {}",
                        url,
                        response.status(),
                        attempt
                    );
                    return Ok(());
                }
                Err(e) => {
                    self.logger
                        .info(&format!("Server not ready yet: {}", describe(&e)));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(self.interval.min(deadline - now)).await;
            if Instant::now() >= deadline {
                break;
            }
        }

        Err(HarnessError::ReadinessTimeout {
            url: url.to_string(),
            timeout,
        })
    }
}

/// Flattens a reqwest error and its causes into one line
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
