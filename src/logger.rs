use chrono::Local;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::warn;

/// Tag used for lines the harness writes about itself
pub const HARNESS_TAG: &str = "[INT]";

const BANNER: &str = "==============================";

/// Timestamped, flush-on-write transcript sink shared by every component
///
/// Cloning a `Logger` is cheap and every clone writes to the same sink.
/// Each line is formatted completely before the sink lock is taken and is
/// written with a single `write_all`, so concurrent writers never merge
/// two lines.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Logger {
    /// Creates a logger writing to the process's standard output
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    /// Creates a logger writing to an arbitrary sink
    ///
    /// # Arguments
    /// * `writer` - Destination for transcript lines
    pub fn from_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Writes `[timestamp] <prefix><message>` as one line
    ///
    /// Output forwarded from a child process goes through here with the
    /// child's prefix (e.g. `"[srv] "`).
    pub fn line(&self, prefix: &str, message: &str) {
        let line = format!("[{}] {}{}\n", timestamp(), prefix, message);
        self.write_line(line.as_bytes());
    }

    /// Writes a harness line tagged with `[INT]`
    pub fn info(&self, message: &str) {
        self.line(&format!("{HARNESS_TAG} "), message);
    }

    /// Writes a harness line tagged with `[INT]` and a phase tag
    pub fn phase(&self, phase: impl std::fmt::Display, message: &str) {
        self.line(&format!("{HARNESS_TAG} [{phase}] "), message);
    }

    /// Writes a message framed by banner lines
    pub fn header(&self, message: &str) {
        self.info(BANNER);
        self.info(message);
        self.info(BANNER);
    }

    fn write_line(&self, bytes: &[u8]) {
        let mut sink = self.lock();
        if let Err(e) = sink.write_all(bytes).and_then(|_| sink.flush()) {
            warn!("failed to write transcript line: {}", e);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        // A panic while holding the lock cannot leave a half-written line
        // behind, so a poisoned sink is still usable.
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

fn timestamp() -> String {
    Local::now().format("%H:%M:%S%.3f").to_string()
}

/// In-memory transcript sink
///
/// Clones share the same buffer, so one clone can be handed to
/// [`Logger::from_writer`] while another is kept to inspect what was
/// written.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns everything written so far, lossily decoded
    pub fn contents(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }

    /// Returns the written lines
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_owned).collect()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
