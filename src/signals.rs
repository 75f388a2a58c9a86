//! Cooperative stop requests, selected per target platform at build time.

use std::io;
use tokio::process::Child;

/// Asks a child process to stop on its own
///
/// On Unix this delivers SIGINT, which servers treat like Ctrl+C.
#[cfg(unix)]
pub(crate) fn request_graceful_stop(child: &mut Child) -> io::Result<()> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    // No pid means the child has already been reaped
    let Some(pid) = child.id() else {
        return Ok(());
    };
    let pid = i32::try_from(pid).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    kill(Pid::from_raw(pid), Signal::SIGINT)?;
    Ok(())
}

/// Asks a child process to stop
///
/// Windows has no interrupt signal that can be aimed at a single child, so
/// this issues a terminate request instead.
#[cfg(windows)]
pub(crate) fn request_graceful_stop(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}
