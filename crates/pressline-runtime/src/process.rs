//! Bounded execution of external commands.

use crate::RuntimeError;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

/// Long operations (database import) get a generous bound; health checks
/// and short tool invocations use [`SHORT_TIMEOUT`].
pub const LONG_TIMEOUT: Duration = Duration::from_secs(30 * 60);
pub const SHORT_TIMEOUT: Duration = Duration::from_secs(120);

/// Run a command to completion with a deadline, killing it on timeout.
/// Captures stdout and stderr.
pub fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<Output, RuntimeError> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    run_with_timeout_raw(cmd, timeout)
}

/// Like [`run_with_timeout`] but with the command's stdio left exactly
/// as the caller configured it. Used when stdout or stderr is already
/// redirected, e.g. a dump written straight into a file.
pub fn run_with_timeout_raw(mut cmd: Command, timeout: Duration) -> Result<Output, RuntimeError> {
    let mut child = cmd.spawn()?;
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait()? {
            Some(_) => return Ok(child.wait_with_output()?),
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RuntimeError::CommandTimeout(timeout.as_secs()));
            }
            None => std::thread::sleep(Duration::from_millis(50)),
        }
    }
}

/// Run a command, mapping a non-zero exit into `CommandFailed` carrying
/// the tool's stderr text verbatim.
pub fn run_checked(cmd: Command, timeout: Duration) -> Result<Output, RuntimeError> {
    let output = run_with_timeout(cmd, timeout)?;
    if output.status.success() {
        Ok(output)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RuntimeError::CommandFailed(stderr.trim().to_owned()))
    }
}
