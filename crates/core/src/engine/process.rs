//! Subprocess helpers shared by the command line engines.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::error::EngineError;

/// Maximum number of stderr bytes kept for error reports.
const STDERR_TAIL_BYTES: usize = 4096;

/// Maps a spawn error to `BinaryNotFound` when the program is missing.
pub(crate) fn spawn_error(program: &str, path: &Path, e: std::io::Error) -> EngineError {
    if e.kind() == std::io::ErrorKind::NotFound {
        EngineError::BinaryNotFound {
            program: program.to_string(),
            path: path.to_path_buf(),
        }
    } else {
        EngineError::Io(e)
    }
}

/// Keeps the end of a (possibly long) stderr dump.
pub(crate) fn stderr_tail(stderr: &str) -> Option<String> {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return Some(trimmed.to_string());
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    Some(trimmed[start..].to_string())
}

/// Runs a tool to completion, killing it on cancellation or timeout.
///
/// A non-zero exit status becomes [`EngineError::ConversionFailed`].
pub(crate) async fn run_tool(
    program: &str,
    path: &Path,
    args: Vec<OsString>,
    timeout_secs: u64,
    cancel: &CancellationToken,
) -> Result<(), EngineError> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }

    debug!(program, ?args, "Spawning tool");

    let child = Command::new(path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_error(program, path, e))?;

    // Dropping the wait future drops the child, which kills it.
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        result = timeout(Duration::from_secs(timeout_secs), child.wait_with_output()) => result,
    };

    let output = match result {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(EngineError::Io(e)),
        Err(_) => return Err(EngineError::Timeout { timeout_secs }),
    };

    let stderr = String::from_utf8_lossy(&output.stderr);

    if !output.status.success() {
        return Err(EngineError::conversion_failed(
            format!("{} exited with code: {:?}", program, output.status.code()),
            stderr_tail(&stderr),
        ));
    }

    debug!(
        program,
        stdout_bytes = output.stdout.len(),
        stderr = stderr_tail(&stderr).as_deref().unwrap_or(""),
        "Tool finished"
    );
    Ok(())
}

/// Checks that a tool can be started at all.
pub(crate) async fn check_tool(
    program: &str,
    path: &Path,
    version_arg: &str,
) -> Result<(), EngineError> {
    Command::new(path)
        .arg(version_arg)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|_| ())
        .map_err(|e| spawn_error(program, path, e))
}

/// Confirms the step produced a file and returns its size.
pub(crate) async fn output_size(path: &Path) -> Result<u64, EngineError> {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.len())
        .map_err(|_| EngineError::OutputMissing {
            path: path.to_path_buf(),
        })
}
