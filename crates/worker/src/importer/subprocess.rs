//! Subprocess execution for the import and maintenance commands.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use super::ImportError;

/// Maximum stdout or stderr size captured per stream (1 MiB).
///
/// Imports of large dumps print a progress line per page; everything past
/// this limit is dropped.
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Captured output of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code (`-1` if killed by signal).
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Spawn `argv` (no shell), capture stdout/stderr and enforce `timeout`.
///
/// A non-zero exit is [`ImportError::ExecutionFailed`] carrying stderr.
pub async fn run_command(argv: &[String], timeout: Duration) -> Result<CommandOutput, ImportError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ImportError::ExecutionFailed {
            exit_code: -1,
            stderr: "empty command".to_string(),
        });
    };

    let mut cmd = Command::new(program);
    // `kill_on_drop(true)` kills the child when it is dropped on timeout.
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout_handle = child.stdout.take();
    let stderr_handle = child.stderr.take();
    let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
    let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => {
            let stdout_bytes = stdout_task.await.unwrap_or_default();
            let stderr_bytes = stderr_task.await.unwrap_or_default();
            let output = CommandOutput {
                stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
                stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                exit_code: status.code().unwrap_or(-1),
                duration_ms: start.elapsed().as_millis() as u64,
            };
            if status.success() {
                Ok(output)
            } else {
                Err(ImportError::ExecutionFailed {
                    exit_code: output.exit_code,
                    stderr: output.stderr.trim().to_string(),
                })
            }
        }
        Ok(Err(e)) => Err(ImportError::Io(e)),
        Err(_elapsed) => Err(ImportError::Timeout {
            elapsed_ms: start.elapsed().as_millis() as u64,
        }),
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
