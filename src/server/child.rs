//! Child process supervision.
//!
//! Spawns the resident filter program with piped stdio, places it in its own
//! process group so signals aimed at a departing client never reach it, and
//! pumps its stderr into the server log from a background task. `kill_on_drop`
//! guarantees the child cannot outlive a crashing server.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{AppError, Result};

/// A spawned child plus its stderr pump task.
///
/// Stdin and stdout handles are surrendered to the caller at spawn time: the
/// bridge owns stdin (and moves it into per-record write tasks), and the
/// server owns stdout behind its long-lived record stream.
#[derive(Debug)]
pub struct SupervisedChild {
    child: Child,
    stderr_pump: JoinHandle<()>,
}

/// Spawn `program` with the given arguments and piped stdio.
///
/// # Errors
///
/// Returns [`AppError::Child`] if the OS spawn fails or a stdio handle
/// cannot be captured.
pub fn spawn(program: &str, args: &[String]) -> Result<(SupervisedChild, ChildStdin, ChildStdout)> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .process_group(0)
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Child(format!("failed to spawn '{program}': {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Child("failed to capture child stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Child("failed to capture child stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Child("failed to capture child stderr".into()))?;

    let stderr_pump = spawn_stderr_pump(program.to_owned(), stderr);

    info!(program, pid = child.id(), "child process spawned");

    Ok((SupervisedChild { child, stderr_pump }, stdin, stdout))
}

impl SupervisedChild {
    /// Kill the child immediately. Used on fatal session errors before the
    /// regular shutdown sequence runs.
    pub async fn kill(&mut self) {
        if let Err(err) = self.child.kill().await {
            warn!(%err, "failed to kill child process");
        }
    }

    /// Wait for the child to exit, bounded by `limit`, then join the stderr
    /// pump. The caller must have dropped the child's stdin first so the
    /// child sees EOF.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] when the child does not exit within `limit`
    ///   (the child is killed before returning).
    /// - [`AppError::Child`] when the child exits non-zero or the wait fails.
    pub async fn shutdown(mut self, limit: Option<Duration>) -> Result<()> {
        let waited = match limit {
            None => self.child.wait().await,
            Some(limit) => match tokio::time::timeout(limit, self.child.wait()).await {
                Ok(waited) => waited,
                Err(_elapsed) => {
                    self.kill().await;
                    let _ = self.stderr_pump.await;
                    return Err(AppError::Timeout(format!(
                        "child did not exit within {:.3}s of stdin close",
                        limit.as_secs_f64()
                    )));
                }
            },
        };

        let _ = self.stderr_pump.await;

        let status = waited.map_err(|err| AppError::Child(format!("wait failed: {err}")))?;
        if status.success() {
            Ok(())
        } else {
            Err(AppError::Child(describe_exit(status)))
        }
    }
}

/// Background task copying the child's stderr lines into the server log.
fn spawn_stderr_pump(program: String, stderr: ChildStderr) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    info!(program, line = line.as_str(), "child stderr");
                }
                Ok(None) => break,
                Err(err) => {
                    // A pipe error here means the child tore down its stderr
                    // before closing it; the exit status tells the rest.
                    warn!(program, %err, "child stderr read failed");
                    break;
                }
            }
        }
    })
}

fn describe_exit(status: ExitStatus) -> String {
    status.code().map_or_else(
        || "child terminated by signal".to_owned(),
        |code| format!("child exited with code {code}"),
    )
}
