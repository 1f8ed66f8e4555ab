//! Runner: the end-user entry point that finds or starts the right server.
//!
//! Computes the command fingerprint, tries a client session against the
//! derived socket, and on the two transport failures — socket absent, or
//! connection refused by a stale file — spawns a detached server and retries
//! exactly once. Two runners racing to spawn a server for the same
//! fingerprint is tolerated: the loser's bind fails and the retry here finds
//! the winner.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::SessionOptions;
use crate::fingerprint::{fingerprint, socket_dir, socket_path};
use crate::{client, AppError, Result};

/// Grace period between spawning a detached server and the retry, covering
/// bind and prelude capture.
const SPAWN_GRACE: Duration = Duration::from_secs(1);

/// Run the full runner sequence for one command invocation.
///
/// # Errors
///
/// Transport failures are consumed by the spawn-and-retry path; the retry's
/// failure, and every non-transport error, propagate unchanged.
pub async fn run(program: &str, args: &[String], options: &SessionOptions) -> Result<()> {
    options.validate()?;

    std::fs::create_dir_all(socket_dir()).map_err(|err| {
        AppError::Io(format!(
            "cannot create socket cache directory {}: {err}",
            socket_dir().display()
        ))
    })?;

    let hash = fingerprint(program, args, options);
    let socket = socket_path(&hash);
    debug!(hash = hash.as_str(), socket = %socket.display(), "resolved socket");

    match client::run(&socket, options).await {
        Ok(()) => Ok(()),
        Err(AppError::SocketAbsent(_)) => {
            debug!("no server socket; spawning server");
            spawn_and_retry(&socket, &hash, program, args, options).await
        }
        Err(AppError::Refused(_)) => {
            // A socket nothing accepts on is the residue of a crashed
            // server; remove it so the fresh server can bind.
            clear_stale_socket(&socket)?;
            spawn_and_retry(&socket, &hash, program, args, options).await
        }
        Err(err) => Err(err),
    }
}

/// Remove a stale socket file, tolerating a concurrent removal.
///
/// # Errors
///
/// Returns [`AppError::Io`] if the file exists but cannot be removed.
pub fn clear_stale_socket(socket: &Path) -> Result<()> {
    match std::fs::remove_file(socket) {
        Ok(()) => {
            info!(socket = %socket.display(), "removed stale socket");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(AppError::Io(format!(
            "cannot remove stale socket {}: {err}",
            socket.display()
        ))),
    }
}

async fn spawn_and_retry(
    socket: &Path,
    hash: &str,
    program: &str,
    args: &[String],
    options: &SessionOptions,
) -> Result<()> {
    spawn_detached_server(socket, hash, program, args, options)?;
    tokio::time::sleep(SPAWN_GRACE).await;
    client::run(socket, options).await
}

/// Spawn `viasock server` detached: null stdio and its own process group,
/// so it survives this runner and never sees its signals.
fn spawn_detached_server(
    socket: &Path,
    hash: &str,
    program: &str,
    args: &[String],
    options: &SessionOptions,
) -> Result<()> {
    let exe = std::env::current_exe()
        .map_err(|err| AppError::Child(format!("cannot locate own executable: {err}")))?;

    let mut cmd = std::process::Command::new(exe);
    cmd.arg("server")
        .arg("-t")
        .arg(&options.input_terminator)
        .arg("-T")
        .arg(&options.output_terminator)
        .arg("-P")
        .arg(options.prelude_count.to_string());
    if let Some(limit) = options.process_timeout {
        cmd.arg("-w").arg(limit.as_secs_f64().to_string());
    }
    cmd.arg("-W").arg(options.server_timeout.as_secs_f64().to_string());
    if let Some(ref log) = options.log_path {
        cmd.arg("-l").arg(log);
    }
    cmd.arg("--").arg(socket).arg(hash).arg(program).args(args);

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    cmd.spawn()
        .map_err(|err| AppError::Child(format!("failed to spawn server process: {err}")))?;

    info!(socket = %socket.display(), "server spawned");
    Ok(())
}
