//! Server daemon: one child process behind one Unix-domain socket.
//!
//! Serves one client at a time. The accept loop polls with a short timeout
//! so the idle check and the fingerprint invalidation check stay responsive,
//! and a SIGTERM / ctrl-c also retires the server. Whatever path the server
//! leaves by, the shutdown sequence closes the child's stdin, waits for exit
//! bounded by the process timeout, and unlinks the socket.

pub mod child;
pub mod session;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tokio::net::UnixListener;
use tokio::process::{ChildStdin, ChildStdout};
use tracing::{debug, info, warn};

use crate::config::SessionOptions;
use crate::fingerprint::fingerprint;
use crate::record::RecordStream;
use crate::server::session::Bridge;
use crate::{AppError, Result};

/// How long one accept poll waits before re-checking idle and invalidation.
const ACCEPT_POLL: Duration = Duration::from_secs(1);

/// Everything a server instance needs: identity, command, and options.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket path this server binds; unlinked again on exit.
    pub socket_path: PathBuf,
    /// Fingerprint the server was spawned for; a live recompute that
    /// diverges from it retires the server.
    pub expected_hash: String,
    /// Child program.
    pub program: String,
    /// Child arguments.
    pub args: Vec<String>,
    /// Framing options and timeouts.
    pub options: SessionOptions,
}

/// Run a server to completion: bind, spawn the child, capture the prelude,
/// serve sessions, and tear everything down.
///
/// # Errors
///
/// Returns the first fatal error: bind conflict, child spawn or exit
/// failure, prelude failure, or any fatal session error. The socket is
/// unlinked on every path.
pub async fn run(config: ServerConfig) -> Result<()> {
    config.options.validate()?;

    let listener = bind(&config.socket_path)?;
    info!(
        socket = %config.socket_path.display(),
        hash = config.expected_hash.as_str(),
        program = config.program.as_str(),
        "server listening"
    );

    let outcome = serve(&config, &listener).await;

    unlink_socket(&config.socket_path);
    match &outcome {
        Ok(()) => info!("server exited cleanly"),
        Err(err) => warn!(%err, "server exited with failure"),
    }
    outcome
}

/// Bind the listening socket. An existing file at the path is fatal; stale
/// sockets are cleaned up by the runner, not here, so a bind conflict means
/// another live server (or a crash the runner has not yet noticed).
fn bind(socket_path: &Path) -> Result<UnixListener> {
    let listener = UnixListener::bind(socket_path).map_err(|err| {
        if err.kind() == std::io::ErrorKind::AddrInUse {
            AppError::Bind(format!(
                "socket {} already in use",
                socket_path.display()
            ))
        } else {
            AppError::Bind(format!(
                "cannot bind {}: {err}",
                socket_path.display()
            ))
        }
    })?;

    // Client authentication is filesystem permissions on the socket path.
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) =
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
        {
            warn!(%err, "failed to tighten socket permissions");
        }
    }

    Ok(listener)
}

async fn serve(config: &ServerConfig, listener: &UnixListener) -> Result<()> {
    let (mut child, stdin, stdout) = child::spawn(&config.program, &config.args)?;

    // `drive` owns the child's stdin inside the bridge; when it returns the
    // bridge is dropped and the child sees EOF, which is the shutdown cue.
    let outcome = drive(config, listener, stdin, stdout).await;

    if outcome.is_err() {
        child.kill().await;
    }

    let shutdown = child.shutdown(config.options.process_timeout).await;
    match outcome {
        Err(err) => {
            if let Err(shutdown_err) = shutdown {
                warn!(%shutdown_err, "child teardown after session failure");
            }
            Err(err)
        }
        Ok(()) => shutdown,
    }
}

async fn drive(
    config: &ServerConfig,
    listener: &UnixListener,
    stdin: ChildStdin,
    stdout: ChildStdout,
) -> Result<()> {
    let mut output = RecordStream::new(stdout, config.options.output_pattern()?);

    let prelude = capture_prelude(
        &mut output,
        config.options.prelude_count,
        config.options.process_timeout,
    )
    .await?;

    let mut bridge = Bridge {
        stdin: Some(stdin),
        output,
        prelude,
        input_pattern: config.options.input_pattern()?,
        process_timeout: config.options.process_timeout,
        last_request: Instant::now(),
    };

    accept_loop(config, listener, &mut bridge).await
}

/// Drain the first `count` output records from the child before any client
/// arrives. An incomplete or missing prelude is fatal.
async fn capture_prelude(
    output: &mut RecordStream<ChildStdout>,
    count: usize,
    limit: Option<Duration>,
) -> Result<Bytes> {
    let mut prelude = BytesMut::new();
    for drained in 0..count {
        match output.next_record(limit).await? {
            Some(record) => prelude.extend_from_slice(&record),
            None => {
                return Err(AppError::Protocol(format!(
                    "child closed stdout after {drained} of {count} prelude records"
                )));
            }
        }
    }
    if count > 0 {
        debug!(records = count, bytes = prelude.len(), "prelude captured");
    }
    Ok(prelude.freeze())
}

async fn accept_loop(
    config: &ServerConfig,
    listener: &UnixListener,
    bridge: &mut Bridge,
) -> Result<()> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut connection_count: u64 = 0;

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                return Ok(());
            }

            accepted = tokio::time::timeout(ACCEPT_POLL, listener.accept()) => {
                match accepted {
                    Err(_elapsed) => {
                        if bridge.last_request.elapsed() > config.options.server_timeout {
                            info!(
                                idle_secs = bridge.last_request.elapsed().as_secs(),
                                "idle timeout reached"
                            );
                            return Ok(());
                        }
                        // O(args) file stats per poll; cheap at this cadence.
                        let live = fingerprint(&config.program, &config.args, &config.options);
                        if live != config.expected_hash {
                            info!("command fingerprint changed; retiring server");
                            return Ok(());
                        }
                    }
                    Ok(Ok((stream, _addr))) => {
                        connection_count += 1;
                        debug!(connection_count, "client connected");
                        session::run(stream, bridge).await?;
                    }
                    Ok(Err(err)) => {
                        warn!(%err, "accept failed");
                    }
                }
            }
        }
    }
}

fn unlink_socket(socket_path: &Path) {
    if let Err(err) = std::fs::remove_file(socket_path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            warn!(%err, socket = %socket_path.display(), "failed to unlink socket");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        Err(err) => {
            warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
            let _ = ctrl_c.await;
        }
    }
}
