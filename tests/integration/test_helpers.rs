//! Shared helpers for end-to-end tests: in-process servers over temp-dir
//! sockets and buffer-backed client sessions, so individual test modules can
//! focus on behaviour rather than plumbing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::task::JoinHandle;

use viasock::config::SessionOptions;
use viasock::fingerprint::fingerprint;
use viasock::server::{self, ServerConfig};
use viasock::{client, Result};

/// Build session options from plain values.
pub fn options(
    input: &str,
    output: &str,
    prelude: usize,
    process_timeout: Option<f64>,
    server_timeout: f64,
) -> SessionOptions {
    SessionOptions {
        input_terminator: input.into(),
        output_terminator: output.into(),
        prelude_count: prelude,
        process_timeout: process_timeout.map(Duration::from_secs_f64),
        server_timeout: Duration::from_secs_f64(server_timeout),
        log_path: None,
    }
}

/// Default framing with the given idle bound — the common case.
pub fn echo_options(server_timeout: f64) -> SessionOptions {
    options("", "", 0, None, server_timeout)
}

/// A `sh` one-liner that prefixes each line with its running count, used to
/// prove that sessions share a single child.
pub const NUMBERING_SCRIPT: &str =
    r#"n=0; while IFS= read -r line; do n=$((n+1)); printf '%s: %s\n' "$n" "$line"; done"#;

/// Start an in-process server for `program args` on a socket under `dir`.
///
/// Returns the running server task and the socket path, once the socket file
/// exists so clients can connect immediately.
pub async fn start_server(
    dir: &Path,
    program: &str,
    args: &[&str],
    options: SessionOptions,
) -> (JoinHandle<Result<()>>, PathBuf) {
    let args: Vec<String> = args.iter().map(|s| (*s).to_owned()).collect();
    let hash = fingerprint(program, &args, &options);
    let socket = dir.join(&hash);

    let config = ServerConfig {
        socket_path: socket.clone(),
        expected_hash: hash,
        program: program.to_owned(),
        args,
        options,
    };

    let handle = tokio::spawn(server::run(config));
    wait_for_socket(&socket).await;
    (handle, socket)
}

/// Poll for the socket file to appear; the server binds it before spawning
/// the child, so this bounds only task startup.
pub async fn wait_for_socket(socket: &Path) {
    for _ in 0..250 {
        if socket.exists() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("socket {} did not appear", socket.display());
}

/// Run one client session feeding `input` bytes and collecting all output.
pub async fn client_session(
    socket: &Path,
    options: &SessionOptions,
    input: &[u8],
) -> Result<Vec<u8>> {
    let stream = client::connect(socket).await?;
    let mut output = Vec::new();
    client::pump(stream, input, &mut output, options, false).await?;
    Ok(output)
}

/// Await the server's own exit (idle timeout, invalidation, or failure) and
/// return its outcome. Panics if the server is still running after ten
/// seconds — every test uses a short idle bound.
pub async fn join_server(handle: JoinHandle<Result<()>>) -> Result<()> {
    tokio::time::timeout(Duration::from_secs(10), handle)
        .await
        .expect("server must exit within ten seconds")
        .expect("server task must not panic")
}
