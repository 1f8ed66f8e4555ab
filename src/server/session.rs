//! Per-connection session handler — the duplex bridge.
//!
//! Replays the prelude, then exchanges records one-for-one between the
//! client socket and the child's pipes. The stdin write for each record runs
//! on its own spawned task, concurrent with the stdout read, because the two
//! pipes have finite OS buffers: a record larger than the stdin pipe blocks
//! the writer until the child drains it, and the child may not drain it
//! until its response (possibly larger than the stdout pipe) has been
//! consumed. Sequencing the two would deadlock; running them concurrently
//! guarantees whichever side fills first is drained by the other.

use std::time::{Duration, Instant};

use bytes::Bytes;
use regex::bytes::Regex;
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::process::{ChildStdin, ChildStdout};
use tracing::debug;

use crate::record::RecordStream;
use crate::{AppError, Result};

/// How long a failed exchange waits for the writer task to surface its own
/// error before cancelling it.
const WRITER_GRACE: Duration = Duration::from_millis(100);

/// Bridge state shared across the sessions of one server.
///
/// The output stream cursor is monotonic for the server's lifetime: records
/// a session leaves unconsumed are exactly the records the next session
/// sees. Stdin is held here between exchanges and moves into the write task
/// during one, so at most one writer ever touches the pipe.
#[derive(Debug)]
pub struct Bridge {
    /// Child stdin, absent only while a write task holds it.
    pub stdin: Option<ChildStdin>,
    /// Long-lived record cursor over the child's stdout.
    pub output: RecordStream<ChildStdout>,
    /// Prelude bytes replayed verbatim to every client.
    pub prelude: Bytes,
    /// Compiled input terminator pattern for framing client records.
    pub input_pattern: Regex,
    /// Per-record bound on the child's response time.
    pub process_timeout: Option<Duration>,
    /// Monotonic time of the last completed record exchange.
    pub last_request: Instant,
}

/// Serve one client connection to completion.
///
/// Returns the number of record exchanges completed. A clean client
/// disconnect between records ends the session normally; every error is
/// fatal to the server (the accept loop kills the child and propagates).
///
/// # Errors
///
/// - [`AppError::IncompleteRecord`] — the client closed mid-record.
/// - [`AppError::Timeout`] — the child's response exceeded the bound.
/// - [`AppError::Protocol`] — the child's stdout ended before responding.
/// - [`AppError::Child`] — the write to the child's stdin failed.
/// - [`AppError::Io`] — transport failure on the socket.
pub async fn run(stream: UnixStream, bridge: &mut Bridge) -> Result<u64> {
    let (read_half, mut write_half) = stream.into_split();

    write_half.write_all(&bridge.prelude).await?;

    let mut input = RecordStream::new(read_half, bridge.input_pattern.clone());
    let mut exchanges = 0u64;

    loop {
        let record = match input.next_record(None).await? {
            Some(record) => record,
            None => break,
        };

        let mut stdin = bridge
            .stdin
            .take()
            .ok_or_else(|| AppError::Child("child stdin handle lost".into()))?;

        // Dispatch the stdin write on its own task; the handle travels with
        // it and comes back once the pipe has accepted the whole record.
        let mut write_task = tokio::spawn(async move {
            stdin.write_all(&record).await?;
            stdin.flush().await?;
            Ok::<ChildStdin, std::io::Error>(stdin)
        });

        // Concurrently pull the child's response, bounded by the process
        // timeout. Buffered bytes survive a timeout, but a timeout is fatal
        // anyway.
        let response = match bridge.output.next_record(bridge.process_timeout).await {
            Ok(response) => {
                // The write was dispatched first, so its failure is
                // surfaced first.
                let joined = (&mut write_task).await.map_err(|err| {
                    AppError::Child(format!("stdin write task failed: {err}"))
                })?;
                match joined {
                    Ok(stdin) => bridge.stdin = Some(stdin),
                    Err(err) => {
                        return Err(AppError::Child(format!(
                            "write to child stdin failed: {err}"
                        )));
                    }
                }
                response
            }
            Err(read_err) => {
                // The child is about to be killed, so the writer may be
                // parked on a pipe nothing will ever drain. Give it a beat
                // to report its own failure, then cancel it.
                if let Ok(Ok(Err(write_err))) =
                    tokio::time::timeout(WRITER_GRACE, &mut write_task).await
                {
                    return Err(AppError::Child(format!(
                        "write to child stdin failed: {write_err}"
                    )));
                }
                write_task.abort();
                return Err(read_err);
            }
        };

        let response = match response {
            Some(response) => response,
            None => {
                return Err(AppError::Protocol(
                    "child closed stdout before responding".into(),
                ));
            }
        };

        write_half.write_all(&response).await?;
        bridge.last_request = Instant::now();
        exchanges += 1;
    }

    debug!(exchanges, "session complete");
    Ok(exchanges)
}
