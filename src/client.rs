//! Client session: pump records between local stdio and a server socket.
//!
//! The client holds no state across records beyond its two framers. It
//! first copies the configured number of prelude records from the socket to
//! stdout, then forwards one input record at a time and emits exactly one
//! response record per input, in order, until stdin ends.

use std::io::IsTerminal;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::config::SessionOptions;
use crate::record::RecordStream;
use crate::{AppError, Result};

/// Run a client session against the socket using this process's stdio.
///
/// Stdout is flushed after every record when it is a terminal, so an
/// interactive caller sees each response as it lands.
///
/// # Errors
///
/// Connection failures map to [`AppError::SocketAbsent`] /
/// [`AppError::Refused`] so the runner can drive its spawn-and-retry path;
/// everything else propagates from [`pump`].
pub async fn run(socket_path: &Path, options: &SessionOptions) -> Result<()> {
    let stream = connect(socket_path).await?;
    let flush_each_record = std::io::stdout().is_terminal();
    pump(
        stream,
        tokio::io::stdin(),
        tokio::io::stdout(),
        options,
        flush_each_record,
    )
    .await
}

/// Connect to the server socket, mapping the two transport failures the
/// runner distinguishes onto their own error variants.
///
/// # Errors
///
/// - [`AppError::SocketAbsent`] — no file at the socket path.
/// - [`AppError::Refused`] — the file exists but nothing accepted (stale
///   socket left by a crashed server).
/// - [`AppError::Io`] — any other connect failure.
pub async fn connect(socket_path: &Path) -> Result<UnixStream> {
    UnixStream::connect(socket_path)
        .await
        .map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::SocketAbsent(socket_path.display().to_string())
            }
            std::io::ErrorKind::ConnectionRefused => {
                AppError::Refused(socket_path.display().to_string())
            }
            _ => AppError::Io(format!(
                "cannot connect to {}: {err}",
                socket_path.display()
            )),
        })
}

/// Drive one session over an already-connected stream.
///
/// Generic over the local byte streams so tests can substitute buffers for
/// the process's stdio. Records are only ever written whole: a framing error
/// stops the session before any partial bytes reach `output`.
///
/// # Errors
///
/// - [`AppError::Protocol`] — the server closed before the prelude was
///   complete or before a response record arrived.
/// - [`AppError::IncompleteRecord`] — either stream ended mid-record.
/// - [`AppError::Io`] — transport failure (including connection reset).
pub async fn pump<I, O>(
    stream: UnixStream,
    input: I,
    mut output: O,
    options: &SessionOptions,
    flush_each_record: bool,
) -> Result<()>
where
    I: AsyncRead + Unpin,
    O: AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = stream.into_split();
    let mut responses = RecordStream::new(read_half, options.output_pattern()?);

    for received in 0..options.prelude_count {
        match responses.next_record(None).await? {
            Some(record) => {
                output.write_all(&record).await?;
                if flush_each_record {
                    output.flush().await?;
                }
            }
            None => {
                return Err(AppError::Protocol(format!(
                    "server closed after {received} of {} prelude records",
                    options.prelude_count
                )));
            }
        }
    }

    let mut requests = RecordStream::new(input, options.input_pattern()?);
    loop {
        let record = match requests.next_record(None).await? {
            Some(record) => record,
            None => break,
        };

        write_half.write_all(&record).await?;

        let response = responses.next_record(None).await?.ok_or_else(|| {
            AppError::Protocol("connection closed before a response record".into())
        })?;
        output.write_all(&response).await?;
        if flush_each_record {
            output.flush().await?;
        }
    }

    output.flush().await?;
    Ok(())
}
