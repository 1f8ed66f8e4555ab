//! Pull-style record source over any async byte reader.

use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use regex::bytes::Regex;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::record::RecordCodec;
use crate::{AppError, Result};

/// Lazy sequence of records drawn from an async byte stream.
///
/// Owns its [`FramedRead`] and therefore its read buffer, so the stream can
/// live as long as the underlying reader and be consumed across many call
/// sites — the server holds one of these over the child's stdout for its
/// whole lifetime. A timed-out read leaves all buffered bytes in place; the
/// next call resumes exactly where the stream stood.
#[derive(Debug)]
pub struct RecordStream<R> {
    inner: FramedRead<R, RecordCodec>,
}

impl<R> RecordStream<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap `reader` with a fresh codec for the given terminator pattern.
    #[must_use]
    pub fn new(reader: R, pattern: Regex) -> Self {
        Self {
            inner: FramedRead::new(reader, RecordCodec::new(pattern)),
        }
    }

    /// Pull the next record, waiting at most `limit` when one is given.
    ///
    /// Returns `Ok(None)` on a clean end of stream between records.
    ///
    /// # Errors
    ///
    /// - [`AppError::Timeout`] when `limit` elapses before a record completes.
    /// - [`AppError::IncompleteRecord`] when the stream ends mid-record.
    /// - [`AppError::Io`] on underlying read failures.
    pub async fn next_record(&mut self, limit: Option<Duration>) -> Result<Option<Bytes>> {
        match limit {
            None => self.inner.next().await.transpose(),
            Some(limit) => match tokio::time::timeout(limit, self.inner.next()).await {
                Ok(item) => item.transpose(),
                Err(_elapsed) => Err(AppError::Timeout(format!(
                    "no complete record within {:.3}s",
                    limit.as_secs_f64()
                ))),
            },
        }
    }
}
