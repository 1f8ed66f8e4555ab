//! Record codec for terminator-delimited byte streams.
//!
//! Splits the stream strictly on `\n` and accumulates whole lines in codec
//! state until a line whose chomped form matches the terminator pattern
//! closes the record. Emitted records keep every newline byte; chomping is
//! applied only for the terminator check.
//!
//! End-of-stream between records is a clean end of the sequence;
//! end-of-stream with buffered bytes (an unterminated line, or complete
//! lines that never matched the terminator) is
//! [`AppError::IncompleteRecord`].

use bytes::{Bytes, BytesMut};
use regex::bytes::Regex;
use tokio_util::codec::Decoder;

use crate::{AppError, Result};

/// Maximum record size accepted by the codec: 64 MiB.
///
/// A record growing past this limit indicates a terminator-pattern mismatch
/// between the two ends of the stream; failing early keeps a misconfigured
/// peer from exhausting memory.
pub const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

/// Decoder that frames a byte stream into terminator-delimited records.
///
/// Each stream gets its own codec; the partial record accumulates in the
/// codec's buffer across `decode` calls, so codecs must not be shared
/// between streams.
#[derive(Debug)]
pub struct RecordCodec {
    pattern: Regex,
    record: BytesMut,
    scanned: usize,
}

impl RecordCodec {
    /// Create a codec framing records with the given terminator pattern.
    #[must_use]
    pub fn new(pattern: Regex) -> Self {
        Self {
            pattern,
            record: BytesMut::new(),
            scanned: 0,
        }
    }
}

impl Decoder for RecordCodec {
    type Item = Bytes;
    type Error = AppError;

    /// Frame the next record from `src`, buffering until its terminator line.
    ///
    /// Returns `Ok(None)` while the current record is still incomplete.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            if self.record.len() + src.len() > MAX_RECORD_BYTES {
                return Err(AppError::Protocol(format!(
                    "record exceeds {MAX_RECORD_BYTES} bytes; check the terminator pattern"
                )));
            }

            let Some(offset) = src[self.scanned..].iter().position(|&b| b == b'\n') else {
                // No complete line yet; remember how far we scanned.
                self.scanned = src.len();
                return Ok(None);
            };

            let line = src.split_to(self.scanned + offset + 1);
            self.scanned = 0;
            let terminates = self.pattern.is_match(chomp(&line));
            self.record.extend_from_slice(&line);

            if terminates {
                return Ok(Some(self.record.split().freeze()));
            }
        }
    }

    /// Frame the final record when the stream reaches EOF.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::IncompleteRecord`] when the stream ends with
    /// buffered bytes that never saw a terminator line.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if let Some(record) = self.decode(src)? {
            return Ok(Some(record));
        }
        if src.is_empty() && self.record.is_empty() {
            return Ok(None);
        }
        Err(AppError::IncompleteRecord(format!(
            "stream ended inside a record ({} bytes buffered)",
            self.record.len() + src.len()
        )))
    }
}

/// Strip the trailing `\n`, and a preceding `\r` if present, for the
/// terminator check only.
fn chomp(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
