//! Record framing over byte streams.
//!
//! A *record* is a non-empty byte sequence of one or more `\n`-terminated
//! lines whose last line, with the trailing newline (and a preceding `\r`)
//! removed, matches a user-supplied terminator pattern. The empty pattern
//! matches every line, so it frames one record per line.
//!
//! [`codec::RecordCodec`] does the byte-level framing as a
//! [`tokio_util::codec::Decoder`]; [`stream::RecordStream`] is the pull-style
//! record source the rest of the crate consumes, with an optional per-read
//! timeout.

pub mod codec;
pub mod stream;

pub use codec::RecordCodec;
pub use stream::RecordStream;
