//! Command fingerprinting and socket path derivation.
//!
//! A fingerprint is a 128-bit digest over the program path, every argument,
//! the modification time of every path-like argument, and all session
//! options. Two invocations share a server exactly when their fingerprints
//! are equal; touching any referenced file changes the digest and therefore
//! retires the running server at its next idle poll.

use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};

use crate::config::SessionOptions;

/// Socket cache directory relative to the invoking working directory.
pub const SOCKET_DIR: &str = ".viasock/sockets";

/// Compute the 128-bit command fingerprint as a lowercase hex string.
///
/// Fields are fed to the digest separated by NUL bytes so that no two
/// distinct field sequences produce the same byte stream. The mtime of the
/// program and of each argument is folded in as a nanosecond decimal string,
/// `0` for paths that cannot be stat'ed.
#[must_use]
pub fn fingerprint(program: &str, args: &[String], options: &SessionOptions) -> String {
    let mut hasher = Sha256::new();

    feed(&mut hasher, program.as_bytes());
    feed(&mut hasher, mtime_field(Path::new(program)).as_bytes());
    for arg in args {
        feed(&mut hasher, arg.as_bytes());
        feed(&mut hasher, mtime_field(Path::new(arg)).as_bytes());
    }
    feed(&mut hasher, options.input_terminator.as_bytes());
    feed(&mut hasher, options.output_terminator.as_bytes());
    feed(&mut hasher, options.prelude_count.to_string().as_bytes());
    feed(&mut hasher, options.process_timeout_field().as_bytes());
    feed(&mut hasher, options.server_timeout_field().as_bytes());
    feed(&mut hasher, options.log_path_field().as_bytes());

    let digest = hasher.finalize();
    hex::encode(&digest[..16])
}

/// The socket cache directory for the current working directory.
#[must_use]
pub fn socket_dir() -> PathBuf {
    PathBuf::from(SOCKET_DIR)
}

/// The socket path for a fingerprint, one file per digest.
#[must_use]
pub fn socket_path(hash: &str) -> PathBuf {
    socket_dir().join(hash)
}

fn feed(hasher: &mut Sha256, field: &[u8]) {
    hasher.update(field);
    hasher.update([0u8]);
}

/// Modification time of `path` in nanoseconds since the epoch, `0` if the
/// path cannot be stat'ed or its mtime predates the epoch.
fn mtime_field(path: &Path) -> String {
    std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|mtime| mtime.duration_since(UNIX_EPOCH).ok())
        .map_or_else(|| "0".to_owned(), |d| d.as_nanos().to_string())
}
