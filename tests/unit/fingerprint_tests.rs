//! Unit tests for command fingerprinting and socket path derivation.

use std::time::{Duration, SystemTime};

use viasock::config::SessionOptions;
use viasock::fingerprint::{fingerprint, socket_path};

fn options() -> SessionOptions {
    SessionOptions::default()
}

fn args(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| (*s).to_owned()).collect()
}

/// Digest is 128 bits rendered as 32 lowercase hex characters.
#[test]
fn digest_is_32_lowercase_hex_chars() {
    let hash = fingerprint("cat", &[], &options());
    assert_eq!(hash.len(), 32);
    assert!(hash
        .chars()
        .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c)));
}

/// The same inputs always produce the same digest.
#[test]
fn digest_is_deterministic() {
    let first = fingerprint("cat", &args(&["-n"]), &options());
    let second = fingerprint("cat", &args(&["-n"]), &options());
    assert_eq!(first, second);
}

/// Program, arguments, and argument order all separate fingerprints.
#[test]
fn command_changes_separate_fingerprints() {
    let base = fingerprint("cat", &args(&["a", "b"]), &options());

    assert_ne!(base, fingerprint("tac", &args(&["a", "b"]), &options()));
    assert_ne!(base, fingerprint("cat", &args(&["a"]), &options()));
    assert_ne!(base, fingerprint("cat", &args(&["b", "a"]), &options()));
}

/// Every session option participates in the digest.
#[test]
fn option_changes_separate_fingerprints() {
    let base = fingerprint("cat", &[], &options());

    let mut changed = options();
    changed.input_terminator = "^EOS$".into();
    assert_ne!(base, fingerprint("cat", &[], &changed));

    let mut changed = options();
    changed.output_terminator = "^$".into();
    assert_ne!(base, fingerprint("cat", &[], &changed));

    let mut changed = options();
    changed.prelude_count = 2;
    assert_ne!(base, fingerprint("cat", &[], &changed));

    let mut changed = options();
    changed.process_timeout = Some(Duration::from_secs(1));
    assert_ne!(base, fingerprint("cat", &[], &changed));

    let mut changed = options();
    changed.server_timeout = Duration::from_secs(30);
    assert_ne!(base, fingerprint("cat", &[], &changed));

    let mut changed = options();
    changed.log_path = Some("/tmp/viasock.log".into());
    assert_ne!(base, fingerprint("cat", &[], &changed));
}

/// Field boundaries are unambiguous: shifting bytes between adjacent fields
/// must not collide.
#[test]
fn adjacent_fields_do_not_collide() {
    let first = fingerprint("ca", &args(&["t"]), &options());
    let second = fingerprint("cat", &args(&[""]), &options());
    assert_ne!(first, second);
}

/// Touching a path-like argument's mtime changes the fingerprint, which is
/// what retires a server whose inputs changed.
#[test]
fn argument_mtime_change_separates_fingerprints() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("model.bin");
    std::fs::write(&file_path, b"weights").expect("write");

    let file = std::fs::File::options()
        .write(true)
        .open(&file_path)
        .expect("open");
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000))
        .expect("set mtime");
    drop(file);

    let arg = file_path.display().to_string();
    let before = fingerprint("cat", &args(&[&arg]), &options());

    let file = std::fs::File::options()
        .write(true)
        .open(&file_path)
        .expect("open");
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(2_000_000))
        .expect("set mtime");
    drop(file);

    let after = fingerprint("cat", &args(&[&arg]), &options());
    assert_ne!(before, after);
}

/// Arguments that are not paths hash with a zero mtime and never error.
#[test]
fn non_path_arguments_are_accepted() {
    let hash = fingerprint("cat", &args(&["--not-a-path-anywhere"]), &options());
    assert_eq!(hash.len(), 32);
}

/// The socket path is the digest inside the cache directory.
#[test]
fn socket_path_is_digest_in_cache_dir() {
    let hash = fingerprint("cat", &[], &options());
    let path = socket_path(&hash);
    assert_eq!(path, std::path::Path::new(".viasock/sockets").join(&hash));
}
