//! Unit tests for session option validation and fingerprint field rendering.

use std::time::Duration;

use viasock::config::SessionOptions;
use viasock::AppError;

/// Defaults: empty patterns, no prelude, no process timeout, 60 s idle bound.
#[test]
fn defaults_match_the_documented_flags() {
    let options = SessionOptions::default();
    assert_eq!(options.input_terminator, "");
    assert_eq!(options.output_terminator, "");
    assert_eq!(options.prelude_count, 0);
    assert!(options.process_timeout.is_none());
    assert_eq!(options.server_timeout, Duration::from_secs(60));
    assert!(options.log_path.is_none());
}

/// Empty patterns compile (they match every line).
#[test]
fn empty_patterns_validate() {
    SessionOptions::default().validate().expect("must validate");
}

/// An invalid terminator pattern is rejected as a config error naming the
/// pattern.
#[test]
fn invalid_pattern_is_a_config_error() {
    let options = SessionOptions {
        input_terminator: "[unclosed".into(),
        ..SessionOptions::default()
    };

    match options.validate() {
        Err(AppError::Config(msg)) => {
            assert!(msg.contains("[unclosed"), "message must name the pattern, got: {msg}");
        }
        other => panic!("expected Err(AppError::Config), got: {other:?}"),
    }
}

/// Fingerprint fields render `none` for an absent process timeout and plain
/// decimal seconds otherwise.
#[test]
fn timeout_fields_render_for_the_fingerprint() {
    let mut options = SessionOptions::default();
    assert_eq!(options.process_timeout_field(), "none");
    assert_eq!(options.server_timeout_field(), "60");

    options.process_timeout = Some(Duration::from_secs_f64(1.5));
    assert_eq!(options.process_timeout_field(), "1.5");
}

/// The log path renders empty when unset and verbatim when set.
#[test]
fn log_path_field_renders_for_the_fingerprint() {
    let mut options = SessionOptions::default();
    assert_eq!(options.log_path_field(), "");

    options.log_path = Some("/var/log/viasock.log".into());
    assert_eq!(options.log_path_field(), "/var/log/viasock.log");
}
