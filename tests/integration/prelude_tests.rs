//! Prelude capture and replay across sessions.

use std::time::Duration;

use viasock::fingerprint::fingerprint;
use viasock::server::{self, ServerConfig};
use viasock::AppError;

use super::test_helpers::{client_session, join_server, options, start_server};

/// Every session sees the same prelude before its own responses, while the
/// echo records keep flowing from the shared output cursor.
#[tokio::test]
async fn prelude_is_replayed_to_each_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let opts = options("", "", 2, None, 0.4);
    let (server, socket) = start_server(
        dir.path(),
        "sh",
        &["-c", "echo HDR1; echo HDR2; exec cat"],
        opts.clone(),
    )
    .await;

    for payload in [&b"ping\n"[..], &b"pong\n"[..]] {
        let output = client_session(&socket, &opts, payload)
            .await
            .expect("session must succeed");

        let mut expected = b"HDR1\nHDR2\n".to_vec();
        expected.extend_from_slice(payload);
        assert_eq!(output, expected);
    }

    join_server(server).await.expect("server must exit cleanly");
}

/// With a prelude of zero the client emits no bytes before its first
/// response.
#[tokio::test]
async fn zero_prelude_emits_nothing_up_front() {
    let dir = tempfile::tempdir().expect("tempdir");
    let opts = options("", "", 0, None, 0.4);
    let (server, socket) = start_server(dir.path(), "cat", &[], opts.clone()).await;

    let output = client_session(&socket, &opts, b"")
        .await
        .expect("session must succeed");
    assert_eq!(output, b"", "no prelude and no input means no output");

    join_server(server).await.expect("server must exit cleanly");
}

/// A child that exits before producing the configured prelude is fatal at
/// startup, and the socket does not survive the failure.
#[tokio::test]
async fn missing_prelude_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let opts = options("", "", 1, None, 5.0);
    let program = "true".to_owned();
    let hash = fingerprint(&program, &[], &opts);
    let socket = dir.path().join(&hash);

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        server::run(ServerConfig {
            socket_path: socket.clone(),
            expected_hash: hash,
            program,
            args: Vec::new(),
            options: opts,
        }),
    )
    .await
    .expect("server must fail promptly");

    assert!(
        matches!(result, Err(AppError::Protocol(_))),
        "expected Protocol error for a missing prelude, got: {result:?}"
    );
    assert!(!socket.exists(), "socket must be unlinked after the failure");
}
