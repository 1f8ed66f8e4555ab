//! Process-timeout behaviour: a slow child is fatal to the session and to
//! the server.

use viasock::AppError;

use super::test_helpers::{client_session, join_server, options, start_server};

/// A child that sleeps past the process timeout fails the session; the
/// server kills the child, exits with the timeout, and unlinks its socket.
#[tokio::test]
async fn slow_child_times_out_the_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let opts = options("", "", 0, Some(0.25), 30.0);
    let (server, socket) = start_server(
        dir.path(),
        "sh",
        &["-c", r#"while IFS= read -r line; do sleep 1; echo "$line"; done"#],
        opts.clone(),
    )
    .await;

    let result = client_session(&socket, &opts, b"slow\n").await;
    assert!(
        result.is_err(),
        "client must fail when the child times out, got: {result:?}"
    );

    let result = join_server(server).await;
    assert!(
        matches!(result, Err(AppError::Timeout(_))),
        "server must report the timeout, got: {result:?}"
    );
    assert!(!socket.exists(), "socket must be unlinked after the failure");
}

/// With no process timeout configured, a slower child is simply waited for.
#[tokio::test]
async fn unbounded_wait_tolerates_a_slow_child() {
    let dir = tempfile::tempdir().expect("tempdir");
    let opts = options("", "", 0, None, 3.0);
    let (server, socket) = start_server(
        dir.path(),
        "sh",
        &["-c", r#"while IFS= read -r line; do sleep 0.4; echo "$line"; done"#],
        opts.clone(),
    )
    .await;

    let output = client_session(&socket, &opts, b"patience\n")
        .await
        .expect("session must succeed without a process timeout");
    assert_eq!(output, b"patience\n");

    join_server(server).await.expect("server must exit cleanly");
}
