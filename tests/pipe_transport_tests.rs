// Pipe transport tests - real child processes speaking over stdin/stdout
//
// Uses standard Unix tools as stand-in tool hosts.

#![cfg(unix)]

use amap_navigator::config::PipeServerConfig;
use amap_navigator::tooling::{
    PipeTransport, ProtocolError, ProtocolSession, SessionOptions, Transport,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn pipe(command: &str, args: &[&str]) -> PipeTransport {
    let server = PipeServerConfig::new(command, args.iter().map(|arg| arg.to_string()));
    PipeTransport::new(server, Duration::from_millis(200))
}

#[tokio::test]
async fn frames_round_trip_through_cat() {
    let transport = pipe("cat", &[]);
    transport.connect().await.expect("cat spawns");
    assert_eq!(transport.endpoint(), "cat");

    transport.send(r#"{"jsonrpc":"2.0","method":"a"}"#).await.expect("send");
    transport.send(r#"{"jsonrpc":"2.0","method":"b"}"#).await.expect("send");
    assert_eq!(
        transport.receive().await.expect("first"),
        r#"{"jsonrpc":"2.0","method":"a"}"#
    );
    assert_eq!(
        transport.receive().await.expect("second"),
        r#"{"jsonrpc":"2.0","method":"b"}"#
    );

    transport.close().await;
    transport.close().await;
    assert!(matches!(
        transport.send("{}").await,
        Err(ProtocolError::Closed { .. })
    ));
    assert!(matches!(
        transport.connect().await,
        Err(ProtocolError::Connection { .. })
    ));
}

#[tokio::test]
async fn blank_and_ansi_lines_are_skipped() {
    let script = r#"printf '\n\033[32mstarting server\033[0m\n\n{"jsonrpc":"2.0","id":1,"result":{}}\n'"#;
    let transport = pipe("sh", &["-c", script]);
    transport.connect().await.expect("sh spawns");

    let frame = transport.receive().await.expect("frame");
    assert_eq!(frame, r#"{"jsonrpc":"2.0","id":1,"result":{}}"#);
    assert!(matches!(
        transport.receive().await,
        Err(ProtocolError::Closed { .. })
    ));
    transport.close().await;
}

#[tokio::test]
async fn missing_executable_is_a_connection_error() {
    let transport = pipe("/nonexistent/amap-mcp-server", &[]);
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, ProtocolError::Connection { .. }));
}

#[tokio::test]
async fn stubborn_child_is_killed_after_grace_period() {
    let transport = pipe("sleep", &["30"]);
    transport.connect().await.expect("sleep spawns");

    let started = Instant::now();
    transport.close().await;
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn session_over_cat_sees_its_own_request_rejected() {
    // cat reflects the request, the session answers it as an unsupported
    // server request, and cat reflects that answer back as the response.
    let transport: Arc<dyn Transport> = Arc::new(pipe("cat", &[]));
    let session = ProtocolSession::open(
        transport,
        SessionOptions {
            call_timeout: Duration::from_secs(5),
            ..SessionOptions::default()
        },
    )
    .await
    .expect("session");

    let err = session.call("tools/list", None).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Rpc { code: -32601, .. }));
    session.close().await;
    assert!(session.is_closed());
}
