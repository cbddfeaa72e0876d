// Streamed transport tests - HTTP tool hosts served from a local listener
//
// The hosts are small axum apps; the SSE host answers POSTs on its event
// stream, the streamable host answers in the POST body.

use amap_navigator::config::{AuthScheme, StreamServerConfig};
use amap_navigator::tooling::{
    ProtocolError, ProtocolSession, SessionOptions, StreamMode, StreamedTransport, Transport,
    establish,
};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::channel::mpsc;
use futures::future::join_all;
use futures::{StreamExt, stream};
use serde_json::{Map as JsonMap, Value, json};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

#[derive(Clone, Copy)]
struct Credential {
    header: &'static str,
    value: &'static str,
}

const BEARER: Credential = Credential {
    header: "authorization",
    value: "Bearer sk-amap",
};

const API_KEY: Credential = Credential {
    header: "x-amap-key",
    value: "amap-secret",
};

fn authorized(headers: &HeaderMap, credential: Credential) -> bool {
    headers
        .get(credential.header)
        .and_then(|value| value.to_str().ok())
        == Some(credential.value)
}

/// JSON-RPC reply for a request body, `None` for notifications.
fn answer(body: &Value) -> Option<Value> {
    let id = body.get("id")?.clone();
    let result = match body["method"].as_str().unwrap_or_default() {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": { "name": "amap-http", "version": "1.0.0" }
        }),
        "tools/list" => json!({
            "tools": [{
                "name": "maps_geo",
                "inputSchema": { "properties": { "address": {} }, "required": ["address"] }
            }]
        }),
        "tools/call" => json!({
            "content": [{
                "type": "text",
                "text": "{\"geocodes\":[{\"location\":\"121.473701,31.230416\"}]}"
            }]
        }),
        "echo" => json!({ "n": body["params"]["n"].clone() }),
        other => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32601, "message": format!("unknown method {other}") }
            }));
        }
    };
    Some(json!({ "jsonrpc": "2.0", "id": id, "result": result }))
}

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

fn server(url: String, token: Option<&str>, auth: AuthScheme) -> StreamServerConfig {
    StreamServerConfig {
        url,
        token: token.map(str::to_string),
        auth,
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
    }
}

fn options() -> SessionOptions {
    SessionOptions {
        call_timeout: Duration::from_secs(5),
        ..SessionOptions::default()
    }
}

fn transport(server: StreamServerConfig, mode: StreamMode) -> Arc<dyn Transport> {
    Arc::new(StreamedTransport::new(server, mode, Duration::from_millis(200)).expect("transport"))
}

#[derive(Clone)]
struct StreamableHost {
    credential: Credential,
    echoed_session: Arc<AtomicBool>,
}

async fn streamable(
    State(host): State<StreamableHost>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if !authorized(&headers, host.credential) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    match body["method"].as_str().unwrap_or_default() {
        "initialize" => {
            let reply = answer(&body).expect("initialize reply");
            (StatusCode::OK, [("Mcp-Session-Id", "amap-session")], Json(reply)).into_response()
        }
        "tools/list" => {
            let session = headers
                .get("mcp-session-id")
                .and_then(|value| value.to_str().ok());
            if session == Some("amap-session") {
                host.echoed_session.store(true, Ordering::SeqCst);
            }
            let reply = answer(&body).expect("tools/list reply");
            let events = format!(": keep-alive\n\nevent: ping\ndata: skip\n\nevent: message\ndata: {reply}\n\n");
            ([(header::CONTENT_TYPE, "text/event-stream")], events).into_response()
        }
        _ => match answer(&body) {
            Some(reply) => Json(reply).into_response(),
            None => StatusCode::ACCEPTED.into_response(),
        },
    }
}

async fn streamable_host(credential: Credential) -> (String, StreamableHost) {
    let host = StreamableHost {
        credential,
        echoed_session: Arc::new(AtomicBool::new(false)),
    };
    let app = Router::new()
        .route("/mcp", post(streamable))
        .with_state(host.clone());
    let addr = serve(app).await;
    (format!("http://{addr}/mcp"), host)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn streamable_session_lists_and_calls_tools() {
    let (url, host) = streamable_host(BEARER).await;
    let transport = transport(
        server(url, Some("sk-amap"), AuthScheme::Bearer),
        StreamMode::Streamable,
    );
    let session = establish(transport, options()).await.expect("session");

    assert_eq!(
        session.server_info().await.map(|info| info.name),
        Some("amap-http".to_string())
    );
    assert!(session.tools().expect("catalogue").contains("maps_geo"));
    assert!(
        host.echoed_session.load(Ordering::SeqCst),
        "session id sent back on later requests"
    );

    let mut arguments = JsonMap::new();
    arguments.insert("address".into(), json!("上海"));
    let result = session.call_tool("maps_geo", arguments).await.expect("geocoded");
    assert!(!result.is_error());
    assert!(result.render().contains("121.473701"));
    session.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn api_key_scheme_sends_the_configured_header() {
    let (url, _host) = streamable_host(API_KEY).await;
    let scheme = AuthScheme::ApiKey {
        header: "X-Amap-Key".to_string(),
    };
    let session = establish(
        transport(server(url.clone(), Some("amap-secret"), scheme), StreamMode::Streamable),
        options(),
    )
    .await
    .expect("api key accepted");
    session.close().await;

    // A bearer token is not what this host asks for.
    let err = establish(
        transport(server(url, Some("amap-secret"), AuthScheme::Bearer), StreamMode::Streamable),
        options(),
    )
    .await
    .err()
    .expect("rejected");
    assert!(matches!(err, ProtocolError::Auth { status: 401, .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_credentials_are_an_auth_error() {
    let (url, _host) = streamable_host(BEARER).await;
    let err = establish(
        transport(server(url, None, AuthScheme::Bearer), StreamMode::Streamable),
        options(),
    )
    .await
    .err()
    .expect("rejected");
    assert!(matches!(err, ProtocolError::Auth { status: 401, .. }));
}

#[derive(Clone)]
struct SseHost {
    stream: Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>,
}

async fn event_stream(State(host): State<SseHost>, headers: HeaderMap) -> Response {
    if !authorized(&headers, BEARER) {
        return StatusCode::FORBIDDEN.into_response();
    }
    let (tx, rx) = mpsc::unbounded::<String>();
    *host.stream.lock().expect("lock") = Some(tx);
    let endpoint = stream::iter([Ok::<_, Infallible>(
        Event::default().event("endpoint").data("/messages?session=7"),
    )]);
    let messages = rx.map(|data| Ok(Event::default().event("message").data(data)));
    Sse::new(endpoint.chain(messages)).into_response()
}

async fn post_message(State(host): State<SseHost>, Json(body): Json<Value>) -> StatusCode {
    let Some(reply) = answer(&body) else {
        return StatusCode::ACCEPTED;
    };
    let Some(tx) = host.stream.lock().expect("lock").clone() else {
        return StatusCode::CONFLICT;
    };
    // Later requests are answered sooner, so replies arrive out of order.
    let delay = match body["params"]["n"].as_u64() {
        Some(n) => Duration::from_millis(20 * (5 - n.min(5))),
        None => Duration::ZERO,
    };
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.unbounded_send(reply.to_string());
    });
    StatusCode::ACCEPTED
}

async fn sse_host() -> String {
    let host = SseHost {
        stream: Arc::new(Mutex::new(None)),
    };
    let app = Router::new()
        .route("/sse", get(event_stream))
        .route("/messages", post(post_message))
        .with_state(host);
    let addr = serve(app).await;
    format!("http://{addr}/sse")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sse_endpoint_event_then_correlated_messages() {
    let url = sse_host().await;
    let session = establish(
        transport(server(url, Some("sk-amap"), AuthScheme::Bearer), StreamMode::Sse),
        options(),
    )
    .await
    .expect("sse session");
    assert!(session.tools().expect("catalogue").contains("maps_geo"));

    let calls = (0..5u64).map(|n| {
        let session = &session;
        async move {
            let result = session
                .call("echo", Some(json!({ "n": n })))
                .await
                .expect("echo");
            (n, result)
        }
    });
    for (n, result) in join_all(calls).await {
        assert_eq!(result["n"], json!(n), "call {n} got another caller's reply");
    }
    assert_eq!(session.pending_calls().await, 0);
    session.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sse_stream_refused_with_403_is_an_auth_error() {
    let url = sse_host().await;
    let transport = transport(server(url, None, AuthScheme::Bearer), StreamMode::Sse);
    let err = transport.connect().await.unwrap_err();
    assert!(matches!(err, ProtocolError::Auth { status: 403, .. }));
    transport.close().await;
}

/// Accepts connections and reads requests but never writes a byte back.
async fn mute_host() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buffer = [0u8; 4096];
            let _ = socket.read(&mut buffer).await;
            held.push(socket);
        }
    });
    format!("http://{addr}/mcp")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn call_deadline_covers_a_stalled_post() {
    let url = mute_host().await;
    let mut config = server(url, None, AuthScheme::Bearer);
    config.request_timeout = Duration::from_secs(30);
    let session = ProtocolSession::open(transport(config, StreamMode::Streamable), options())
        .await
        .expect("session");

    let started = Instant::now();
    let outcome = session
        .call_with_timeout("tools/list", None, Duration::from_millis(300))
        .await;
    assert!(
        matches!(outcome, Err(ProtocolError::Timeout { .. })),
        "got {outcome:?}"
    );
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(session.pending_calls().await, 0);
    session.close().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stalled_post_is_bounded_by_the_request_timeout() {
    let url = mute_host().await;
    let mut config = server(url, None, AuthScheme::Bearer);
    config.request_timeout = Duration::from_millis(200);
    let transport = transport(config, StreamMode::Streamable);
    transport.connect().await.expect("streamable connect is local");

    let started = Instant::now();
    let err = transport.send(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).await.unwrap_err();
    assert!(matches!(err, ProtocolError::Io { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
    transport.close().await;
}
