//! HTTP transports: the server-sent-events flavour (GET stream for inbound,
//! POST for outbound) and the streamable flavour (every POST answers with a
//! JSON or SSE body).

use super::Transport;
use crate::application::tooling::error::ProtocolError;
use crate::config::{AuthScheme, StreamServerConfig};
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use reqwest_eventsource::{Event, EventSource, retry::Never};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

const EVENT_STREAM_MIME: &str = "text/event-stream";
const JSON_MIME: &str = "application/json";
const SESSION_HEADER: &str = "Mcp-Session-Id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Sse,
    Streamable,
}

type Inbound = Result<String, ProtocolError>;

pub struct StreamedTransport {
    server: StreamServerConfig,
    mode: StreamMode,
    grace: Duration,
    base_url: Url,
    client: Client,
    post_url: AsyncMutex<Option<Url>>,
    session_id: AsyncMutex<Option<String>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: AsyncMutex<mpsc::UnboundedReceiver<Inbound>>,
    stream_task: AsyncMutex<Option<JoinHandle<()>>>,
    body_tasks: AsyncMutex<JoinSet<()>>,
    closed: watch::Sender<bool>,
}

impl StreamedTransport {
    pub fn new(
        server: StreamServerConfig,
        mode: StreamMode,
        grace: Duration,
    ) -> Result<Self, ProtocolError> {
        let base_url = Url::parse(&server.url)
            .map_err(|err| ProtocolError::connection(&server.url, format!("invalid URL: {err}")))?;
        let client = Client::builder()
            .connect_timeout(server.connect_timeout)
            .build()
            .map_err(|err| ProtocolError::connection(&server.url, err))?;
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        Ok(Self {
            server,
            mode,
            grace,
            base_url,
            client,
            post_url: AsyncMutex::new(None),
            session_id: AsyncMutex::new(None),
            inbound_tx,
            inbound_rx: AsyncMutex::new(inbound_rx),
            stream_task: AsyncMutex::new(None),
            body_tasks: AsyncMutex::new(JoinSet::new()),
            closed,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        authorize(builder, &self.server)
    }

    async fn open_event_stream(&self) -> Result<Url, ProtocolError> {
        let request = self
            .authorize(self.client.get(self.base_url.clone()))
            .header(ACCEPT, EVENT_STREAM_MIME);
        let mut source = EventSource::new(request)
            .map_err(|err| ProtocolError::connection(&self.server.url, err))?;
        source.set_retry_policy(Box::new(Never));

        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let pump = EventPump {
            label: self.server.url.clone(),
            base_url: self.base_url.clone(),
            inbound: self.inbound_tx.clone(),
            endpoint: Some(endpoint_tx),
        };
        *self.stream_task.lock().await = Some(tokio::spawn(pump.run(source)));

        match tokio::time::timeout(self.server.connect_timeout, endpoint_rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ProtocolError::connection(
                &self.server.url,
                "event stream ended before announcing an endpoint",
            )),
            Err(_) => Err(ProtocolError::connection(
                &self.server.url,
                format!(
                    "no endpoint event within {}ms",
                    self.server.connect_timeout.as_millis()
                ),
            )),
        }
    }

    async fn abort_stream(&self) {
        if let Some(task) = self.stream_task.lock().await.take() {
            task.abort();
        }
        self.body_tasks.lock().await.abort_all();
    }

    fn push_inbound(&self, frame: String) {
        if self.inbound_tx.send(Ok(frame)).is_err() {
            debug!(endpoint = %self.server.url, "inbound queue dropped a frame");
        }
    }
}

#[async_trait]
impl Transport for StreamedTransport {
    fn endpoint(&self) -> &str {
        &self.server.url
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        if *self.closed.borrow() {
            return Err(ProtocolError::connection(
                &self.server.url,
                "transport was closed; open a new one",
            ));
        }
        if self.post_url.lock().await.is_some() {
            return Ok(());
        }
        let post_url = match self.mode {
            StreamMode::Streamable => self.base_url.clone(),
            StreamMode::Sse => match self.open_event_stream().await {
                Ok(url) => url,
                Err(err) => {
                    self.abort_stream().await;
                    return Err(err);
                }
            },
        };
        info!(
            endpoint = %self.server.url,
            post_url = %post_url,
            mode = ?self.mode,
            "connected to streamed tool host"
        );
        *self.post_url.lock().await = Some(post_url);
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), ProtocolError> {
        let url = self
            .post_url
            .lock()
            .await
            .clone()
            .ok_or_else(|| ProtocolError::closed(&self.server.url))?;

        let mut request = self
            .authorize(self.client.post(url))
            .timeout(self.server.request_timeout)
            .header(CONTENT_TYPE, JSON_MIME)
            .header(ACCEPT, format!("{JSON_MIME}, {EVENT_STREAM_MIME}"))
            .body(frame.to_string());
        if let Some(session) = self.session_id.lock().await.as_deref() {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_connect() {
                ProtocolError::connection(&self.server.url, err)
            } else if err.is_timeout() {
                ProtocolError::io(
                    &self.server.url,
                    format!(
                        "no response within {}ms",
                        self.server.request_timeout.as_millis()
                    ),
                )
            } else {
                ProtocolError::io(&self.server.url, err)
            }
        })?;

        let status = response.status();
        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(ProtocolError::Auth {
                endpoint: self.server.url.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ProtocolError::io(
                &self.server.url,
                format!("POST answered with HTTP {status}"),
            ));
        }
        if self.mode == StreamMode::Sse {
            return Ok(());
        }

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
        {
            let mut current = self.session_id.lock().await;
            if current.as_deref() != Some(session) {
                debug!(endpoint = %self.server.url, session, "tool host assigned a session id");
                *current = Some(session.to_string());
            }
        }
        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with(EVENT_STREAM_MIME))
            .unwrap_or(false);

        if is_event_stream {
            let pump = BodyPump {
                label: self.server.url.clone(),
                inbound: self.inbound_tx.clone(),
            };
            let mut tasks = self.body_tasks.lock().await;
            while tasks.try_join_next().is_some() {}
            tasks.spawn(pump.run(response));
            return Ok(());
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| ProtocolError::io(&self.server.url, err))?;
        let body = String::from_utf8_lossy(&body);
        if !body.trim().is_empty() {
            self.push_inbound(body.trim().to_string());
        }
        Ok(())
    }

    async fn receive(&self) -> Result<String, ProtocolError> {
        let mut closed = self.closed.subscribe();
        let mut inbound = self.inbound_rx.lock().await;
        tokio::select! {
            frame = inbound.recv() => match frame {
                Some(outcome) => outcome,
                None => Err(ProtocolError::closed(&self.server.url)),
            },
            _ = closed.wait_for(|closed| *closed) => Err(ProtocolError::closed(&self.server.url)),
        }
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        self.abort_stream().await;
        let post_url = self.post_url.lock().await.take();
        let session = self.session_id.lock().await.take();
        if let (Some(url), Some(session)) = (post_url, session) {
            let request = self
                .authorize(self.client.delete(url))
                .header(SESSION_HEADER, session)
                .send();
            match tokio::time::timeout(self.grace, request).await {
                Ok(Ok(response)) => {
                    debug!(endpoint = %self.server.url, status = %response.status(), "session deleted");
                }
                Ok(Err(err)) => debug!(endpoint = %self.server.url, %err, "session delete failed"),
                Err(_) => debug!(endpoint = %self.server.url, "session delete timed out"),
            }
        }
        info!(endpoint = %self.server.url, "streamed transport closed");
    }
}

struct EventPump {
    label: String,
    base_url: Url,
    inbound: mpsc::UnboundedSender<Inbound>,
    endpoint: Option<oneshot::Sender<Result<Url, ProtocolError>>>,
}

impl EventPump {
    async fn run(mut self, mut source: EventSource) {
        while let Some(event) = source.next().await {
            match event {
                Ok(Event::Open) => debug!(endpoint = %self.label, "event stream opened"),
                Ok(Event::Message(message)) if message.event == "endpoint" => {
                    self.announce(resolve_endpoint(&self.base_url, &message.data));
                }
                Ok(Event::Message(message)) if is_message_event(&message.event) => {
                    if self.inbound.send(Ok(message.data)).is_err() {
                        break;
                    }
                }
                Ok(Event::Message(message)) => {
                    debug!(endpoint = %self.label, event = %message.event, "ignoring SSE event");
                }
                Err(err) => {
                    let error = match err {
                        reqwest_eventsource::Error::InvalidStatusCode(status, _)
                            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) =>
                        {
                            ProtocolError::Auth {
                                endpoint: self.label.clone(),
                                status: status.as_u16(),
                            }
                        }
                        reqwest_eventsource::Error::StreamEnded => {
                            ProtocolError::closed(&self.label)
                        }
                        other => ProtocolError::io(&self.label, other),
                    };
                    warn!(endpoint = %self.label, %error, "event stream terminated");
                    match self.endpoint.take() {
                        Some(waiter) => {
                            let _ = waiter.send(Err(error));
                        }
                        None => {
                            let _ = self.inbound.send(Err(error));
                        }
                    }
                    break;
                }
            }
        }
        source.close();
    }

    fn announce(&mut self, outcome: Result<Url, ProtocolError>) {
        match self.endpoint.take() {
            Some(waiter) => {
                let _ = waiter.send(outcome);
            }
            None => debug!(endpoint = %self.label, "ignoring repeated endpoint event"),
        }
    }
}

/// Forwards the `message` events of one streamable POST response as they
/// arrive. A broken body ends only this response, not the transport.
struct BodyPump {
    label: String,
    inbound: mpsc::UnboundedSender<Inbound>,
}

impl BodyPump {
    async fn run(self, response: Response) {
        let mut events = response.bytes_stream().eventsource();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) if is_message_event(&event.event) => {
                    if event.data.trim().is_empty() {
                        continue;
                    }
                    if self.inbound.send(Ok(event.data)).is_err() {
                        break;
                    }
                }
                Ok(event) => {
                    debug!(endpoint = %self.label, event = %event.event, "ignoring SSE event");
                }
                Err(err) => {
                    warn!(endpoint = %self.label, %err, "response event stream broke off");
                    break;
                }
            }
        }
    }
}

fn is_message_event(event: &str) -> bool {
    event.is_empty() || event == "message"
}

fn authorize(builder: RequestBuilder, server: &StreamServerConfig) -> RequestBuilder {
    let Some(token) = server.token.as_deref().filter(|token| !token.trim().is_empty()) else {
        return builder;
    };
    match &server.auth {
        AuthScheme::Bearer => builder.bearer_auth(token),
        AuthScheme::ApiKey { header } => builder.header(header.as_str(), token),
    }
}

/// Resolves the POST target announced by an `endpoint` event against the
/// stream URL.
pub(crate) fn resolve_endpoint(base: &Url, announced: &str) -> Result<Url, ProtocolError> {
    let announced = announced.trim();
    if announced.is_empty() {
        return Err(ProtocolError::Violation(
            "endpoint event carried no URL".into(),
        ));
    }
    base.join(announced)
        .map_err(|err| ProtocolError::Violation(format!("invalid endpoint '{announced}': {err}")))
}
