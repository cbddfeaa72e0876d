//! JSON-RPC session over a [`Transport`].
//!
//! Each call gets a fresh numeric id and a oneshot slot in the pending map.
//! A single background task reads frames from the transport and settles the
//! matching slot; callers only ever await their own receiver. When the
//! transport goes away every open slot is failed with
//! [`ProtocolError::ConnectionLost`].

use super::error::ProtocolError;
use super::message::{METHOD_NOT_FOUND, Message, RequestId, RpcError};
use super::registry::ToolRegistry;
use super::result::ToolResult;
use super::transport::Transport;
use crate::config::SessionTiming;
use crate::constants::{CLIENT_NAME, DEFAULT_CALL_TIMEOUT_SECS, MCP_PROTOCOL_VERSION};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, OnceCell, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub call_timeout: Duration,
    pub client_name: String,
    pub client_version: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
            client_name: CLIENT_NAME.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl From<&SessionTiming> for SessionOptions {
    fn from(timing: &SessionTiming) -> Self {
        Self {
            call_timeout: timing.call_timeout,
            ..Self::default()
        }
    }
}

/// What the tool host said about itself during `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
    pub protocol_version: String,
    pub instructions: Option<String>,
}

impl ServerInfo {
    fn from_initialize_result(result: &Value) -> Self {
        let text = |value: Option<&Value>| {
            value
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let server = result.get("serverInfo");
        Self {
            name: text(server.and_then(|info| info.get("name"))),
            version: text(server.and_then(|info| info.get("version"))),
            protocol_version: text(result.get("protocolVersion")),
            instructions: result
                .get("instructions")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string),
        }
    }
}

struct PendingCall {
    method: String,
    issued_at: Instant,
    slot: oneshot::Sender<Result<Value, ProtocolError>>,
}

pub struct ProtocolSession {
    inner: Arc<SessionInner>,
    reader: JoinHandle<()>,
}

struct SessionInner {
    id: Uuid,
    transport: Arc<dyn Transport>,
    options: SessionOptions,
    pending: AsyncMutex<HashMap<RequestId, PendingCall>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    registry: OnceCell<Arc<ToolRegistry>>,
    server_info: AsyncMutex<Option<ServerInfo>>,
}

impl ProtocolSession {
    /// Connects the transport and starts the receive loop.
    pub async fn open(
        transport: Arc<dyn Transport>,
        options: SessionOptions,
    ) -> Result<Self, ProtocolError> {
        transport.connect().await?;
        let inner = Arc::new(SessionInner {
            id: Uuid::new_v4(),
            transport,
            options,
            pending: AsyncMutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            registry: OnceCell::new(),
            server_info: AsyncMutex::new(None),
        });
        debug!(
            session = %inner.id,
            endpoint = inner.transport.endpoint(),
            "protocol session opened"
        );
        let reader = tokio::spawn(Arc::clone(&inner).receive_loop());
        Ok(Self { inner, reader })
    }

    /// MCP handshake: `initialize` followed by `notifications/initialized`.
    pub async fn initialize(&self) -> Result<ServerInfo, ProtocolError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": self.inner.options.client_name,
                "version": self.inner.options.client_version,
            }
        });
        let result = self.call("initialize", Some(params)).await?;
        let info = ServerInfo::from_initialize_result(&result);
        self.notify("notifications/initialized", None).await?;
        info!(
            session = %self.inner.id,
            server = %info.name,
            version = %info.version,
            protocol = %info.protocol_version,
            "tool host initialized"
        );
        *self.inner.server_info.lock().await = Some(info.clone());
        Ok(info)
    }

    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, ProtocolError> {
        self.call_with_timeout(method, params, self.inner.options.call_timeout)
            .await
    }

    pub async fn call_with_timeout(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ProtocolError> {
        self.inner.call(method, params, timeout).await
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::closed(self.endpoint()));
        }
        let frame = Message::notification(method, params).encode();
        self.inner.transport.send(&frame).await
    }

    /// Fetches the tool catalogue on first use; later calls return the cached
    /// registry without touching the transport.
    pub async fn list_tools(&self) -> Result<Arc<ToolRegistry>, ProtocolError> {
        let registry = self
            .inner
            .registry
            .get_or_try_init(|| async {
                let result = self.call("tools/list", Some(json!({}))).await?;
                let registry = ToolRegistry::from_list_result(&result)?;
                info!(
                    session = %self.inner.id,
                    tools = registry.len(),
                    "tool catalogue fetched"
                );
                Ok::<_, ProtocolError>(Arc::new(registry))
            })
            .await?;
        Ok(Arc::clone(registry))
    }

    pub fn tools(&self) -> Option<Arc<ToolRegistry>> {
        self.inner.registry.get().cloned()
    }

    /// Validates against the registry before anything is sent.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: JsonMap<String, Value>,
    ) -> Result<ToolResult, ProtocolError> {
        let registry = self.tools().ok_or(ProtocolError::ToolsNotListed)?;
        registry.validate(name, &arguments)?;
        debug!(session = %self.inner.id, tool = name, "calling tool");
        let result = self
            .call(
                "tools/call",
                Some(json!({ "name": name, "arguments": arguments })),
            )
            .await?;
        Ok(ToolResult::from_call_result(result))
    }

    /// Fails every pending call, then closes the transport.
    pub async fn close(&self) {
        self.inner.fail_all_pending().await;
        self.inner.transport.close().await;
        self.reader.abort();
        debug!(session = %self.inner.id, "protocol session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    pub async fn pending_calls(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    pub async fn server_info(&self) -> Option<ServerInfo> {
        self.inner.server_info.lock().await.clone()
    }

    pub fn endpoint(&self) -> &str {
        self.inner.transport.endpoint()
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }
}

impl Drop for ProtocolSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl SessionInner {
    async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> Result<Value, ProtocolError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (slot, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return Err(ProtocolError::ConnectionLost {
                    method: method.to_string(),
                });
            }
            pending.insert(
                id.clone(),
                PendingCall {
                    method: method.to_string(),
                    issued_at: Instant::now(),
                    slot,
                },
            );
        }

        // Deadline covers the send too.
        let frame = Message::request(id.clone(), method, params).encode();
        let exchange = async {
            self.transport.send(&frame).await?;
            receiver.await.unwrap_or_else(|_| {
                Err(ProtocolError::ConnectionLost {
                    method: method.to_string(),
                })
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                self.pending.lock().await.remove(&id);
                Err(err)
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!(
                    session = %self.id,
                    request = %id,
                    method,
                    timeout_ms = timeout.as_millis() as u64,
                    "request timed out"
                );
                Err(ProtocolError::Timeout {
                    method: method.to_string(),
                    after: timeout,
                })
            }
        }
    }

    async fn receive_loop(self: Arc<Self>) {
        loop {
            match self.transport.receive().await {
                Ok(frame) => self.dispatch(&frame).await,
                Err(err) => {
                    if !self.closed.load(Ordering::SeqCst) {
                        warn!(session = %self.id, %err, "transport stopped delivering frames");
                    }
                    break;
                }
            }
        }
        self.fail_all_pending().await;
    }

    async fn dispatch(&self, frame: &str) {
        let message = match Message::decode(frame) {
            Ok(message) => message,
            Err(err) => {
                warn!(session = %self.id, %err, frame, "skipping malformed frame");
                return;
            }
        };

        match message {
            Message::Response { id, outcome } => self.settle(id, outcome).await,
            Message::Request { id, method, .. } => self.answer_server_request(id, &method).await,
            Message::Notification { method, .. } => {
                if method == "notifications/tools/list_changed" {
                    info!(
                        session = %self.id,
                        "tool host reports a changed catalogue; open a new session to refresh it"
                    );
                } else {
                    debug!(session = %self.id, method = %method, "notification from tool host");
                }
            }
        }
    }

    async fn settle(&self, id: RequestId, outcome: Result<Value, RpcError>) {
        let Some(call) = self.pending.lock().await.remove(&id) else {
            debug!(session = %self.id, request = %id, "discarding response for unknown or expired request");
            return;
        };
        debug!(
            session = %self.id,
            request = %id,
            method = %call.method,
            elapsed_ms = call.issued_at.elapsed().as_millis() as u64,
            "response received"
        );
        let outcome = outcome.map_err(|error| ProtocolError::Rpc {
            code: error.code,
            message: error.message,
        });
        let _ = call.slot.send(outcome);
    }

    async fn answer_server_request(&self, id: RequestId, method: &str) {
        let reply = match method {
            "ping" => Message::result(id, json!({})),
            other => {
                warn!(session = %self.id, method = other, "tool host sent unsupported request");
                Message::error(
                    id,
                    METHOD_NOT_FOUND,
                    format!("client does not implement method '{other}'"),
                )
            }
        };
        if let Err(err) = self.transport.send(&reply.encode()).await {
            warn!(session = %self.id, %err, "failed to answer tool host request");
        }
    }

    async fn fail_all_pending(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock().await;
        if !pending.is_empty() {
            warn!(
                session = %self.id,
                count = pending.len(),
                "failing pending requests after connection loss"
            );
        }
        for (_, call) in pending.drain() {
            let _ = call.slot.send(Err(ProtocolError::ConnectionLost {
                method: call.method,
            }));
        }
    }
}
