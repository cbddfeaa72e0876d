use super::error::ProtocolError;
use super::session::{ProtocolSession, SessionOptions};
use super::transport::{MockTransport, PipeTransport, StreamMode, StreamedTransport, Transport};
use crate::config::{SessionTiming, TransportConfig};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Produces ready-to-use sessions: connected, initialized, catalogue fetched.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(&self) -> Result<ProtocolSession, ProtocolError>;

    fn describe(&self) -> String;
}

/// Opens a session over `transport` and runs the handshake plus `tools/list`.
/// The session is closed again if any step fails.
pub async fn establish(
    transport: Arc<dyn Transport>,
    options: SessionOptions,
) -> Result<ProtocolSession, ProtocolError> {
    let session = ProtocolSession::open(transport, options).await?;
    let ready = async {
        session.initialize().await?;
        session.list_tools().await?;
        Ok::<_, ProtocolError>(())
    }
    .await;
    match ready {
        Ok(()) => Ok(session),
        Err(err) => {
            warn!(endpoint = session.endpoint(), %err, "session setup failed");
            session.close().await;
            Err(err)
        }
    }
}

/// Builds a fresh transport from configuration for every connection attempt.
#[derive(Debug, Clone)]
pub struct ConfiguredConnector {
    transport: TransportConfig,
    timing: SessionTiming,
}

impl ConfiguredConnector {
    pub fn new(transport: TransportConfig, timing: SessionTiming) -> Self {
        Self { transport, timing }
    }

    pub fn build_transport(&self) -> Result<Arc<dyn Transport>, ProtocolError> {
        let grace = self.timing.close_grace;
        let transport: Arc<dyn Transport> = match &self.transport {
            TransportConfig::Pipe(server) => Arc::new(PipeTransport::new(server.clone(), grace)),
            TransportConfig::Sse(server) => Arc::new(StreamedTransport::new(
                server.clone(),
                StreamMode::Sse,
                grace,
            )?),
            TransportConfig::Streamable(server) => Arc::new(StreamedTransport::new(
                server.clone(),
                StreamMode::Streamable,
                grace,
            )?),
            TransportConfig::Mock => Arc::new(MockTransport::new()),
        };
        Ok(transport)
    }
}

#[async_trait]
impl SessionConnector for ConfiguredConnector {
    async fn connect(&self) -> Result<ProtocolSession, ProtocolError> {
        let transport = self.build_transport()?;
        info!(
            transport = self.transport.kind(),
            endpoint = transport.endpoint(),
            "connecting to tool host"
        );
        establish(transport, SessionOptions::from(&self.timing)).await
    }

    fn describe(&self) -> String {
        self.transport.kind().to_string()
    }
}
