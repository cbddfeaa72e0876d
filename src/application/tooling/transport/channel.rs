use super::Transport;
use crate::application::tooling::error::ProtocolError;
use crate::application::tooling::message::Message;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tracing::{debug, warn};

/// In-process transport. The other end is a [`ChannelPeer`] that plays the
/// tool host.
pub struct ChannelTransport {
    label: String,
    outbound: AsyncMutex<Option<mpsc::UnboundedSender<String>>>,
    inbound: AsyncMutex<mpsc::UnboundedReceiver<String>>,
    closed: watch::Sender<bool>,
    frames_sent: AtomicUsize,
}

pub struct ChannelPeer {
    requests: mpsc::UnboundedReceiver<String>,
    responses: mpsc::UnboundedSender<String>,
}

impl ChannelTransport {
    pub fn pair(label: impl Into<String>) -> (Self, ChannelPeer) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        let transport = Self {
            label: label.into(),
            outbound: AsyncMutex::new(Some(request_tx)),
            inbound: AsyncMutex::new(response_rx),
            closed,
            frames_sent: AtomicUsize::new(0),
        };
        let peer = ChannelPeer {
            requests: request_rx,
            responses: response_tx,
        };
        (transport, peer)
    }

    /// Number of times [`Transport::send`] has been invoked.
    pub fn frames_sent(&self) -> usize {
        self.frames_sent.load(Ordering::SeqCst)
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn endpoint(&self) -> &str {
        &self.label
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::connection(&self.label, "channel already closed"));
        }
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), ProtocolError> {
        self.frames_sent.fetch_add(1, Ordering::SeqCst);
        let outbound = self.outbound.lock().await;
        let sender = outbound
            .as_ref()
            .ok_or_else(|| ProtocolError::closed(&self.label))?;
        sender
            .send(frame.to_string())
            .map_err(|_| ProtocolError::io(&self.label, "peer stopped reading"))
    }

    async fn receive(&self) -> Result<String, ProtocolError> {
        let mut closed = self.closed.subscribe();
        let mut inbound = self.inbound.lock().await;
        tokio::select! {
            frame = inbound.recv() => frame.ok_or_else(|| ProtocolError::closed(&self.label)),
            _ = closed.wait_for(|closed| *closed) => Err(ProtocolError::closed(&self.label)),
        }
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        self.outbound.lock().await.take();
        debug!(endpoint = %self.label, "channel transport closed");
    }
}

impl ChannelPeer {
    /// Next frame written by the transport; `None` once it is closed.
    pub async fn next_frame(&mut self) -> Option<String> {
        self.requests.recv().await
    }

    /// Next decodable message. Undecodable frames are logged and skipped.
    pub async fn next_message(&mut self) -> Option<Message> {
        while let Some(frame) = self.requests.recv().await {
            match Message::decode(&frame) {
                Ok(message) => return Some(message),
                Err(err) => warn!(%err, "channel peer skipped undecodable frame"),
            }
        }
        None
    }

    /// Non-blocking variant of [`ChannelPeer::next_message`].
    pub fn try_next_message(&mut self) -> Option<Message> {
        while let Ok(frame) = self.requests.try_recv() {
            if let Ok(message) = Message::decode(&frame) {
                return Some(message);
            }
        }
        None
    }

    pub fn send_frame(&self, frame: impl Into<String>) -> bool {
        self.responses.send(frame.into()).is_ok()
    }

    pub fn send_message(&self, message: &Message) -> bool {
        self.send_frame(message.encode())
    }
}
