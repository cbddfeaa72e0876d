//! Byte-level channels to a tool host.
//!
//! A transport moves opaque text frames (one JSON-RPC message each) and knows
//! nothing about correlation; that is the session's job. All methods take
//! `&self` so the session's receive loop can sit in [`Transport::receive`]
//! while a caller sends.

mod channel;
mod mock;
mod pipe;
mod streamed;

use super::error::ProtocolError;
use async_trait::async_trait;

pub use channel::{ChannelPeer, ChannelTransport};
pub use mock::{MockToolHost, MockTransport};
pub use pipe::PipeTransport;
pub use streamed::{StreamMode, StreamedTransport};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Short label used in logs and error messages.
    fn endpoint(&self) -> &str;

    async fn connect(&self) -> Result<(), ProtocolError>;

    async fn send(&self, frame: &str) -> Result<(), ProtocolError>;

    /// Next inbound frame. Returns [`ProtocolError::Closed`] once the peer is
    /// gone or [`Transport::close`] was called.
    async fn receive(&self) -> Result<String, ProtocolError>;

    /// Idempotent; bounded by the transport's grace period.
    async fn close(&self);
}
