//! Seam between the AI layer and concrete chat model clients.

use super::types::{ModelError, ModelRequest, ModelResponse};
use async_trait::async_trait;

/// A chat completion backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider identifier used in logs and errors
    fn id(&self) -> &str;

    /// One request, one assistant reply.
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError>;
}
