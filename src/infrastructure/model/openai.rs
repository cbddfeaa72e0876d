//! OpenAI-compatible client implementation

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::base::HttpClientBase;
use super::traits::ModelProvider;
use super::types::{ModelError, ModelRequest, ModelResponse};
use crate::config::OpenAiSettings;
use crate::domain::ChatMessage;

const CHAT_PATH: &str = "chat/completions";

/// OpenAI-compatible client (works with OpenAI, DeepSeek, Qwen, Moonshot, etc.)
#[derive(Clone)]
pub struct OpenAIClient {
    base: HttpClientBase,
    model: String,
}

impl OpenAIClient {
    pub fn from_settings(settings: &OpenAiSettings) -> Result<Self, ModelError> {
        Ok(Self {
            base: HttpClientBase::new(
                "openai",
                settings.base_url.clone(),
                Some(settings.api_key.clone()),
                settings.timeout,
            )?,
            model: settings.model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ModelProvider for OpenAIClient {
    fn id(&self) -> &str {
        &self.base.id
    }

    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let url = self.base.build_url(CHAT_PATH);
        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        let payload = OpenAIRequest {
            model,
            messages: request.messages.iter().map(OpenAIMessageOut::from).collect(),
            temperature: request.temperature,
            stream: false,
        };

        info!(
            provider = self.base.id.as_str(),
            model = payload.model.as_str(),
            messages = request.messages.len(),
            "Sending request to OpenAI-compatible provider"
        );

        let response: OpenAIResponse = self.base.post_with_bearer(&url, &payload).await?;
        debug!("Received response from OpenAI-compatible provider");

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .ok_or_else(|| ModelError::invalid_response(&self.base.id, "missing content"))?;

        Ok(ModelResponse::new(content))
    }
}

#[derive(Serialize)]
struct OpenAIRequest<'a> {
    model: String,
    messages: Vec<OpenAIMessageOut<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct OpenAIMessageOut<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> From<&'a ChatMessage> for OpenAIMessageOut<'a> {
    fn from(message: &'a ChatMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: &message.content,
        }
    }
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: Option<OpenAIMessage>,
}

#[derive(Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}
