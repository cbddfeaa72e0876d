//! Chat-model backed [`NavigationModel`].

use super::interface::{NavigationIntent, NavigationModel, ToolSelection};
use super::interpret::coordinate_from_value;
use super::parser::extract_object;
use crate::application::tooling::{ToolRegistry, ToolResult};
use crate::domain::{ChatMessage, Coordinate, MessageRole, RoutePreference};
use crate::infrastructure::model::{ModelError, ModelProvider, ModelRequest};
use async_trait::async_trait;
use serde_json::{Map as JsonMap, Value, json};
use tracing::{debug, warn};

const INTENT_PROMPT: &str = r#"You extract navigation requests for a map service in China.
Reply with one JSON object and nothing else:
{"origin": "<start place or null>", "destination": "<end place or null>", "preference": "<fastest|cheapest|shortest|avoid-congestion or null>"}
Use the place names exactly as the user wrote them. Use null for anything the user did not say."#;

const TOOL_PROMPT: &str = r#"You choose which map tool converts a place name into coordinates.
Reply with one JSON object and nothing else:
{"tool": "<tool name>", "arguments": {"<parameter>": "<value>"}}
Only use tools and parameters from the list. Reply {"tool": null} if no tool fits."#;

const INTERPRET_PROMPT: &str = r#"You read the raw output of a map tool and report the coordinate it contains.
Reply with one JSON object and nothing else:
{"longitude": <number>, "latitude": <number>}
If the output holds no coordinate reply {"error": "<reason>"}. Never guess."#;

const TEMPERATURE: f32 = 0.0;
const MAX_RESULT_CHARS: usize = 4000;

pub struct LlmNavigationModel<P: ModelProvider> {
    provider: P,
    model: String,
}

impl<P: ModelProvider> LlmNavigationModel<P> {
    pub fn new(provider: P, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    async fn ask(&self, system: &str, user: String) -> Result<Option<JsonMap<String, Value>>, ModelError> {
        let request = ModelRequest::new(
            self.model.clone(),
            vec![
                ChatMessage::new(MessageRole::System, system),
                ChatMessage::new(MessageRole::User, user),
            ],
        )
        .with_temperature(TEMPERATURE);
        let response = self.provider.chat(request).await?;
        let parsed = extract_object(response.content());
        if parsed.is_none() {
            warn!(
                provider = self.provider.id(),
                reply = response.content(),
                "model reply contained no JSON object"
            );
        }
        Ok(parsed)
    }
}

#[async_trait]
impl<P: ModelProvider> NavigationModel for LlmNavigationModel<P> {
    fn name(&self) -> &str {
        self.provider.id()
    }

    async fn extract_intent(
        &self,
        text: &str,
        summary: &str,
    ) -> Result<Option<NavigationIntent>, ModelError> {
        let user = format!("Context:\n{summary}\n\nRequest: {text}");
        let Some(map) = self.ask(INTENT_PROMPT, user).await? else {
            return Ok(None);
        };
        let intent = intent_from_reply(&map);
        debug!(?intent, "model extracted intent");
        Ok((!intent.is_empty()).then_some(intent))
    }

    async fn select_tool(
        &self,
        place: &str,
        tools: &ToolRegistry,
        summary: &str,
    ) -> Result<Option<ToolSelection>, ModelError> {
        let catalogue: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                })
            })
            .collect();
        let user = format!(
            "Context:\n{summary}\n\nPlace: {place}\n\nTools:\n{}",
            Value::Array(catalogue)
        );
        let Some(map) = self.ask(TOOL_PROMPT, user).await? else {
            return Ok(None);
        };
        let selection = selection_from_reply(&map);
        if let Some(selection) = &selection {
            if !tools.contains(&selection.tool) {
                warn!(tool = %selection.tool, "model picked a tool the host does not offer");
                return Ok(None);
            }
        }
        Ok(selection)
    }

    async fn interpret_tool_result(
        &self,
        tool: &str,
        result: &ToolResult,
    ) -> Result<Coordinate, ModelError> {
        let rendered: String = result.render().chars().take(MAX_RESULT_CHARS).collect();
        let user = format!("Tool: {tool}\n\nOutput:\n{rendered}");
        let map = self
            .ask(INTERPRET_PROMPT, user)
            .await?
            .ok_or_else(|| ModelError::unusable(&self.model, "reply was not JSON"))?;
        if let Some(reason) = map.get("error").and_then(Value::as_str) {
            return Err(ModelError::unusable(&self.model, reason));
        }
        coordinate_from_value(&Value::Object(map))
            .ok_or_else(|| ModelError::unusable(&self.model, "reply held no valid coordinate"))
    }
}

fn text_field(map: &JsonMap<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

fn intent_from_reply(map: &JsonMap<String, Value>) -> NavigationIntent {
    NavigationIntent {
        origin: text_field(map, &["origin", "start", "from"]),
        destination: text_field(map, &["destination", "end", "to"]),
        preference: text_field(map, &["preference"]).and_then(|raw| RoutePreference::parse(&raw)),
    }
    .normalized()
}

fn selection_from_reply(map: &JsonMap<String, Value>) -> Option<ToolSelection> {
    let tool = text_field(map, &["tool", "tool_name", "name"])?;
    let arguments = map
        .get("arguments")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    Some(ToolSelection::new(tool, arguments))
}
