use serde::Serialize;
use serde_json::{Map as JsonMap, Value};

/// Result of a `tools/call`, classified by shape. Tool hosts are free to answer
/// with structured JSON, JSON embedded in a text block, or plain prose.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolResult {
    Structured(JsonMap<String, Value>),
    FreeText(String),
    Error(String),
}

impl ToolResult {
    pub fn from_call_result(result: Value) -> Self {
        let is_error = result
            .get("isError")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let text = collect_text(&result);

        if is_error {
            let message = text
                .or_else(|| structured_error_message(&result))
                .unwrap_or_else(|| "tool reported an error without details".to_string());
            return ToolResult::Error(message);
        }

        if let Some(structured) = result.get("structuredContent").and_then(Value::as_object) {
            return ToolResult::Structured(structured.clone());
        }

        if let Some(text) = text {
            return match serde_json::from_str::<Value>(&text) {
                Ok(Value::Object(map)) => ToolResult::Structured(map),
                _ => ToolResult::FreeText(text),
            };
        }

        match result {
            Value::Object(map) if !map.contains_key("content") => ToolResult::Structured(map),
            Value::String(text) => ToolResult::FreeText(text),
            _ => ToolResult::Error("tool returned no usable content".to_string()),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolResult::Error(_))
    }

    /// Compact rendering for prompts and logs.
    pub fn render(&self) -> String {
        match self {
            ToolResult::Structured(map) => Value::Object(map.clone()).to_string(),
            ToolResult::FreeText(text) => text.clone(),
            ToolResult::Error(message) => format!("error: {message}"),
        }
    }
}

fn collect_text(result: &Value) -> Option<String> {
    let blocks = result.get("content").and_then(Value::as_array)?;
    let parts: Vec<&str> = blocks
        .iter()
        .filter(|block| {
            block
                .get("type")
                .and_then(Value::as_str)
                .map(|kind| kind.eq_ignore_ascii_case("text"))
                .unwrap_or(false)
        })
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n"))
    }
}

fn structured_error_message(result: &Value) -> Option<String> {
    let message = result
        .get("structuredContent")?
        .get("error")?
        .get("message")?
        .as_str()?
        .trim();
    (!message.is_empty()).then(|| message.to_string())
}
