use crate::application::tooling::{ToolRegistry, ToolResult};
use crate::domain::{Coordinate, RoutePreference};
use crate::infrastructure::model::ModelError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

/// Places and preference named in one request. Either side may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationIntent {
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub preference: Option<RoutePreference>,
}

impl NavigationIntent {
    /// Trims names and drops empty ones.
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty())
        };
        Self {
            origin: clean(self.origin),
            destination: clean(self.destination),
            preference: self.preference,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.origin.is_none() && self.destination.is_none() && self.preference.is_none()
    }

    /// Fills the gaps of `self` from `other`.
    pub fn or(self, other: NavigationIntent) -> Self {
        Self {
            origin: self.origin.or(other.origin),
            destination: self.destination.or(other.destination),
            preference: self.preference.or(other.preference),
        }
    }
}

/// A tool chosen to geocode one place.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSelection {
    pub tool: String,
    pub arguments: JsonMap<String, Value>,
}

impl ToolSelection {
    pub fn new(tool: impl Into<String>, arguments: JsonMap<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// The AI step of the navigator. `Ok(None)` means the model had nothing
/// usable to say; the caller then applies its rule-based fallback.
#[async_trait]
pub trait NavigationModel: Send + Sync {
    fn name(&self) -> &str;

    async fn extract_intent(
        &self,
        text: &str,
        summary: &str,
    ) -> Result<Option<NavigationIntent>, ModelError>;

    async fn select_tool(
        &self,
        place: &str,
        tools: &ToolRegistry,
        summary: &str,
    ) -> Result<Option<ToolSelection>, ModelError>;

    async fn interpret_tool_result(
        &self,
        tool: &str,
        result: &ToolResult,
    ) -> Result<Coordinate, ModelError>;
}
