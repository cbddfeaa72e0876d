use crate::domain::{LocationRef, RoutePreference};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavigationState {
    Idle,
    IntentExtraction,
    ToolSelection,
    ToolInvocation,
    ResultInterpretation,
    Resolved,
    Failed,
}

impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NavigationState::Idle => "idle",
            NavigationState::IntentExtraction => "intent_extraction",
            NavigationState::ToolSelection => "tool_selection",
            NavigationState::ToolInvocation => "tool_invocation",
            NavigationState::ResultInterpretation => "result_interpretation",
            NavigationState::Resolved => "resolved",
            NavigationState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Both ends resolved, plus the link that opens the route.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub origin: LocationRef,
    pub destination: LocationRef,
    pub preference: RoutePreference,
    pub url: String,
}

/// One geocoding round trip taken while resolving a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolStep {
    pub place: String,
    pub tool: String,
    pub attempts: u8,
}
