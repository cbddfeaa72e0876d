//! AI layer: intent extraction, tool choice and result interpretation.

mod interface;
mod interpret;
mod llm;
mod parser;
mod rules;

pub use interface::{NavigationIntent, NavigationModel, ToolSelection};
pub use interpret::{coordinate_from_result, coordinate_from_text, coordinate_from_value};
pub use llm::LlmNavigationModel;
pub use rules::{
    PLACE_PARAMETERS, PREFERRED_TOOLS, RuleBasedModel, detect_preference, parse_intent,
    select_geocoding_tool,
};
