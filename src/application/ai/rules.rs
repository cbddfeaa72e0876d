//! Rule-based navigation model. Used on its own in mock mode and as the
//! fallback whenever a chat model returns nothing usable.

use super::interface::{NavigationIntent, NavigationModel, ToolSelection};
use super::interpret::coordinate_from_result;
use crate::application::tooling::{ToolDescriptor, ToolRegistry, ToolResult};
use crate::domain::{Coordinate, RoutePreference};
use crate::infrastructure::model::ModelError;
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map as JsonMap, Value};
use std::sync::LazyLock;

/// Geocoding tools in order of preference.
pub const PREFERRED_TOOLS: &[&str] = &[
    "maps_geo",
    "geocode",
    "maps_text_search",
    "poi_search",
    "search_poi",
];

/// Parameter names that take a place name.
pub const PLACE_PARAMETERS: &[&str] = &["address", "keywords", "keyword", "query", "place", "name"];

const LEADING_FILLERS: &[&str] = &[
    "请", "帮我", "麻烦", "我要", "我想", "我需要", "导航", "带我", "规划", "一下",
];
const TRAILING_FILLERS: &[&str] = &[
    "怎么走", "怎么去", "的路线", "的路", "路线", "导航", "吧", "呢",
];

static FROM_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"从(.+?)(?:到|去|至|前往)(.+)").expect("static regex"));
static X_TO_Y: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)(?:到|去|至)(.+)$").expect("static regex"));
static TO_Y: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:去|到|前往)(.+)").expect("static regex"));
static EN_FROM_TO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfrom\s+(.+?)\s+to\s+(.+)").expect("static regex")
});
static EN_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bto\s+(.+)").expect("static regex"));

const PREFERENCE_KEYWORDS: &[(RoutePreference, &[&str])] = &[
    (
        RoutePreference::AvoidCongestion,
        &["拥堵", "堵车", "避堵", "avoid traffic", "avoid congestion", "traffic jam"],
    ),
    (
        RoutePreference::Cheapest,
        &["便宜", "省钱", "费用", "少收费", "cheapest", "cheap", "avoid tolls", "toll"],
    ),
    (
        RoutePreference::Fastest,
        &["最快", "速度优先", "时间最短", "快", "fastest", "quickest"],
    ),
    (
        RoutePreference::Shortest,
        &["最短", "距离最近", "近", "shortest"],
    ),
];

#[derive(Debug, Clone, Default)]
pub struct RuleBasedModel;

impl RuleBasedModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NavigationModel for RuleBasedModel {
    fn name(&self) -> &str {
        "rules"
    }

    async fn extract_intent(
        &self,
        text: &str,
        _summary: &str,
    ) -> Result<Option<NavigationIntent>, ModelError> {
        let intent = parse_intent(text);
        Ok((!intent.is_empty()).then_some(intent))
    }

    async fn select_tool(
        &self,
        place: &str,
        tools: &ToolRegistry,
        _summary: &str,
    ) -> Result<Option<ToolSelection>, ModelError> {
        Ok(select_geocoding_tool(place, tools))
    }

    async fn interpret_tool_result(
        &self,
        tool: &str,
        result: &ToolResult,
    ) -> Result<Coordinate, ModelError> {
        coordinate_from_result(result).ok_or_else(|| {
            ModelError::unusable(self.name(), format!("no coordinate in '{tool}' result"))
        })
    }
}

/// Extracts origin, destination and preference with fixed patterns.
pub fn parse_intent(text: &str) -> NavigationIntent {
    let preference = detect_preference(text);
    let cleaned = strip_leading_fillers(text.trim());

    let (origin, destination) = if let Some(captures) = FROM_TO.captures(cleaned) {
        (
            captures.get(1).map(|m| m.as_str()),
            captures.get(2).map(|m| m.as_str()),
        )
    } else if let Some(captures) = EN_FROM_TO.captures(cleaned) {
        (
            captures.get(1).map(|m| m.as_str()),
            captures.get(2).map(|m| m.as_str()),
        )
    } else if let Some(captures) = X_TO_Y.captures(cleaned) {
        (
            captures.get(1).map(|m| m.as_str()),
            captures.get(2).map(|m| m.as_str()),
        )
    } else if let Some(captures) = TO_Y.captures(cleaned) {
        (None, captures.get(1).map(|m| m.as_str()))
    } else if let Some(captures) = EN_TO.captures(cleaned) {
        (None, captures.get(1).map(|m| m.as_str()))
    } else {
        (None, None)
    };

    NavigationIntent {
        origin: origin.and_then(clean_place),
        destination: destination.and_then(clean_place),
        preference,
    }
    .normalized()
}

pub fn detect_preference(text: &str) -> Option<RoutePreference> {
    let lowered = text.to_lowercase();
    PREFERENCE_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(preference, _)| *preference)
}

/// Picks the preferred geocoding tool the host offers and fills its place
/// parameters. Required parameters that are not place-like stay empty.
pub fn select_geocoding_tool(place: &str, tools: &ToolRegistry) -> Option<ToolSelection> {
    let descriptor = PREFERRED_TOOLS
        .iter()
        .find_map(|name| tools.get(name))
        .or_else(|| {
            tools.iter().find(|descriptor| {
                descriptor
                    .required_parameters()
                    .any(|param| PLACE_PARAMETERS.contains(&param))
            })
        })?;
    Some(ToolSelection::new(
        descriptor.name.clone(),
        place_arguments(descriptor, place),
    ))
}

fn place_arguments(descriptor: &ToolDescriptor, place: &str) -> JsonMap<String, Value> {
    let mut arguments = JsonMap::new();
    for param in descriptor.required_parameters() {
        if PLACE_PARAMETERS.contains(&param) {
            arguments.insert(param.to_string(), Value::String(place.to_string()));
        }
    }
    if arguments.is_empty() {
        if let Some(param) = PLACE_PARAMETERS
            .iter()
            .find(|param| descriptor.parameters.contains_key(**param))
        {
            arguments.insert(param.to_string(), Value::String(place.to_string()));
        }
    }
    arguments
}

fn strip_leading_fillers(mut text: &str) -> &str {
    loop {
        let before = text;
        for filler in LEADING_FILLERS {
            text = text.trim_start_matches(filler).trim_start();
        }
        if text == before {
            return text;
        }
    }
}

fn clean_place(raw: &str) -> Option<String> {
    let cut = raw
        .find(|c: char| "，,。.！!？?；;\n".contains(c))
        .map(|index| &raw[..index])
        .unwrap_or(raw);
    let mut place = cut.trim();
    loop {
        let before = place;
        for filler in TRAILING_FILLERS {
            place = place.trim_end_matches(filler).trim_end();
        }
        if place == before {
            break;
        }
    }
    (!place.is_empty()).then(|| place.to_string())
}
