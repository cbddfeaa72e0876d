//! Deterministic coordinate extraction from tool results.

use super::parser::extract_json;
use crate::application::tooling::ToolResult;
use crate::domain::Coordinate;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

static COORDINATE_PAIR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(-?\d{1,3}\.\d+)\s*[,，]\s*(-?\d{1,2}\.\d+)").expect("static regex")
});

const LIST_KEYS: &[&str] = &["results", "geocodes", "pois", "data"];
const LONGITUDE_KEYS: &[&str] = &["longitude", "lng", "lon"];
const LATITUDE_KEYS: &[&str] = &["latitude", "lat"];

/// Finds the first valid coordinate in a tool result. Error results and
/// out-of-range values never produce a coordinate.
pub fn coordinate_from_result(result: &ToolResult) -> Option<Coordinate> {
    match result {
        ToolResult::Structured(map) => coordinate_from_value(&Value::Object(map.clone())),
        ToolResult::FreeText(text) => coordinate_from_text(text),
        ToolResult::Error(_) => None,
    }
}

pub fn coordinate_from_text(text: &str) -> Option<Coordinate> {
    if let Some(coord) = extract_json(text).and_then(|value| coordinate_from_value(&value)) {
        return Some(coord);
    }
    COORDINATE_PAIR.captures_iter(text).find_map(|captures| {
        let longitude = captures.get(1)?.as_str().parse().ok()?;
        let latitude = captures.get(2)?.as_str().parse().ok()?;
        Coordinate::checked(longitude, latitude)
    })
}

pub fn coordinate_from_value(value: &Value) -> Option<Coordinate> {
    match value {
        Value::Object(map) => {
            for key in LIST_KEYS {
                let found = match map.get(*key) {
                    Some(Value::Array(items)) => items.iter().find_map(coordinate_from_value),
                    Some(nested @ Value::Object(_)) => coordinate_from_value(nested),
                    _ => None,
                };
                if found.is_some() {
                    return found;
                }
            }
            if let Some(coord) = map.get("location").and_then(location_value) {
                return Some(coord);
            }
            let longitude = LONGITUDE_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(number));
            let latitude = LATITUDE_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(number));
            Coordinate::checked(longitude?, latitude?)
        }
        Value::Array(items) => items.iter().find_map(coordinate_from_value),
        Value::String(text) => Coordinate::parse_pair(text),
        _ => None,
    }
}

fn location_value(value: &Value) -> Option<Coordinate> {
    match value {
        Value::String(text) => Coordinate::parse_pair(text),
        Value::Object(_) => coordinate_from_value(value),
        _ => None,
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn structured(value: Value) -> ToolResult {
        match value {
            Value::Object(map) => ToolResult::Structured(map),
            _ => panic!("test payload must be an object"),
        }
    }

    #[test]
    fn reads_amap_geocode_shapes() {
        let expected = Coordinate::checked(121.473701, 31.230416);
        for payload in [
            json!({ "results": [{ "location": "121.473701,31.230416" }] }),
            json!({ "geocodes": [{ "formatted_address": "上海市", "location": "121.473701,31.230416" }] }),
            json!({ "pois": [{ "name": "外滩", "location": "121.473701,31.230416" }] }),
            json!({ "location": { "lng": 121.473701, "lat": 31.230416 } }),
            json!({ "name": "上海", "longitude": 121.473701, "latitude": 31.230416 }),
            json!({ "data": { "lng": "121.473701", "lat": "31.230416" } }),
        ] {
            assert_eq!(coordinate_from_result(&structured(payload.clone())), expected, "{payload}");
        }
    }

    #[test]
    fn skips_entries_without_location() {
        let payload = json!({ "pois": [{ "name": "no location" }, { "location": "113.264385,23.129112" }] });
        assert_eq!(
            coordinate_from_result(&structured(payload)),
            Coordinate::checked(113.264385, 23.129112)
        );
    }

    #[test]
    fn finds_pairs_in_free_text() {
        let text = ToolResult::FreeText("深圳市中心坐标：114.057868，22.543099。".into());
        assert_eq!(
            coordinate_from_result(&text),
            Coordinate::checked(114.057868, 22.543099)
        );
    }

    #[test]
    fn never_invents_coordinates() {
        assert_eq!(coordinate_from_result(&ToolResult::FreeText("地址不明确".into())), None);
        assert_eq!(coordinate_from_result(&ToolResult::Error("116.4,39.9".into())), None);
        assert_eq!(
            coordinate_from_result(&structured(json!({ "location": "200.0,95.0" }))),
            None
        );
        assert_eq!(
            coordinate_from_result(&structured(json!({ "status": "1", "count": "0", "geocodes": [] }))),
            None
        );
    }
}
