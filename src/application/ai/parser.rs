use serde_json::Value;

/// Pulls a JSON value out of a model reply: plain JSON, a fenced block, or
/// the outermost `{...}` span inside prose.
pub(crate) fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    if trimmed.starts_with("```") {
        let stripped = trimmed.trim_start_matches("```json");
        let stripped = stripped.trim_start_matches("```JSON");
        let stripped = stripped.trim_start_matches("```");
        if let Some(end) = stripped.rfind("```") {
            let slice = &stripped[..end];
            if let Ok(value) = serde_json::from_str::<Value>(slice.trim()) {
                return Some(value);
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            let candidate = &trimmed[start..=end];
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
    }

    None
}

/// Like [`extract_json`] but only accepts objects; a JSON string holding an
/// object is unwrapped once.
pub(crate) fn extract_object(content: &str) -> Option<serde_json::Map<String, Value>> {
    match extract_json(content)? {
        Value::Object(map) => Some(map),
        Value::String(inner) => match extract_json(&inner)? {
            Value::Object(map) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_plain_fenced_and_wrapped_json() {
        let expected = json!({"origin": "北京", "destination": "上海"});
        for reply in [
            r#"{"origin": "北京", "destination": "上海"}"#,
            "```json\n{\"origin\": \"北京\", \"destination\": \"上海\"}\n```",
            "好的，结果如下：{\"origin\": \"北京\", \"destination\": \"上海\"} 希望有帮助",
        ] {
            assert_eq!(extract_json(reply), Some(expected.clone()), "reply: {reply}");
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(extract_json("I cannot help with that"), None);
        assert_eq!(extract_object("[1, 2]"), None);
    }

    #[test]
    fn unwraps_json_encoded_strings() {
        let map = extract_object(r#""{\"tool\": \"maps_geo\"}""#).expect("object");
        assert_eq!(map["tool"], "maps_geo");
    }
}
