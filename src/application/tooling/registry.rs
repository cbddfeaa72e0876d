use super::error::ProtocolError;
use serde::Serialize;
use serde_json::{Map as JsonMap, Value};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParameterSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, ParameterSpec>,
}

impl ToolDescriptor {
    pub fn required_parameters(&self) -> impl Iterator<Item = &str> {
        self.parameters
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }

    fn from_value(value: &Value) -> Option<Self> {
        let name = value.get("name").and_then(Value::as_str)?.trim();
        if name.is_empty() {
            return None;
        }
        let description = value
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let schema = value.get("inputSchema");
        let required: Vec<&str> = schema
            .and_then(|schema| schema.get("required"))
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut parameters = BTreeMap::new();
        if let Some(properties) = schema
            .and_then(|schema| schema.get("properties"))
            .and_then(Value::as_object)
        {
            for (param, spec) in properties {
                parameters.insert(
                    param.clone(),
                    ParameterSpec {
                        kind: spec
                            .get("type")
                            .and_then(Value::as_str)
                            .unwrap_or("any")
                            .to_string(),
                        required: required.contains(&param.as_str()),
                        description: spec
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    },
                );
            }
        }
        // Required names without a declared property still have to be supplied.
        for param in required {
            parameters
                .entry(param.to_string())
                .or_insert_with(|| ParameterSpec {
                    kind: "any".into(),
                    required: true,
                    description: None,
                });
        }

        Some(Self {
            name: name.to_string(),
            description,
            parameters,
        })
    }
}

/// Tool catalogue of one session, built from a single `tools/list` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolDescriptor>,
}

impl ToolRegistry {
    pub fn from_list_result(result: &Value) -> Result<Self, ProtocolError> {
        let entries = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ProtocolError::Violation("tools/list result has no 'tools' array".into())
            })?;

        let mut tools = BTreeMap::new();
        for entry in entries {
            let Some(descriptor) = ToolDescriptor::from_value(entry) else {
                warn!(entry = %entry, "skipping tool entry without a name");
                continue;
            };
            if tools.contains_key(&descriptor.name) {
                warn!(tool = %descriptor.name, "duplicate tool name in catalogue; keeping the first");
                continue;
            }
            tools.insert(descriptor.name.clone(), descriptor);
        }
        Ok(Self { tools })
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.values()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Client-side check run before any `tools/call` is sent.
    pub fn validate(
        &self,
        name: &str,
        arguments: &JsonMap<String, Value>,
    ) -> Result<&ToolDescriptor, ProtocolError> {
        let descriptor = self
            .tools
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownTool {
                tool: name.to_string(),
            })?;
        for parameter in descriptor.required_parameters() {
            let present = arguments
                .get(parameter)
                .map(|value| !value.is_null())
                .unwrap_or(false);
            if !present {
                return Err(ProtocolError::MissingParameter {
                    tool: name.to_string(),
                    parameter: parameter.to_string(),
                });
            }
        }
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalogue() -> Value {
        json!({
            "tools": [
                {
                    "name": "maps_geo",
                    "description": "Convert an address into coordinates",
                    "inputSchema": {
                        "type": "object",
                        "properties": {
                            "address": { "type": "string", "description": "Address" },
                            "city": { "type": "string" }
                        },
                        "required": ["address"]
                    }
                },
                { "name": "maps_weather", "inputSchema": { "required": ["city"] } },
                { "description": "nameless" },
                { "name": "maps_geo", "description": "duplicate" }
            ]
        })
    }

    #[test]
    fn builds_descriptors_from_input_schema() {
        let registry = ToolRegistry::from_list_result(&catalogue()).expect("registry");
        assert_eq!(registry.len(), 2);

        let geo = registry.get("maps_geo").expect("maps_geo present");
        assert_eq!(geo.description, "Convert an address into coordinates");
        assert!(geo.parameters["address"].required);
        assert!(!geo.parameters["city"].required);
        assert_eq!(geo.required_parameters().collect::<Vec<_>>(), vec!["address"]);

        let weather = registry.get("maps_weather").expect("maps_weather present");
        assert!(weather.parameters["city"].required);
        assert_eq!(weather.parameters["city"].kind, "any");
    }

    #[test]
    fn validate_rejects_unknown_tools_and_missing_parameters() {
        let registry = ToolRegistry::from_list_result(&catalogue()).expect("registry");

        let err = registry.validate("route", &JsonMap::new()).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownTool { ref tool } if tool == "route"));

        let mut args = JsonMap::new();
        args.insert("address".into(), Value::Null);
        let err = registry.validate("maps_geo", &args).unwrap_err();
        assert!(
            matches!(err, ProtocolError::MissingParameter { ref parameter, .. } if parameter == "address")
        );

        args.insert("address".into(), json!("北京"));
        assert!(registry.validate("maps_geo", &args).is_ok());
    }

    #[test]
    fn rejects_results_without_tools_array() {
        let err = ToolRegistry::from_list_result(&json!({"items": []})).unwrap_err();
        assert!(matches!(err, ProtocolError::Violation(_)));
    }
}
