//! JSON-RPC 2.0 framing for the tool host protocol.

use super::error::ProtocolError;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value, json};
use std::fmt;

pub const JSONRPC_VERSION: &str = "2.0";
pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    Text(String),
}

impl RequestId {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(num) => num.as_u64().map(RequestId::Number),
            Value::String(text) => Some(RequestId::Text(text.clone())),
            _ => None,
        }
    }

    fn to_value(&self) -> Value {
        match self {
            RequestId::Number(num) => Value::from(*num),
            RequestId::Text(text) => Value::String(text.clone()),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(num) => write!(f, "{num}"),
            RequestId::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    Notification {
        method: String,
        params: Option<Value>,
    },
    Response {
        id: RequestId,
        outcome: Result<Value, RpcError>,
    },
}

impl Message {
    pub fn request(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Request {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Message::Notification {
            method: method.into(),
            params,
        }
    }

    pub fn result(id: RequestId, result: Value) -> Self {
        Message::Response {
            id,
            outcome: Ok(result),
        }
    }

    pub fn error(id: RequestId, code: i64, message: impl Into<String>) -> Self {
        Message::Response {
            id,
            outcome: Err(RpcError {
                code,
                message: message.into(),
            }),
        }
    }

    pub fn encode(&self) -> String {
        let mut payload = JsonMap::new();
        payload.insert("jsonrpc".into(), Value::from(JSONRPC_VERSION));
        match self {
            Message::Request { id, method, params } => {
                payload.insert("id".into(), id.to_value());
                payload.insert("method".into(), Value::String(method.clone()));
                if let Some(params) = params {
                    payload.insert("params".into(), params.clone());
                }
            }
            Message::Notification { method, params } => {
                payload.insert("method".into(), Value::String(method.clone()));
                if let Some(params) = params {
                    payload.insert("params".into(), params.clone());
                }
            }
            Message::Response { id, outcome } => {
                payload.insert("id".into(), id.to_value());
                match outcome {
                    Ok(result) => {
                        payload.insert("result".into(), result.clone());
                    }
                    Err(error) => {
                        payload.insert(
                            "error".into(),
                            json!({ "code": error.code, "message": error.message }),
                        );
                    }
                }
            }
        }
        Value::Object(payload).to_string()
    }

    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(frame.trim())
            .map_err(|source| ProtocolError::Violation(format!("invalid JSON frame: {source}")))?;
        let Value::Object(map) = value else {
            return Err(ProtocolError::Violation(
                "frame is not a JSON object".into(),
            ));
        };

        let id = map.get("id").filter(|value| !value.is_null());
        if let Some(method) = map.get("method") {
            let method = method
                .as_str()
                .ok_or_else(|| ProtocolError::Violation("method is not a string".into()))?
                .to_string();
            let params = map.get("params").cloned();
            return match id {
                Some(raw) => {
                    let id = RequestId::from_value(raw).ok_or_else(|| {
                        ProtocolError::Violation(format!("unsupported request id {raw}"))
                    })?;
                    Ok(Message::Request { id, method, params })
                }
                None => Ok(Message::Notification { method, params }),
            };
        }

        let raw_id = id.ok_or_else(|| {
            ProtocolError::Violation("response without a usable id".into())
        })?;
        let id = RequestId::from_value(raw_id)
            .ok_or_else(|| ProtocolError::Violation(format!("unsupported response id {raw_id}")))?;

        if let Some(error) = map.get("error") {
            let code = error
                .get("code")
                .and_then(Value::as_i64)
                .unwrap_or(-32000);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Ok(Message::Response {
                id,
                outcome: Err(RpcError { code, message }),
            });
        }

        match map.get("result") {
            Some(result) => Ok(Message::Response {
                id,
                outcome: Ok(result.clone()),
            }),
            None => Err(ProtocolError::Violation(format!(
                "response {id} carries neither result nor error"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_requests_with_jsonrpc_envelope() {
        let frame = Message::request(
            RequestId::Number(7),
            "tools/call",
            Some(json!({"name": "maps_geo"})),
        )
        .encode();
        let value: Value = serde_json::from_str(&frame).expect("valid json");
        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "tools/call");
        assert_eq!(value["params"]["name"], "maps_geo");
    }

    #[test]
    fn decodes_error_responses() {
        let message =
            Message::decode(r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32602,"message":"bad"}}"#)
                .expect("decodes");
        assert_eq!(
            message,
            Message::Response {
                id: RequestId::Number(3),
                outcome: Err(RpcError {
                    code: -32602,
                    message: "bad".into()
                }),
            }
        );
    }

    #[test]
    fn distinguishes_server_requests_from_notifications() {
        let ping = Message::decode(r#"{"jsonrpc":"2.0","id":"srv-1","method":"ping"}"#)
            .expect("decodes");
        assert!(matches!(ping, Message::Request { id: RequestId::Text(ref id), .. } if id == "srv-1"));

        let note = Message::decode(r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#)
            .expect("decodes");
        assert!(matches!(note, Message::Notification { .. }));
    }

    #[test]
    fn malformed_frames_are_violations() {
        for frame in [
            "not json",
            "[1,2,3]",
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"2.0","result":{}}"#,
        ] {
            assert!(
                matches!(Message::decode(frame), Err(ProtocolError::Violation(_))),
                "frame {frame} should be rejected"
            );
        }
    }
}
