use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("cannot reach tool host '{endpoint}': {message}")]
    Connection { endpoint: String, message: String },
    #[error("tool host '{endpoint}' rejected the credentials (HTTP {status})")]
    Auth { endpoint: String, status: u16 },
    #[error("I/O error on transport '{endpoint}': {message}")]
    Io { endpoint: String, message: String },
    #[error("transport '{endpoint}' is closed")]
    Closed { endpoint: String },
    #[error("request '{method}' timed out after {}ms", .after.as_millis())]
    Timeout { method: String, after: Duration },
    #[error("connection lost while request '{method}' was pending")]
    ConnectionLost { method: String },
    #[error("tool '{tool}' is not offered by the tool host")]
    UnknownTool { tool: String },
    #[error("tool '{tool}' requires parameter '{parameter}'")]
    MissingParameter { tool: String, parameter: String },
    #[error("protocol violation: {0}")]
    Violation(String),
    #[error("tool host returned JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("tool catalogue has not been fetched for this session")]
    ToolsNotListed,
}

impl ProtocolError {
    pub fn connection(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn io(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Io {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn closed(endpoint: impl Into<String>) -> Self {
        Self::Closed {
            endpoint: endpoint.into(),
        }
    }

    /// Errors that a fresh transport may cure. Client-detectable mistakes are
    /// never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProtocolError::Connection { .. }
                | ProtocolError::Io { .. }
                | ProtocolError::Closed { .. }
                | ProtocolError::Timeout { .. }
                | ProtocolError::ConnectionLost { .. }
                | ProtocolError::Violation(_)
        )
    }
}
