use crate::application::context::ContextError;
use crate::application::tooling::ProtocolError;
use crate::infrastructure::navigation_url::UrlError;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Failure taxonomy reported for every request that does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Connection,
    Auth,
    Timeout,
    ConnectionLost,
    UnknownTool,
    MissingParameter,
    IncompleteIntent,
    Interpretation,
    ProtocolViolation,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Connection => "connection",
            FailureKind::Auth => "auth",
            FailureKind::Timeout => "timeout",
            FailureKind::ConnectionLost => "connection_lost",
            FailureKind::UnknownTool => "unknown_tool",
            FailureKind::MissingParameter => "missing_parameter",
            FailureKind::IncompleteIntent => "incomplete_intent",
            FailureKind::Interpretation => "interpretation",
            FailureKind::ProtocolViolation => "protocol_violation",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum NavigationError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("no tool host is configured")]
    NoToolHost,
    #[error("incomplete navigation request: {0}")]
    IncompleteIntent(String),
    #[error("the tool host offers no geocoding tool")]
    NoGeocoder,
    #[error("cannot read a coordinate for '{place}' from tool '{tool}': {reason}")]
    Interpretation {
        place: String,
        tool: String,
        reason: String,
    },
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Url(#[from] UrlError),
}

impl NavigationError {
    pub fn incomplete(reason: impl Into<String>) -> Self {
        Self::IncompleteIntent(reason.into())
    }

    pub fn interpretation(
        place: impl Into<String>,
        tool: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Interpretation {
            place: place.into(),
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            NavigationError::Protocol(err) => protocol_kind(err),
            NavigationError::NoToolHost => FailureKind::Connection,
            NavigationError::IncompleteIntent(_) | NavigationError::Context(_) => {
                FailureKind::IncompleteIntent
            }
            NavigationError::NoGeocoder => FailureKind::UnknownTool,
            NavigationError::Interpretation { .. } | NavigationError::Url(_) => {
                FailureKind::Interpretation
            }
        }
    }

    /// Cause rendered for the person at the keyboard.
    pub fn user_message(&self) -> String {
        match self {
            NavigationError::Protocol(err) => match err {
                ProtocolError::Connection { endpoint, .. } => {
                    format!("无法连接到地图服务 '{endpoint}'。")
                }
                ProtocolError::Auth { endpoint, .. } => {
                    format!("地图服务 '{endpoint}' 拒绝了访问凭证，请检查 MCP_AUTH_TOKEN。")
                }
                ProtocolError::Timeout { method, .. } => {
                    format!("地图服务响应超时（{method}），请稍后再试。")
                }
                ProtocolError::ConnectionLost { .. }
                | ProtocolError::Closed { .. }
                | ProtocolError::Io { .. } => "与地图服务的连接已断开。".to_string(),
                ProtocolError::UnknownTool { tool } => {
                    format!("地图服务没有提供工具 \"{tool}\"。")
                }
                ProtocolError::MissingParameter { tool, parameter } => {
                    format!("工具 \"{tool}\" 缺少参数 \"{parameter}\"。")
                }
                ProtocolError::Violation(_)
                | ProtocolError::Rpc { .. }
                | ProtocolError::ToolsNotListed => "地图服务返回了无法理解的响应。".to_string(),
            },
            NavigationError::NoToolHost => "没有配置地图服务。".to_string(),
            NavigationError::IncompleteIntent(_) | NavigationError::Context(_) => {
                "没有识别出目的地，请说明要去哪里，例如“从北京到上海”。".to_string()
            }
            NavigationError::NoGeocoder => "地图服务没有提供地点查询工具。".to_string(),
            NavigationError::Interpretation { place, .. } => {
                format!("无法确定“{place}”的位置，请换一个更具体的地名。")
            }
            NavigationError::Url(_) => "无法生成导航链接。".to_string(),
        }
    }
}

fn protocol_kind(err: &ProtocolError) -> FailureKind {
    match err {
        ProtocolError::Connection { .. } => FailureKind::Connection,
        ProtocolError::Auth { .. } => FailureKind::Auth,
        ProtocolError::Timeout { .. } => FailureKind::Timeout,
        ProtocolError::ConnectionLost { .. }
        | ProtocolError::Closed { .. }
        | ProtocolError::Io { .. } => FailureKind::ConnectionLost,
        ProtocolError::UnknownTool { .. } => FailureKind::UnknownTool,
        ProtocolError::MissingParameter { .. } => FailureKind::MissingParameter,
        ProtocolError::Violation(_) | ProtocolError::Rpc { .. } | ProtocolError::ToolsNotListed => {
            FailureKind::ProtocolViolation
        }
    }
}
