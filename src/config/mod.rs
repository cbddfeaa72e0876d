pub mod error;
pub mod loader;
pub mod server;

use crate::domain::LocationRef;
use std::time::Duration;

pub use error::ConfigError;
pub use loader::{ensure_env_loaded, load_env_file};
pub use server::{AuthScheme, PipeServerConfig, StreamServerConfig};

/// Which tool host the navigator talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportConfig {
    Pipe(PipeServerConfig),
    Sse(StreamServerConfig),
    Streamable(StreamServerConfig),
    Mock,
}

impl TransportConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            TransportConfig::Pipe(_) => "pipe",
            TransportConfig::Sse(_) => "sse",
            TransportConfig::Streamable(_) => "streamable",
            TransportConfig::Mock => "mock",
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, TransportConfig::Mock)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub call_timeout: Duration,
    pub connect_timeout: Duration,
    pub close_grace: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiConfig {
    OpenAi(OpenAiSettings),
    RuleBased,
}

impl AiConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            AiConfig::OpenAi(_) => "openai",
            AiConfig::RuleBased => "mock",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NavigationSettings {
    pub max_context_turns: usize,
    pub default_origin: LocationRef,
    pub current_location_keywords: Vec<String>,
}

/// Everything the navigator needs, resolved once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigatorConfig {
    pub transport: TransportConfig,
    pub timing: SessionTiming,
    pub navigation: NavigationSettings,
    pub ai: AiConfig,
}

impl NavigatorConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        loader::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        loader::from_lookup(lookup)
    }

    /// Switches to the offline tool host and the rule-based model.
    pub fn force_mock(mut self) -> Self {
        self.transport = TransportConfig::Mock;
        self.ai = AiConfig::RuleBased;
        self
    }

    /// One-line description with credentials masked, suitable for logs.
    pub fn summary(&self) -> String {
        let endpoint = match &self.transport {
            TransportConfig::Pipe(server) => server.command.display().to_string(),
            TransportConfig::Sse(server) | TransportConfig::Streamable(server) => {
                format!("{} (token {})", server.url, mask(server.token.as_deref()))
            }
            TransportConfig::Mock => "built-in".to_string(),
        };
        let ai = match &self.ai {
            AiConfig::OpenAi(settings) => format!(
                "openai model={} base={} key={}",
                settings.model,
                settings.base_url,
                mask(Some(&settings.api_key))
            ),
            AiConfig::RuleBased => "rule-based".to_string(),
        };
        format!(
            "transport={} endpoint={} ai={} call_timeout={}s max_turns={}",
            self.transport.kind(),
            endpoint,
            ai,
            self.timing.call_timeout.as_secs(),
            self.navigation.max_context_turns
        )
    }
}

fn mask(value: Option<&str>) -> String {
    match value {
        None | Some("") => "not set".to_string(),
        Some(value) if value.chars().count() <= 8 => "***".to_string(),
        Some(value) => {
            let chars: Vec<char> = value.chars().collect();
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{head}...{tail}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_credentials() {
        assert_eq!(mask(None), "not set");
        assert_eq!(mask(Some("short")), "***");
        assert_eq!(mask(Some("sk-1234567890abcd")), "sk-1...abcd");
    }
}
