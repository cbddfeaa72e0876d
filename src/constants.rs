//! Application constants
//!
//! Single source of truth for defaults shared across layers.

/// Default environment file path
pub const ENV_PATH: &str = ".env";

/// MCP revision spoken during the initialize handshake
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

pub const CLIENT_NAME: &str = env!("CARGO_PKG_NAME");

pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_CLOSE_GRACE_MS: u64 = 2000;

pub const DEFAULT_MAX_CONTEXT_TURNS: usize = 10;

/// `name,longitude,latitude` used when no origin is stated.
pub const DEFAULT_ORIGIN: &str = "北京市,116.4074,39.9042";

pub const DEFAULT_CURRENT_LOCATION_KEYWORDS: &[&str] =
    &["当前位置", "我的位置", "current location", "这里", "此地"];

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_API_KEY_HEADER: &str = "X-API-Key";

pub const NAVIGATION_BASE_URL: &str = "https://uri.amap.com/navigation";
pub const NAVIGATION_SOURCE: &str = "amap-navigator";
