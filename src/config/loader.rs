use super::error::ConfigError;
use super::server::{AuthScheme, PipeServerConfig, StreamServerConfig};
use super::{
    AiConfig, NavigationSettings, NavigatorConfig, OpenAiSettings, SessionTiming, TransportConfig,
};
use crate::constants::*;
use crate::domain::{Coordinate, LocationRef};
use dotenvy::from_filename;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;
use tracing::debug;

static ENV_LOADER: Once = Once::new();

/// Loads `.env` from the working directory once, if present. Variables that
/// are already set win.
pub fn ensure_env_loaded() {
    ENV_LOADER.call_once(|| {
        if let Ok(path) = from_filename(ENV_PATH) {
            debug!(path = %path.display(), "loaded environment file");
        }
    });
}

/// Loads an explicitly requested environment file; a missing file is an error.
pub fn load_env_file(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    dotenvy::from_path(path).map_err(|source| ConfigError::EnvFile {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), "loaded environment file");
    Ok(())
}

pub(super) fn from_lookup<F>(lookup: F) -> Result<NavigatorConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let timing = SessionTiming {
        call_timeout: Duration::from_secs(parse_number(
            &get,
            "MCP_CALL_TIMEOUT_SECS",
            DEFAULT_CALL_TIMEOUT_SECS,
        )?),
        connect_timeout: Duration::from_secs(parse_number(
            &get,
            "MCP_CONNECT_TIMEOUT_SECS",
            DEFAULT_CONNECT_TIMEOUT_SECS,
        )?),
        close_grace: Duration::from_millis(parse_number(
            &get,
            "MCP_CLOSE_GRACE_MS",
            DEFAULT_CLOSE_GRACE_MS,
        )?),
    };
    if timing.call_timeout.is_zero() {
        return Err(ConfigError::invalid(
            "MCP_CALL_TIMEOUT_SECS",
            "0",
            "every call needs a positive deadline",
        ));
    }

    let transport = transport_config(&get, &timing)?;
    let navigation = navigation_settings(&get)?;
    let ai = ai_config(&get)?;

    Ok(NavigatorConfig {
        transport,
        timing,
        navigation,
        ai,
    })
}

fn transport_config<G>(get: &G, timing: &SessionTiming) -> Result<TransportConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let url = get("AMAP_MCP_SERVER_URL");
    let command = get("AMAP_MCP_SERVER_PATH");

    let kind = match get("MCP_TRANSPORT") {
        Some(kind) => kind.to_ascii_lowercase(),
        None => match (&url, &command) {
            (Some(url), _) if url.to_ascii_lowercase().contains("sse") => "sse".to_string(),
            (Some(_), _) => "streamable".to_string(),
            (None, Some(_)) => "pipe".to_string(),
            (None, None) => "mock".to_string(),
        },
    };

    let stream_server = |context: &'static str| -> Result<StreamServerConfig, ConfigError> {
        let url = url.clone().ok_or(ConfigError::MissingValue {
            key: "AMAP_MCP_SERVER_URL",
            context,
        })?;
        let auth = match get("MCP_AUTH_SCHEME").map(|scheme| scheme.to_ascii_lowercase()) {
            None => AuthScheme::Bearer,
            Some(scheme) if scheme == "bearer" => AuthScheme::Bearer,
            Some(scheme) if scheme == "api-key" || scheme == "apikey" => AuthScheme::ApiKey {
                header: get("MCP_API_KEY_HEADER")
                    .unwrap_or_else(|| DEFAULT_API_KEY_HEADER.to_string()),
            },
            Some(other) => {
                return Err(ConfigError::invalid(
                    "MCP_AUTH_SCHEME",
                    &other,
                    "expected 'bearer' or 'api-key'",
                ));
            }
        };
        Ok(StreamServerConfig {
            url,
            token: get("MCP_AUTH_TOKEN"),
            auth,
            connect_timeout: timing.connect_timeout,
            request_timeout: timing.call_timeout,
        })
    };

    match kind.as_str() {
        "pipe" | "stdio" => {
            let command = command.ok_or(ConfigError::MissingValue {
                key: "AMAP_MCP_SERVER_PATH",
                context: "pipe transport",
            })?;
            let args: Vec<String> = get("AMAP_MCP_SERVER_ARGS")
                .map(|args| args.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default();
            let mut server = PipeServerConfig::new(&command, args);
            if let Some(key) = get("AMAP_API_KEY") {
                server = server.with_env("AMAP_API_KEY", key);
            }
            Ok(TransportConfig::Pipe(server))
        }
        "sse" => Ok(TransportConfig::Sse(stream_server("sse transport")?)),
        "streamable" | "http" => Ok(TransportConfig::Streamable(stream_server(
            "streamable transport",
        )?)),
        "mock" => Ok(TransportConfig::Mock),
        other => Err(ConfigError::invalid(
            "MCP_TRANSPORT",
            other,
            "expected pipe, sse, streamable or mock",
        )),
    }
}

fn navigation_settings<G>(get: &G) -> Result<NavigationSettings, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let max_context_turns = parse_number(
        get,
        "NAV_MAX_CONTEXT_TURNS",
        DEFAULT_MAX_CONTEXT_TURNS as u64,
    )? as usize;
    if max_context_turns == 0 {
        return Err(ConfigError::invalid(
            "NAV_MAX_CONTEXT_TURNS",
            "0",
            "context must hold at least one turn",
        ));
    }

    let raw_origin = get("NAV_DEFAULT_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
    let default_origin = parse_origin(&raw_origin)?;

    let current_location_keywords = match get("NAV_CURRENT_LOCATION_KEYWORDS") {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|keyword| !keyword.is_empty())
            .map(str::to_string)
            .collect(),
        None => DEFAULT_CURRENT_LOCATION_KEYWORDS
            .iter()
            .map(|keyword| keyword.to_string())
            .collect(),
    };

    Ok(NavigationSettings {
        max_context_turns,
        default_origin,
        current_location_keywords,
    })
}

fn ai_config<G>(get: &G) -> Result<AiConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let api_key = get("OPENAI_API_KEY");
    let provider = get("AI_PROVIDER")
        .map(|provider| provider.to_ascii_lowercase())
        .unwrap_or_else(|| {
            if api_key.is_some() {
                "openai".to_string()
            } else {
                "mock".to_string()
            }
        });

    match provider.as_str() {
        "openai" => {
            let api_key = api_key.ok_or(ConfigError::MissingValue {
                key: "OPENAI_API_KEY",
                context: "openai provider",
            })?;
            Ok(AiConfig::OpenAi(OpenAiSettings {
                api_key,
                base_url: get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                model: get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                timeout: Duration::from_secs(DEFAULT_AI_TIMEOUT_SECS),
            }))
        }
        "mock" | "rules" | "none" => Ok(AiConfig::RuleBased),
        other => Err(ConfigError::invalid(
            "AI_PROVIDER",
            other,
            "expected 'openai' or 'mock'",
        )),
    }
}

fn parse_number<G>(get: &G, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|err| ConfigError::invalid(key, &raw, err.to_string())),
    }
}

/// Parses `name,longitude,latitude`; the name itself may contain commas.
fn parse_origin(raw: &str) -> Result<LocationRef, ConfigError> {
    let invalid = |reason: &str| ConfigError::invalid("NAV_DEFAULT_ORIGIN", raw, reason);
    let mut parts = raw.rsplitn(3, ',');
    let (Some(lat), Some(lon), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid("expected name,longitude,latitude"));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(invalid("origin name is empty"));
    }
    let lon: f64 = lon
        .trim()
        .parse()
        .map_err(|_| invalid("longitude is not a number"))?;
    let lat: f64 = lat
        .trim()
        .parse()
        .map_err(|_| invalid("latitude is not a number"))?;
    let coordinate = Coordinate::checked(lon, lat).ok_or_else(|| invalid("coordinate out of range"))?;
    Ok(LocationRef::resolved(name, coordinate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<NavigatorConfig, ConfigError> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        from_lookup(|key| values.get(key).cloned())
    }

    #[test]
    fn empty_environment_selects_mock_mode() {
        let config = config_from(&[]).expect("config");
        assert_eq!(config.transport, TransportConfig::Mock);
        assert_eq!(config.ai, AiConfig::RuleBased);
        assert_eq!(config.timing.call_timeout, Duration::from_secs(30));
        assert_eq!(config.navigation.max_context_turns, 10);
        assert_eq!(config.navigation.default_origin.name(), "北京市");
        assert!(
            config
                .navigation
                .current_location_keywords
                .iter()
                .any(|keyword| keyword == "当前位置")
        );
    }

    #[test]
    fn infers_transport_from_endpoint() {
        let sse = config_from(&[("AMAP_MCP_SERVER_URL", "https://mcp.amap.com/sse?key=k")])
            .expect("config");
        assert_eq!(sse.transport.kind(), "sse");

        let streamable = config_from(&[("AMAP_MCP_SERVER_URL", "https://mcp.amap.com/mcp")])
            .expect("config");
        assert_eq!(streamable.transport.kind(), "streamable");

        let pipe = config_from(&[
            ("AMAP_MCP_SERVER_PATH", "npx"),
            ("AMAP_MCP_SERVER_ARGS", "-y @amap/amap-maps-mcp-server"),
            ("AMAP_API_KEY", "secret"),
        ])
        .expect("config");
        let TransportConfig::Pipe(server) = pipe.transport else {
            panic!("expected pipe transport");
        };
        assert_eq!(server.args, vec!["-y", "@amap/amap-maps-mcp-server"]);
        assert_eq!(server.env.get("AMAP_API_KEY").map(String::as_str), Some("secret"));
    }

    #[test]
    fn stream_requests_are_bounded_by_the_call_deadline() {
        let config = config_from(&[
            ("AMAP_MCP_SERVER_URL", "https://mcp.amap.com/mcp"),
            ("MCP_CALL_TIMEOUT_SECS", "7"),
            ("MCP_CONNECT_TIMEOUT_SECS", "3"),
        ])
        .expect("config");
        let TransportConfig::Streamable(server) = config.transport else {
            panic!("expected streamable transport");
        };
        assert_eq!(server.request_timeout, Duration::from_secs(7));
        assert_eq!(server.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn explicit_transport_requires_its_endpoint() {
        let err = config_from(&[("MCP_TRANSPORT", "pipe")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingValue {
                key: "AMAP_MCP_SERVER_PATH",
                ..
            }
        ));
        let err = config_from(&[("MCP_TRANSPORT", "carrier-pigeon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "MCP_TRANSPORT", .. }));
    }

    #[test]
    fn api_key_scheme_uses_configured_header() {
        let config = config_from(&[
            ("AMAP_MCP_SERVER_URL", "https://example.com/mcp"),
            ("MCP_AUTH_TOKEN", "token"),
            ("MCP_AUTH_SCHEME", "api-key"),
            ("MCP_API_KEY_HEADER", "X-Amap-Key"),
        ])
        .expect("config");
        let TransportConfig::Streamable(server) = config.transport else {
            panic!("expected streamable transport");
        };
        assert_eq!(
            server.auth,
            AuthScheme::ApiKey {
                header: "X-Amap-Key".into()
            }
        );
        assert_eq!(server.token.as_deref(), Some("token"));
    }

    #[test]
    fn openai_is_inferred_from_api_key() {
        let config = config_from(&[("OPENAI_API_KEY", "sk-test")]).expect("config");
        let AiConfig::OpenAi(settings) = config.ai else {
            panic!("expected openai");
        };
        assert_eq!(settings.model, "gpt-3.5-turbo");
        assert_eq!(settings.base_url, DEFAULT_OPENAI_BASE_URL);

        let err = config_from(&[("AI_PROVIDER", "openai")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue { key: "OPENAI_API_KEY", .. }));
    }

    #[test]
    fn rejects_invalid_numbers_and_zero_capacity() {
        let err = config_from(&[("MCP_CALL_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "MCP_CALL_TIMEOUT_SECS", .. }));
        let err = config_from(&[("NAV_MAX_CONTEXT_TURNS", "0")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "NAV_MAX_CONTEXT_TURNS", .. }));
    }

    #[test]
    fn parses_default_origin_and_keywords() {
        let config = config_from(&[
            ("NAV_DEFAULT_ORIGIN", "Shanghai, Bund,121.49,31.24"),
            ("NAV_CURRENT_LOCATION_KEYWORDS", "here, 这儿 ,"),
        ])
        .expect("config");
        let origin = &config.navigation.default_origin;
        assert_eq!(origin.name(), "Shanghai, Bund");
        assert_eq!(origin.coordinate(), Coordinate::checked(121.49, 31.24));
        assert_eq!(config.navigation.current_location_keywords, vec!["here", "这儿"]);

        assert!(config_from(&[("NAV_DEFAULT_ORIGIN", "nowhere,200,10")]).is_err());
        assert!(config_from(&[("NAV_DEFAULT_ORIGIN", "116.4,39.9")]).is_err());
    }
}
