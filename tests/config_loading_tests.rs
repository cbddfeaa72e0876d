// Config loading tests - environment files and the process environment
//
// These touch process-wide state and therefore run serially.

use amap_navigator::config::{
    AiConfig, AuthScheme, ConfigError, NavigatorConfig, TransportConfig, load_env_file,
};
use serial_test::serial;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;

const KEYS: &[&str] = &[
    "MCP_TRANSPORT",
    "AMAP_MCP_SERVER_URL",
    "AMAP_MCP_SERVER_PATH",
    "MCP_AUTH_TOKEN",
    "MCP_AUTH_SCHEME",
    "MCP_CALL_TIMEOUT_SECS",
    "NAV_MAX_CONTEXT_TURNS",
    "AI_PROVIDER",
    "OPENAI_API_KEY",
    "OPENAI_MODEL",
];

fn clear_env() {
    for key in KEYS {
        unsafe { env::remove_var(key) };
    }
}

fn write_env(dir: &Path, content: &str) -> std::path::PathBuf {
    let path = dir.join("navigator.env");
    fs::write(&path, content).expect("Failed to write env file");
    path
}

#[test]
#[serial]
fn returns_error_when_env_file_not_found() {
    let result = load_env_file(Path::new("/nonexistent/path/navigator.env"));
    assert!(matches!(result, Err(ConfigError::NotFound { .. })));
}

#[test]
#[serial]
fn returns_error_for_malformed_env_file() {
    let dir = tempdir().expect("tempdir");
    let path = write_env(dir.path(), "THIS LINE IS NOT AN ASSIGNMENT\n");
    let result = load_env_file(&path);
    assert!(matches!(result, Err(ConfigError::EnvFile { .. })));
}

#[test]
#[serial]
fn env_file_configures_streamed_transport_and_openai() {
    clear_env();
    let dir = tempdir().expect("tempdir");
    let path = write_env(
        dir.path(),
        r#"
AMAP_MCP_SERVER_URL=https://mcp.amap.com/sse?key=demo
MCP_AUTH_TOKEN=secret-token-123456
MCP_CALL_TIMEOUT_SECS=12
NAV_MAX_CONTEXT_TURNS=4
OPENAI_API_KEY=sk-test-abcdefgh12345678
OPENAI_MODEL=gpt-4o-mini
"#,
    );
    load_env_file(&path).expect("env file loads");

    let config = NavigatorConfig::from_env().expect("config");
    match &config.transport {
        TransportConfig::Sse(server) => {
            assert_eq!(server.url, "https://mcp.amap.com/sse?key=demo");
            assert_eq!(server.token.as_deref(), Some("secret-token-123456"));
            assert_eq!(server.auth, AuthScheme::Bearer);
        }
        other => panic!("expected sse transport, got {other:?}"),
    }
    assert_eq!(config.timing.call_timeout, Duration::from_secs(12));
    assert_eq!(config.navigation.max_context_turns, 4);
    match &config.ai {
        AiConfig::OpenAi(settings) => assert_eq!(settings.model, "gpt-4o-mini"),
        other => panic!("expected openai, got {other:?}"),
    }

    let summary = config.summary();
    assert!(summary.contains("transport=sse"));
    assert!(!summary.contains("secret-token-123456"));
    assert!(!summary.contains("sk-test-abcdefgh12345678"));

    let forced = config.force_mock();
    assert!(forced.transport.is_mock());
    assert_eq!(forced.ai, AiConfig::RuleBased);
    clear_env();
}

#[test]
#[serial]
fn process_environment_wins_over_env_file() {
    clear_env();
    unsafe { env::set_var("MCP_TRANSPORT", "mock") };
    let dir = tempdir().expect("tempdir");
    let path = write_env(
        dir.path(),
        "MCP_TRANSPORT=pipe\nAMAP_MCP_SERVER_PATH=/usr/local/bin/amap-mcp\n",
    );
    load_env_file(&path).expect("env file loads");

    let config = NavigatorConfig::from_env().expect("config");
    assert_eq!(config.transport, TransportConfig::Mock);
    clear_env();
}

#[test]
#[serial]
fn invalid_values_are_reported_with_their_key() {
    clear_env();
    unsafe { env::set_var("MCP_CALL_TIMEOUT_SECS", "soon") };
    let err = NavigatorConfig::from_env().unwrap_err();
    assert!(matches!(
        err,
        ConfigError::InvalidValue {
            key: "MCP_CALL_TIMEOUT_SECS",
            ..
        }
    ));
    clear_env();
}
