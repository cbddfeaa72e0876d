pub mod application;
pub mod cli;
pub mod config;
pub mod constants;
pub mod domain;
pub mod infrastructure;

pub use application::{ai, context, orchestrator, stdio, tooling};
pub use cli::Cli;
pub use config::NavigatorConfig;
pub use infrastructure::{model, navigation_url};

use std::error::Error;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt};

pub async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    init_tracing();
    debug!(?cli, "CLI arguments parsed");

    match &cli.env_file {
        Some(path) => config::load_env_file(path)?,
        None => config::ensure_env_loaded(),
    }
    let mut navigator_config = NavigatorConfig::from_env()?;
    if cli.mock {
        navigator_config = navigator_config.force_mock();
    }
    info!(config = %navigator_config.summary(), "configuration loaded");

    let mut orchestrator = stdio::build_orchestrator(&navigator_config)?;
    let outcome = match cli.prompt() {
        Some(prompt) => stdio::run_once(&mut orchestrator, &prompt).await,
        None => stdio::run(&mut orchestrator).await,
    };
    orchestrator.shutdown().await;
    outcome?;
    info!("navigator finished");
    Ok(())
}

/// Logs go to stderr so stdout carries only replies.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_level(true)
            .init();
    });
}
