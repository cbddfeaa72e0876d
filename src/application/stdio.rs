//! Line-oriented front end: one request per line in, one JSON object per
//! request out.

use crate::application::ai::{LlmNavigationModel, NavigationModel, RuleBasedModel};
use crate::application::orchestrator::{FailureKind, NavigationError, Orchestrator, Resolution};
use crate::application::tooling::ConfiguredConnector;
use crate::config::{AiConfig, NavigatorConfig};
use crate::infrastructure::model::{ModelError, OpenAIClient};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StdioError {
    #[error("stdin/stdout I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize stdio response: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cannot create the chat model client: {0}")]
    Model(#[from] ModelError),
    #[error("cannot create the navigator: {0}")]
    Navigation(#[from] NavigationError),
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NavigationReply {
    Resolved(Resolution),
    Failed {
        kind: FailureKind,
        cause: String,
        message: String,
    },
    Reset,
}

impl NavigationReply {
    pub fn from_outcome(outcome: Result<Resolution, NavigationError>) -> Self {
        match outcome {
            Ok(resolution) => NavigationReply::Resolved(resolution),
            Err(err) => NavigationReply::Failed {
                kind: err.kind(),
                cause: err.to_string(),
                message: err.user_message(),
            },
        }
    }
}

/// Wires the configured model and tool host into an orchestrator.
pub fn build_orchestrator(config: &NavigatorConfig) -> Result<Orchestrator, StdioError> {
    let model: Arc<dyn NavigationModel> = match &config.ai {
        AiConfig::OpenAi(settings) => {
            let client = OpenAIClient::from_settings(settings)?;
            let model = client.model().to_string();
            Arc::new(LlmNavigationModel::new(client, model))
        }
        AiConfig::RuleBased => Arc::new(RuleBasedModel::new()),
    };
    let connector = ConfiguredConnector::new(config.transport.clone(), config.timing);
    let orchestrator = Orchestrator::new(model, config.navigation.clone())?
        .with_connector(Arc::new(connector));
    Ok(orchestrator)
}

/// Resolves a single request and prints the reply to stdout.
pub async fn run_once(orchestrator: &mut Orchestrator, prompt: &str) -> Result<(), StdioError> {
    let reply = NavigationReply::from_outcome(orchestrator.navigate(prompt).await);
    write_reply(&mut io::stdout(), &reply).await
}

/// Interactive loop over the process stdin and stdout.
pub async fn run(orchestrator: &mut Orchestrator) -> Result<(), StdioError> {
    info!("reading navigation requests from stdin; 'reset' clears context, 'exit' quits");
    serve(orchestrator, BufReader::new(io::stdin()), io::stdout()).await
}

pub async fn serve<R, W>(
    orchestrator: &mut Orchestrator,
    reader: R,
    mut writer: W,
) -> Result<(), StdioError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("received stdin line");
        let reply = match line.to_lowercase().as_str() {
            "exit" | "quit" => break,
            "reset" => {
                orchestrator.reset();
                NavigationReply::Reset
            }
            _ => NavigationReply::from_outcome(orchestrator.navigate(line).await),
        };
        write_reply(&mut writer, &reply).await?;
    }
    writer.flush().await?;
    Ok(())
}

async fn write_reply<W>(writer: &mut W, reply: &NavigationReply) -> Result<(), StdioError>
where
    W: AsyncWrite + Unpin,
{
    let mut payload = serde_json::to_vec(reply)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NavigatorConfig;
    use serde_json::Value;
    use std::collections::HashMap;

    fn mock_config() -> NavigatorConfig {
        let env: HashMap<&str, &str> = HashMap::new();
        NavigatorConfig::from_lookup(|key| env.get(key).map(|value| value.to_string()))
            .expect("defaults")
    }

    fn replies(output: &[u8]) -> Vec<Value> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect()
    }

    #[tokio::test]
    async fn loop_answers_each_line_and_stops_on_exit() {
        let mut orchestrator = build_orchestrator(&mock_config()).expect("orchestrator");
        let input = "今天天气怎么样\n\n从北京到上海\nreset\nexit\n从广州到深圳\n";
        let mut output = Vec::new();
        serve(&mut orchestrator, input.as_bytes(), &mut output)
            .await
            .expect("loop");

        let replies = replies(&output);
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0]["status"], "failed");
        assert_eq!(replies[0]["kind"], "incomplete_intent");
        assert_eq!(replies[1]["status"], "resolved");
        assert_eq!(replies[1]["origin"]["name"], "北京");
        assert_eq!(replies[1]["preference"], "fastest");
        assert!(replies[1]["url"].as_str().expect("url").contains("uri.amap.com"));
        assert_eq!(replies[2]["status"], "reset");
        assert!(orchestrator.context().is_empty());
    }

    #[test]
    fn failed_reply_carries_kind_and_cause() {
        let reply = NavigationReply::from_outcome(Err(NavigationError::NoGeocoder));
        let json = serde_json::to_value(&reply).expect("serialize");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "unknown_tool");
        assert_eq!(json["cause"], "the tool host offers no geocoding tool");
    }
}
