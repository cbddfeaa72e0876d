use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "amap-navigator",
    version,
    about = "Natural-language driving navigation through an AMAP MCP tool host"
)]
pub struct Cli {
    /// Environment file to load instead of ./.env
    #[arg(long)]
    pub env_file: Option<PathBuf>,
    /// Use the built-in tool host and the rule-based model
    #[arg(long)]
    pub mock: bool,
    /// Request to resolve; without it requests are read from stdin
    pub prompt: Vec<String>,
}

impl Cli {
    pub fn prompt(&self) -> Option<String> {
        let prompt = self.prompt.join(" ");
        let prompt = prompt.trim();
        (!prompt.is_empty()).then(|| prompt.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_prompt_words() {
        let cli = Cli::parse_from(["amap-navigator", "--mock", "从北京", "到上海"]);
        assert!(cli.mock);
        assert_eq!(cli.prompt().as_deref(), Some("从北京 到上海"));

        let cli = Cli::parse_from(["amap-navigator", "--env-file", "nav.env"]);
        assert_eq!(cli.env_file, Some(PathBuf::from("nav.env")));
        assert_eq!(cli.prompt(), None);
    }
}
