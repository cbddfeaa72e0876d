use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Tool host started as a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeServerConfig {
    pub name: String,
    pub command: PathBuf,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub workdir: Option<PathBuf>,
}

impl PipeServerConfig {
    /// Builds a config with `${VAR}` and `~` expanded in the command, args and
    /// working directory.
    pub fn new(command: &str, args: impl IntoIterator<Item = String>) -> Self {
        let command = expand(command);
        let name = PathBuf::from(&command)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| command.clone());
        Self {
            name,
            command: PathBuf::from(command),
            args: args.into_iter().map(|arg| expand(&arg)).collect(),
            env: HashMap::new(),
            workdir: None,
        }
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_workdir(mut self, dir: &str) -> Self {
        self.workdir = Some(PathBuf::from(expand(dir)));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    ApiKey { header: String },
}

/// Tool host reached over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamServerConfig {
    pub url: String,
    pub token: Option<String>,
    pub auth: AuthScheme,
    pub connect_timeout: Duration,
    /// Upper bound for one POST, response body included.
    pub request_timeout: Duration,
}

fn expand(raw: &str) -> String {
    shellexpand::full(raw)
        .map(|cow| cow.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
