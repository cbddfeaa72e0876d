use super::Transport;
use crate::application::tooling::error::ProtocolError;
use crate::config::PipeServerConfig;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{debug, info, warn};

/// Child process speaking newline-delimited JSON over stdin/stdout.
pub struct PipeTransport {
    server: PipeServerConfig,
    grace: Duration,
    child: AsyncMutex<Option<Child>>,
    writer: AsyncMutex<Option<BufWriter<ChildStdin>>>,
    reader: AsyncMutex<Option<Lines<BufReader<ChildStdout>>>>,
    closed: watch::Sender<bool>,
}

impl PipeTransport {
    pub fn new(server: PipeServerConfig, grace: Duration) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            server,
            grace,
            child: AsyncMutex::new(None),
            writer: AsyncMutex::new(None),
            reader: AsyncMutex::new(None),
            closed,
        }
    }

    fn io_error(&self, source: impl ToString) -> ProtocolError {
        ProtocolError::io(&self.server.name, source)
    }
}

#[async_trait]
impl Transport for PipeTransport {
    fn endpoint(&self) -> &str {
        &self.server.name
    }

    async fn connect(&self) -> Result<(), ProtocolError> {
        if *self.closed.borrow() {
            return Err(ProtocolError::connection(
                &self.server.name,
                "transport was closed; open a new one",
            ));
        }
        let mut state = self.child.lock().await;
        if state.is_some() {
            return Ok(());
        }

        let mut command = Command::new(&self.server.command);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.server.workdir {
            command.current_dir(dir);
        }
        if !self.server.args.is_empty() {
            command.args(&self.server.args);
        }
        for (key, value) in &self.server.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|source| ProtocolError::connection(&self.server.name, source))?;
        let stdin = child.stdin.take().ok_or_else(|| {
            ProtocolError::connection(&self.server.name, "failed to capture child stdin")
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            ProtocolError::connection(&self.server.name, "failed to capture child stdout")
        })?;

        *self.writer.lock().await = Some(BufWriter::new(stdin));
        *self.reader.lock().await = Some(BufReader::new(stdout).lines());
        info!(
            endpoint = %self.server.name,
            pid = child.id().unwrap_or_default(),
            "spawned tool host process"
        );
        *state = Some(child);
        Ok(())
    }

    async fn send(&self, frame: &str) -> Result<(), ProtocolError> {
        let mut writer = self.writer.lock().await;
        let stream = writer
            .as_mut()
            .ok_or_else(|| ProtocolError::closed(&self.server.name))?;
        stream
            .write_all(frame.as_bytes())
            .await
            .map_err(|source| self.io_error(source))?;
        stream
            .write_all(b"\n")
            .await
            .map_err(|source| self.io_error(source))?;
        stream.flush().await.map_err(|source| self.io_error(source))
    }

    async fn receive(&self) -> Result<String, ProtocolError> {
        let mut closed = self.closed.subscribe();
        let mut reader = self.reader.lock().await;
        let lines = reader
            .as_mut()
            .ok_or_else(|| ProtocolError::closed(&self.server.name))?;

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line.map_err(|source| self.io_error(source))?,
                _ = closed.wait_for(|closed| *closed) => {
                    return Err(ProtocolError::closed(&self.server.name));
                }
            };
            let Some(raw) = line else {
                debug!(endpoint = %self.server.name, "tool host closed stdout");
                return Err(ProtocolError::closed(&self.server.name));
            };
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('\u{1b}') {
                debug!(
                    endpoint = %self.server.name,
                    line = trimmed,
                    "skipping ANSI log line from tool host"
                );
                continue;
            }
            return Ok(trimmed.to_string());
        }
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        // Dropping stdin is the polite shutdown signal for stdio servers.
        self.writer.lock().await.take();

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        match tokio::time::timeout(self.grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(endpoint = %self.server.name, %status, "tool host exited");
            }
            Ok(Err(err)) => {
                warn!(endpoint = %self.server.name, %err, "failed to wait for tool host");
            }
            Err(_) => {
                warn!(
                    endpoint = %self.server.name,
                    grace_ms = self.grace.as_millis() as u64,
                    "tool host did not exit within grace period; killing"
                );
                if let Err(err) = child.kill().await {
                    debug!(
                        endpoint = %self.server.name,
                        %err,
                        "failed to kill tool host (may have already exited)"
                    );
                }
            }
        }
        self.reader.lock().await.take();
    }
}
