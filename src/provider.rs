//! Text-generation providers.
//!
//! The orchestrator only knows [`LlmProvider`]. A provider receives the full
//! prompt plus the timeout it must honour, and returns raw text.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

/// Raw model output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub text: String,
}

impl ProviderResponse {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderFailure {
    #[error("provider timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),
    #[error("{0}")]
    Failed(String),
}

pub trait LlmProvider: Send + Sync {
    /// Produce a completion for `prompt`, giving up after `timeout`.
    fn generate(&self, prompt: &str, timeout: Duration) -> Result<ProviderResponse, ProviderFailure>;

    fn name(&self) -> &str;
}

/// Returns the same text for every prompt. Used for replaying a saved
/// response and in tests.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    text: String,
}

impl StaticProvider {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl LlmProvider for StaticProvider {
    fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<ProviderResponse, ProviderFailure> {
        Ok(ProviderResponse::new(self.text.clone()))
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Runs an external command, writing the prompt to its stdin and reading the
/// response from its stdout. The child is killed when the timeout expires.
#[derive(Debug, Clone)]
pub struct CommandProvider {
    program: String,
    args: Vec<String>,
}

const POLL_INTERVAL: Duration = Duration::from_millis(10);

impl CommandProvider {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

impl LlmProvider for CommandProvider {
    fn generate(&self, prompt: &str, timeout: Duration) -> Result<ProviderResponse, ProviderFailure> {
        let started = Instant::now();
        debug!(program = %self.program, "spawning provider command");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ProviderFailure::Failed(format!("failed to start '{}': {e}", self.program)))?;

        // Stdin and both output pipes are serviced off-thread while polling
        let stdin = child.stdin.take();
        let input = prompt.to_string();
        thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(input.as_bytes());
            }
        });
        let stdout_rx = drain(child.stdout.take());
        let stderr_rx = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= timeout => {
                    warn!(program = %self.program, ?timeout, "provider command timed out");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ProviderFailure::Timeout(timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(ProviderFailure::Failed(e.to_string())),
            }
        };

        // A grandchild can keep the pipes open after the child exits
        let remaining = || timeout.saturating_sub(started.elapsed());
        let stdout = collect(&stdout_rx, remaining(), timeout)?;
        if !status.success() {
            let stderr = collect(&stderr_rx, remaining(), timeout)?;
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(ProviderFailure::Failed(format!(
                "'{}' exited with {status}: {}",
                self.program,
                stderr.trim()
            )));
        }

        let text = String::from_utf8(stdout)
            .map_err(|_| ProviderFailure::Failed("provider output is not valid UTF-8".to_string()))?;
        debug!(elapsed = ?started.elapsed(), bytes = text.len(), "provider command finished");
        Ok(ProviderResponse { text })
    }

    fn name(&self) -> &str {
        &self.program
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> mpsc::Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn collect(
    rx: &mpsc::Receiver<Vec<u8>>,
    wait: Duration,
    timeout: Duration,
) -> Result<Vec<u8>, ProviderFailure> {
    match rx.recv_timeout(wait) {
        Ok(buf) => Ok(buf),
        Err(RecvTimeoutError::Timeout) => Err(ProviderFailure::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Ok(Vec::new()),
    }
}
