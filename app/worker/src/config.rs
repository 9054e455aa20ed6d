//! Worker configuration loaded from TOML, with environment overrides.

use anyhow::{Context, Result, bail, ensure};
use exec::ExecConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Overrides `connection.url`.
pub const ENV_URL: &str = "TASKER_URL";
/// Overrides `exec.output_cap`.
pub const ENV_OUTPUT_CAP: &str = "TASKER_OUTPUT_CAP";
/// Overrides `staging.path`.
pub const ENV_STAGING_PATH: &str = "TASKER_STAGING_PATH";

/// Room reserved in every result message for the envelope itself: map
/// header, field names, task id and the output's length prefix.
pub const RESULT_ENVELOPE_HEADROOM: usize = 4096;

/// Top-level worker configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Coordinator connection.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Command execution.
    #[serde(default)]
    pub exec: ExecSettings,
    /// Upload staging.
    #[serde(default)]
    pub staging: StagingConfig,
}

/// Coordinator connection configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Coordinator address: `ws://`, `unix://` or `tcp://`.
    pub url: String,
    /// Largest inbound or outbound message, in bytes.
    pub max_message_size: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/websocket".to_owned(),
            max_message_size: protocol::frame::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

/// Command execution configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecSettings {
    /// Shell program.
    pub shell: String,
    /// Flag passing the command string to the shell.
    pub shell_flag: String,
    /// Bytes of output tail kept per task.
    pub output_cap: usize,
    /// Bytes requested per read from the output pipe.
    pub read_chunk_size: usize,
    /// Milliseconds to keep draining output after terminating a task.
    pub drain_grace_ms: u64,
}

impl Default for ExecSettings {
    fn default() -> Self {
        let defaults = ExecConfig::default();
        Self {
            shell: defaults.shell,
            shell_flag: defaults.shell_flag,
            output_cap: defaults.output_cap,
            read_chunk_size: defaults.read_chunk_size,
            drain_grace_ms: defaults.drain_grace.as_millis() as u64,
        }
    }
}

impl ExecSettings {
    /// Supervisor settings for these values.
    pub fn exec_config(&self) -> ExecConfig {
        ExecConfig {
            shell: self.shell.clone(),
            shell_flag: self.shell_flag.clone(),
            output_cap: self.output_cap,
            read_chunk_size: self.read_chunk_size,
            drain_grace: Duration::from_millis(self.drain_grace_ms),
        }
    }
}

/// Upload staging configuration.
#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    /// Where an uploaded artifact is written before its command runs.
    pub path: PathBuf,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/usr/src/myapp/submit.tar.gz"),
        }
    }
}

impl WorkerConfig {
    /// Parse a TOML string into a `WorkerConfig`, expanding `${ENV_VAR}`
    /// references first.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let expanded = crate::utils::expand_env_vars(toml_str);
        let config: Self = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply `TASKER_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply `TASKER_*` overrides resolved through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_URL) {
            self.connection.url = url;
        }
        if let Some(cap) = lookup(ENV_OUTPUT_CAP) {
            self.exec.output_cap = cap
                .trim()
                .parse()
                .with_context(|| format!("{ENV_OUTPUT_CAP} must be a byte count, got {cap:?}"))?;
        }
        if let Some(path) = lookup(ENV_STAGING_PATH) {
            self.staging.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Reject values the worker cannot run with.
    pub fn validate(&self) -> Result<()> {
        ensure!(self.exec.output_cap > 0, "exec.output_cap must be positive");
        ensure!(
            self.exec.read_chunk_size > 0,
            "exec.read_chunk_size must be positive"
        );
        ensure!(!self.exec.shell.is_empty(), "exec.shell must not be empty");
        ensure!(
            self.connection.max_message_size > 0,
            "connection.max_message_size must be positive"
        );
        let largest_result = self
            .exec
            .output_cap
            .saturating_add(self.exec.read_chunk_size)
            .saturating_add(crate::TIMEOUT_MARKER.len())
            .saturating_add(RESULT_ENVELOPE_HEADROOM);
        ensure!(
            largest_result < self.connection.max_message_size as usize,
            "exec.output_cap ({}) plus read_chunk_size ({}) and result headroom must stay \
             below connection.max_message_size ({})",
            self.exec.output_cap,
            self.exec.read_chunk_size,
            self.connection.max_message_size
        );
        if let Err(e) = crate::Endpoint::parse(&self.connection.url) {
            bail!("connection.url: {e}");
        }
        Ok(())
    }
}
