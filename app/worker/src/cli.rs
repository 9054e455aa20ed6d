//! Command-line entry point for the worker.

use crate::config::WorkerConfig;
use crate::connection::{Endpoint, FramedConnection, WsConnection};
use crate::worker::Worker;
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

/// Connects to a coordinator and runs the shell commands it sends, one at a
/// time.
#[derive(Parser, Debug)]
#[command(name = "tasker-worker", about = "Remote shell task worker")]
pub struct Cli {
    /// Path to a TOML configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Coordinator address. Overrides the configuration file and environment.
    #[arg(long)]
    pub url: Option<String>,

    /// Print the resolved configuration and exit.
    #[arg(long)]
    pub print_config: bool,
}

impl Cli {
    /// Resolve configuration, then serve until the coordinator disconnects
    /// or ctrl-c is received.
    pub async fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        if self.print_config {
            print!("{}", toml::to_string_pretty(&config)?);
            return Ok(());
        }

        tokio::select! {
            result = serve(&config) => result,
            signal = tokio::signal::ctrl_c() => {
                signal?;
                tracing::info!("received ctrl-c, shutting down");
                Ok(())
            }
        }
    }

    /// File (or defaults), then environment, then flags.
    pub fn resolve_config(&self) -> Result<WorkerConfig> {
        let mut config = match &self.config {
            Some(path) => WorkerConfig::load(path)?,
            None => WorkerConfig::default(),
        };
        config.apply_env()?;
        if let Some(url) = &self.url {
            config.connection.url.clone_from(url);
        }
        config.validate()?;
        Ok(config)
    }
}

/// Connect to the configured coordinator and run the worker loop.
pub async fn serve(config: &WorkerConfig) -> Result<()> {
    let worker = Worker::from_config(config);
    let url = &config.connection.url;
    let max = config.connection.max_message_size;
    tracing::info!(
        url = %url,
        staging = %worker.staging_path().display(),
        "connecting to coordinator"
    );

    match Endpoint::parse(url)? {
        Endpoint::WebSocket(url) => {
            let mut conn = WsConnection::connect(&url, max)
                .await
                .with_context(|| format!("failed to connect to {url}"))?;
            worker.run(&mut conn).await?;
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let mut conn = FramedConnection::unix(&path, max)
                .await
                .with_context(|| format!("failed to connect to {}", path.display()))?;
            worker.run(&mut conn).await?;
        }
        #[cfg(not(unix))]
        Endpoint::Unix(path) => {
            anyhow::bail!("unix sockets are not supported here: {}", path.display());
        }
        Endpoint::Tcp(addr) => {
            let mut conn = FramedConnection::tcp(&addr, max)
                .await
                .with_context(|| format!("failed to connect to {addr}"))?;
            worker.run(&mut conn).await?;
        }
    }

    tracing::info!("coordinator closed the connection");
    Ok(())
}
