//! Rakla host harness
//!
//! Runs one generation of the offline agent against in-memory caches, the
//! real network, an in-memory notification center and a client registry.
//! Host events are read from stdin as JSON lines; one JSON outcome line is
//! written to stdout per event. Logs go to stderr.

mod host;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rakla_common::{init_logging, load_json, LogConfig, LogFormat, Result, ResultExt};
use rakla_sw::{AgentConfig, HttpNetwork, NetworkConfig};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

use crate::host::{Host, Outcome};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "rakla-host")]
#[command(about = "Drive the Rakla offline agent with JSON-line events on stdin")]
struct Args {
    /// Agent config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format: pretty, compact or json
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,

    /// Log filter directives, e.g. "rakla_sw=trace"
    #[arg(long)]
    log_filter: Option<String>,

    /// Debug-level logs with source locations
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn log_config(&self) -> LogConfig {
        let base = if self.verbose {
            LogConfig::debug()
        } else {
            LogConfig::default()
        };
        let config = base.with_format(self.log_format);
        match self.log_filter {
            Some(ref filter) => config.with_filter(filter.as_str()),
            None => config,
        }
    }

    fn agent_config(&self) -> Result<AgentConfig> {
        match self.config {
            Some(ref path) => load_json(path),
            None => Ok(AgentConfig::default()),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_config()) {
        eprintln!("rakla-host: {}", e);
    }

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(category = e.category(), error = %e, "Host stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = args.agent_config()?;
    info!(
        origin = %config.origin,
        cache = %config.cache_name(),
        "Starting offline agent"
    );

    let network = HttpNetwork::new(NetworkConfig::default()).context("failed to build network client")?;
    let host = Host::new(config, Arc::new(network))?;
    host.start().await?;
    info!(state = ?host.agent().state().await, "Reading host events from stdin");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let outcome = host.handle_line(line).await;
        if let Outcome::Error { ref message } = outcome {
            warn!(input = line, error = %message, "Bad event");
        }
        println!("{}", serde_json::to_string(&outcome)?);
    }

    info!("Input closed, shutting down");
    Ok(())
}
