//! Agent Worker Binary
//!
//! Stdio host for the dispatcher: one JSON command per stdin line in, one JSON
//! result per stdout line out. Logs go to stderr.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::info;

use agent_worker::config::ConfigManager;
use agent_worker::logging;
use agent_worker::{Dispatcher, StdoutResultSink};

#[derive(Debug, Parser)]
#[command(name = "agent-worker", version, about = "Line-delimited JSON command dispatcher")]
struct Cli {
    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Worker count (overrides configuration)
    #[arg(long)]
    workers: Option<usize>,

    /// Skip the `asset-ready` notification at startup
    #[arg(long)]
    no_startup_notification: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_structured_logging();

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_file(path)?,
        None => ConfigManager::load()?,
    };
    let mut config = manager.into_config();
    if let Some(workers) = cli.workers {
        config = config.with_workers(workers);
    }
    if cli.no_startup_notification {
        config = config.without_startup_notification();
    }

    let dispatcher = Dispatcher::builder().with_config(config).build(StdoutResultSink)?;
    info!(workers = dispatcher.worker_count(), "Agent worker ready");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => dispatcher.submit(&line),
                None => break,
            },
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    let delivered = dispatcher.shutdown().await;
    info!(delivered, "Agent worker stopped");
    Ok(())
}
