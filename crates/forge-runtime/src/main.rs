//! # Forge
//!
//! Command-line entry point for the Forge knowledge-graph pipeline.
//!
//! ## Startup Sequence
//!
//! 1. Initialise logging and metrics
//! 2. Load configuration (defaults, file, `FORGE_*` environment)
//! 3. Resolve the LLM provider from the environment (optional)
//! 4. Build the container and start every registered stage
//! 5. Ingest, drain, report, shut down
//!
//! Ctrl+C cancels the run; stages stop issuing LLM calls and ingestion
//! stops publishing.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use forge_runtime::{llm_client_from_env, ForgeConfig, PipelineRuntime, ServiceContainer};
use forge_telemetry::{init_telemetry, TelemetryConfig};
use shared_bus::Topic;

#[derive(Debug, Parser)]
#[command(name = "forge", version, about = "Event-driven knowledge-graph extraction")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest every .txt and .md document in a directory.
    Ingest {
        /// Directory holding the documents.
        dir: PathBuf,

        /// TOML configuration file.
        #[arg(long, env = "FORGE_CONFIG")]
        config: Option<PathBuf>,

        /// Seconds to wait for the pipeline to drain.
        #[arg(long)]
        idle_timeout: Option<u64>,
    },
    /// Print the topic vocabulary.
    Topics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Topics => {
            for topic in Topic::ALL {
                println!("{topic}");
            }
            Ok(())
        }
        Command::Ingest {
            dir,
            config,
            idle_timeout,
        } => {
            let _telemetry = init_telemetry(TelemetryConfig::from_env())?;
            ingest(dir, config, idle_timeout).await
        }
    }
}

async fn ingest(dir: PathBuf, config_path: Option<PathBuf>, idle_timeout: Option<u64>) -> Result<()> {
    let mut config =
        ForgeConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    if let Some(secs) = idle_timeout {
        config.runtime.idle_timeout_secs = secs;
    }

    let llm = llm_client_from_env(&config.llm);
    let container = ServiceContainer::new(config, llm).context("Failed to build pipeline")?;
    let runtime = PipelineRuntime::new(container);
    runtime.start().await.context("Failed to start stages")?;

    let report = tokio::select! {
        report = runtime.ingest_directory(&dir) => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling run");
            runtime.cancel();
            runtime.shutdown().await;
            return Ok(());
        }
    };
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            runtime.shutdown().await;
            return Err(e).with_context(|| format!("Ingestion of {} failed", dir.display()));
        }
    };

    runtime.shutdown().await;
    info!(settled = report.settled, "Run complete");
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
