//! batchflow CLI entrypoint

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use batchflow::batch::{batch_engine, batch_graph};
use batchflow::cancellation::CancellationToken;
use batchflow::config::BatchConfig;

/// batchflow - employee-salary batch pipeline
#[derive(Parser, Debug)]
#[command(name = "batchflow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true, env = "BATCHFLOW_JSON_LOGS")]
    json_logs: bool,

    /// Input CSV (overrides BATCHFLOW_DATA_FILE)
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Output directory (overrides BATCHFLOW_OUTPUT_DIR)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Mail spool directory (overrides BATCHFLOW_SPOOL_DIR)
    #[arg(long, global = true)]
    spool: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute one run and print its report
    Run,

    /// Print the task graph without running it
    Plan,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

impl Cli {
    fn config(&self) -> Result<BatchConfig> {
        let mut config = BatchConfig::from_env().context("Failed to read configuration")?;
        if let Some(data) = &self.data {
            config.data_file.clone_from(data);
        }
        if let Some(output) = &self.output {
            config.output_dir.clone_from(output);
        }
        if let Some(spool) = &self.spool {
            config.spool_dir.clone_from(spool);
        }
        Ok(config)
    }

    async fn execute(self) -> Result<()> {
        let config = self.config()?;
        match self.command {
            Commands::Run => run(&config).await,
            Commands::Plan => plan(&config),
        }
    }
}

async fn run(config: &BatchConfig) -> Result<()> {
    let engine = batch_engine(config).context("Failed to build pipeline")?;

    let cancel = Arc::new(CancellationToken::new());
    let on_signal = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel("interrupted");
        }
    });

    let report = engine.execute_with_cancellation(&cancel).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.succeeded() {
        let task = report
            .run
            .first_failure()
            .map_or("unknown", |r| r.task.as_str());
        bail!("Run {} failed at task '{task}'", report.run.run_id());
    }
    info!(run_id = %report.run.run_id(), "Run succeeded");
    Ok(())
}

fn plan(config: &BatchConfig) -> Result<()> {
    let graph = batch_graph(config).context("Invalid pipeline")?;
    println!("{} ({} tasks, end: {})", graph.name(), graph.task_count(), graph.end_task());
    for name in graph.execution_order() {
        let Some(spec) = graph.spec(name) else {
            continue;
        };
        let deps: Vec<&str> = spec.dependencies.iter().map(String::as_str).collect();
        println!(
            "  {name:<28} attempts={} rule={} after=[{}]",
            spec.retry.max_attempts,
            spec.trigger_rule,
            deps.join(", ")
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    cli.execute().await
}
