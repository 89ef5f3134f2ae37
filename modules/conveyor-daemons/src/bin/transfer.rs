use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use conveyor_client::{token_from_env, HttpContext};
use conveyor_common::Workspace;
use conveyor_daemons::transfer;

#[derive(Parser)]
#[command(
    name = "conveyor-transfer",
    about = "Promote terminal work into Results and purge the queue"
)]
struct Cli {
    /// Seconds to sleep between transfers.
    #[arg(short, long, default_value_t = 5)]
    sleep: u64,

    /// Workspace config file.
    #[arg(short, long, default_value = "workspace.yaml")]
    workspace: PathBuf,

    /// Works per transfer pass.
    #[arg(long, default_value_t = 50)]
    limit: u64,

    /// Cutoff in seconds for stale work.
    #[arg(long, default_value_t = transfer::DEFAULT_CUTOFF.as_secs())]
    cutoff: u64,

    /// Perform exactly one pass and print the outcome.
    #[arg(long)]
    test_mode: bool,

    /// Logging level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level)),
        )
        .init();

    let workspace = Workspace::from_file(&cli.workspace).with_context(|| {
        format!(
            "workspace file not found or invalid: {}",
            cli.workspace.display()
        )
    })?;
    let context = HttpContext::new(&workspace, token_from_env())?;
    let results = context.results()?;
    context
        .buckets
        .info()
        .await
        .context("buckets backend not available")?;
    results
        .info()
        .await
        .context("results backend not available")?;
    info!(
        buckets = context.buckets.baseurl(),
        results = results.baseurl(),
        limit = cli.limit,
        cutoff = cli.cutoff,
        "transfer daemon starting"
    );

    let cutoff = Duration::from_secs(cli.cutoff);
    if cli.test_mode {
        let outcome =
            transfer::tick(&context.buckets, results, &workspace, cli.limit, cutoff).await?;
        println!(
            "{}",
            serde_json::json!({"transfered": outcome.transfered, "deleted": outcome.deleted})
        );
        return Ok(());
    }
    transfer::run(
        &context.buckets,
        results,
        &workspace,
        cli.limit,
        cutoff,
        Duration::from_secs(cli.sleep),
    )
    .await;
    Ok(())
}
