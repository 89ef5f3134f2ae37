use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use conveyor_client::{token_from_env, Buckets, ClientConfig};
use conveyor_daemons::audit;

#[derive(Parser)]
#[command(name = "conveyor-audit", about = "Audit the work queue: retry, expire, and purge")]
struct Cli {
    /// Seconds to sleep between audits.
    #[arg(short, long, default_value_t = 5)]
    sleep: u64,

    /// Buckets backend baseurl.
    #[arg(short, long, default_value = "http://localhost:8004")]
    baseurl: String,

    /// Authentication token.
    #[arg(short, long)]
    token: Option<String>,

    /// Perform exactly one audit and print the counts.
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

    let mut config = ClientConfig::new(&cli.baseurl);
    if let Some(token) = cli.token.or_else(token_from_env) {
        config = config.with_token(token);
    }
    let buckets = Buckets::new(&config)?;

    if cli.test_mode {
        let counts = audit::tick(&buckets).await?;
        println!("{}", serde_json::to_string(&counts)?);
        return Ok(());
    }
    info!(baseurl = %cli.baseurl, sleep = cli.sleep, "audit daemon starting");
    audit::run(&buckets, Duration::from_secs(cli.sleep)).await;
    Ok(())
}
