use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use conveyor_client::{token_from_env, HttpContext};
use conveyor_common::{Site, Workspace};
use conveyor_worker::{lifecycle::LifecycleConfig, shutdown, validate, Lifecycle, Registry};

#[derive(Parser)]
#[command(name = "conveyor", about = "Distributed task execution for scientific pipelines")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and perform work from the named buckets.
    Run(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Buckets to withdraw work from.
    #[arg(required = true)]
    buckets: Vec<String>,

    /// Filter work by site.
    #[arg(short, long)]
    site: String,

    /// Filter work by tag; may repeat.
    #[arg(short, long = "tag")]
    tags: Vec<String>,

    /// Filter work by parent pipeline id; may repeat.
    #[arg(short, long = "parent")]
    parents: Vec<String>,

    /// Filter work by event id; may repeat.
    #[arg(short, long = "event")]
    events: Vec<i64>,

    /// Overload the function to execute.
    #[arg(short, long)]
    function: Option<String>,

    /// Overload the command to execute.
    #[arg(short, long)]
    command: Option<String>,

    /// Attempts before exiting; -1 runs until signalled.
    #[arg(short, long, default_value_t = -1)]
    lives: i64,

    /// Seconds to sleep between attempts.
    #[arg(long, default_value_t = 30)]
    sleep: u64,

    /// Workspace config file.
    #[arg(short, long, default_value = "workspace.yaml")]
    workspace: PathBuf,

    /// Logging level.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run(args).await,
    }
}

async fn run(args: RunArgs) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(args.log_level.clone())),
        )
        .init();

    let site: Site = args.site.parse()?;
    let workspace = Workspace::from_file(&args.workspace).with_context(|| {
        format!(
            "workspace file not found or invalid: {}",
            args.workspace.display()
        )
    })?;

    let mode = if args.function.is_some() || args.command.is_some() {
        "static"
    } else {
        "dynamic"
    };
    info!("Conveyor worker starting");
    info!(workspace = %workspace.workspace, "workspace loaded");
    info!(buckets = ?args.buckets, site = %site, mode, "work filters");
    if !args.tags.is_empty() {
        info!(tags = ?args.tags, "tag filter");
    }
    if !args.parents.is_empty() {
        info!(parents = ?args.parents, "parent filter");
    }
    if args.lives < 0 {
        info!(sleep = args.sleep, "running until signalled");
    } else {
        info!(lives = args.lives, sleep = args.sleep, "bounded run");
    }

    let context = HttpContext::new(&workspace, token_from_env())?;
    context
        .buckets
        .info()
        .await
        .context("unable to reach the buckets backend")?;
    info!(baseurl = context.buckets.baseurl(), "buckets backend reachable");

    let registry = Registry::builtin();
    if let Some(function) = &args.function {
        anyhow::ensure!(
            registry.contains(function),
            "function {function} is not registered"
        );
        info!(function = %function, "static function resolved");
    }
    let command = args
        .command
        .map(|raw| raw.split_whitespace().map(String::from).collect::<Vec<_>>());
    if let Some(argv) = &command {
        let arg0 = argv.first().context("empty command override")?;
        anyhow::ensure!(validate::command(arg0), "command {arg0} not found on PATH");
        info!(command = ?argv, "static command resolved");
    }

    let shutdown = shutdown::install()?;
    let config = LifecycleConfig {
        buckets: args.buckets,
        site,
        tags: args.tags,
        parents: args.parents,
        events: args.events,
        function: args.function,
        command,
        lives: args.lives,
        sleep: Duration::from_secs(args.sleep.clamp(1, 300)),
    };
    Lifecycle::new(config, workspace, registry, context.buckets, shutdown)
        .run()
        .await;
    info!("worker shut down cleanly");
    Ok(())
}
