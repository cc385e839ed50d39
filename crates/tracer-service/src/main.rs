//! Tracer Service - drives the coordination core from a recorded event stream.
//!
//! Run with: `cargo run -p tracer-service -- --events events.jsonl`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tracer_core::{
    Collaborators, HttpIdentityLookup, HttpUploader, IdentityLookup, TracerCoordinator, Uploader,
};
use tracer_service::{
    Config, LogUploader, OfflineLookup, SimulatedRadio, default_config_path, replay,
};

/// Tracer Service - proximity tracing coordinator runner.
#[derive(Parser, Debug)]
#[command(name = "tracer-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// JSON-lines event file to replay (stdin when omitted).
    #[arg(short, long, global = true)]
    events: Option<PathBuf>,

    /// Identity lookup base URL (overrides config).
    #[arg(long, global = true)]
    lookup_url: Option<String>,

    /// Upload base URL (overrides config).
    #[arg(long, global = true)]
    upload_url: Option<String>,

    /// Enable the tracing service even if it is not persisted as enabled.
    #[arg(long, global = true)]
    enable: bool,

    /// Print the capability trace after the run.
    #[arg(long, global = true)]
    print_trace: bool,

    /// Debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay discovery events through the coordinator (default behavior).
    Run,

    /// Validate the configuration and print it.
    CheckConfig,

    /// Write a configuration file with a freshly generated user id.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet)?;

    match args.command {
        Some(Command::CheckConfig) => check_config(&args),
        Some(Command::Init { force }) => init_config(&args, force),
        Some(Command::Run) | None => run(args).await,
    }
}

fn init_logging(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("tracer_service={level}").parse()?)
                .add_directive(format!("tracer_core={level}").parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Load the configuration and apply command line overrides.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(url) = &args.lookup_url {
        config.endpoints.lookup_url = Some(url.clone());
    }
    if let Some(url) = &args.upload_url {
        config.endpoints.upload_url = Some(url.clone());
    }

    config.validate()?;
    Ok(config)
}

fn config_path(args: &Args) -> PathBuf {
    args.config.clone().unwrap_or_else(default_config_path)
}

fn check_config(args: &Args) -> anyhow::Result<()> {
    let config = load_config(args)?;
    println!("# {}", config_path(args).display());
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn init_config(args: &Args, force: bool) -> anyhow::Result<()> {
    let path = config_path(args);
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = Config::default();
    config.identity.user_id = Some(uuid::Uuid::new_v4().to_string());
    config.save(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(&args)?;

    if config.identity.user_id.is_none() {
        let user_id = uuid::Uuid::new_v4().to_string();
        warn!(
            "No user id configured, using {} for this run (see `tracer-service init`)",
            user_id
        );
        config.identity.user_id = Some(user_id);
    }

    let timeout = config.endpoints.timeout();
    let lookup: Arc<dyn IdentityLookup> = match &config.endpoints.lookup_url {
        Some(url) => {
            info!("Resolving beacons through {}", url);
            Arc::new(HttpIdentityLookup::new(url, timeout)?)
        }
        None => Arc::new(OfflineLookup),
    };
    let uploader: Arc<dyn Uploader> = match &config.endpoints.upload_url {
        Some(url) => {
            info!("Uploading observations to {}", url);
            Arc::new(HttpUploader::new(url, timeout)?)
        }
        None => Arc::new(LogUploader),
    };

    let radio = Arc::new(SimulatedRadio::new(&config.radio));
    let coordinator = Arc::new(TracerCoordinator::new(
        config.coordinator_config(),
        Collaborators::new(radio.clone(), radio, lookup, uploader),
    )?);

    let events = coordinator.event_source();
    let attachment = coordinator
        .attach_with(&events, config.identity.onboarded)
        .await;
    if args.enable {
        coordinator.enable().await;
    }

    let replayed = tokio::select! {
        result = replay_source(args.events.as_deref(), &events) => Some(result?),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping replay");
            None
        }
    };

    match replayed {
        Some(stats) => {
            info!(
                "Replayed {} event(s), {} malformed line(s) skipped",
                stats.published, stats.malformed
            );
            drop(events);
            attachment.wait_closed().await;
        }
        None => attachment.detach().await,
    }

    let flushed = coordinator.flush().await;
    if flushed > 0 {
        info!("Flushed {} observation(s) at shutdown", flushed);
    }

    let status = coordinator.status().await;
    let stats = coordinator.stats();
    info!(
        "Service {}: {} lookup(s), {} cache hit(s), {} upload(s), {} failed",
        status.state,
        stats.cache.lookups,
        stats.cache.hits,
        stats.buffer.uploads,
        stats.buffer.failed_uploads
    );

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "status": status,
            "stats": stats,
        }))?
    );

    if args.print_trace {
        println!("{}", coordinator.trace().render().await);
    }

    Ok(())
}

async fn replay_source(
    path: Option<&Path>,
    events: &tracer_core::DiscoveryEvents,
) -> anyhow::Result<tracer_service::ReplayStats> {
    let stats = match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open event file {}", path.display()))?;
            replay(BufReader::new(file), events).await?
        }
        None => replay(BufReader::new(tokio::io::stdin()), events).await?,
    };
    Ok(stats)
}
