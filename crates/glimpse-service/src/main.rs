//! Glimpse: store images, announce them, and analyze them with a vision API.
//!
//! Configuration comes from the environment (and `.env`); see `Config`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glimpse_core::{Config, Location};
use glimpse_infra::telemetry::{init_telemetry, shutdown_telemetry, DEFAULT_FILTER};
use glimpse_service::{setup, App, NotificationStatus};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "glimpse", about = "Image ingest and analysis pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store files, publish their locations and analyze them
    Ingest {
        /// Files to ingest
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Location prefix; the file name is appended
        #[arg(long, default_value = "blob://images/")]
        prefix: String,
    },
    /// Copy a stored object to a local file
    Fetch {
        /// Location of the object, e.g. blob://images/cat.png
        location: String,
        /// Output path
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Missing or invalid configuration is fatal before anything is built.
    let config = Config::from_env().context("Invalid configuration")?;
    init_telemetry(config.log_format, DEFAULT_FILTER)?;
    tracing::info!(environment = %config.environment, "Configuration loaded");

    let app = setup::initialize_app(config).await?;

    let outcome = match cli.command {
        Commands::Ingest { files, prefix } => run_ingest(&app, &files, &prefix).await,
        Commands::Fetch { location, out } => run_fetch(&app, &location, &out).await,
    };

    app.shutdown().await;
    shutdown_telemetry().await;
    outcome
}

async fn run_ingest(app: &App, files: &[PathBuf], prefix: &str) -> Result<()> {
    let mut stored = Vec::new();

    for path in files {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("{} has no file name", path.display()))?;
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;

        let receipt = app
            .ingest
            .ingest(&format!("{}{}", prefix, file_name), Box::pin(file))
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;

        match &receipt.notification {
            NotificationStatus::Published(id) => {
                println!("stored {} ({} bytes), notification {}", receipt.location, receipt.bytes, id)
            }
            NotificationStatus::Failed(reason) => println!(
                "stored {} ({} bytes), notification NOT published: {}",
                receipt.location, receipt.bytes, reason
            ),
        }
        stored.push(receipt.location);
    }

    tokio::select! {
        _ = app.channel.wait_until_settled() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(outstanding = app.channel.outstanding(), "Interrupted before all notifications were processed");
        }
    }

    for location in &stored {
        let fetch_url = app.store.fetch_url(location)?;
        if !app.cache.contains(&fetch_url) {
            println!("{}: no analysis result", location);
            continue;
        }
        // Served from the cache; no further vision API call.
        let result = app.handler.analyze(location).await?;
        println!("{}: {}", location, serde_json::to_string_pretty(&result)?);
    }

    for dead in app.channel.dead_letters() {
        println!(
            "dead-lettered {} after {} attempt(s): {}",
            dead.notification.location, dead.attempts, dead.last_error
        );
    }

    Ok(())
}

async fn run_fetch(app: &App, location: &str, out: &Path) -> Result<()> {
    let location = Location::parse(location)?;
    let object = app
        .ingest
        .fetch(&location)
        .await
        .with_context(|| format!("Failed to load {}", location))?;
    let fetch_url = object.fetch_url.clone();

    let data = object.bytes().await?;
    tokio::fs::write(out, &data)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    println!("{} -> {} ({} bytes, {})", location, out.display(), data.len(), fetch_url);
    Ok(())
}
