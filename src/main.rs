//! channel-tracker daemon
//!
//! Usage: `channel-tracker [config.json]`
//!
//! Without an argument, `channel-tracker.json` in the working directory is
//! used if present, otherwise the built-in defaults. Log verbosity follows
//! `RUST_LOG` (default `info`).

use channel_tracker::credentials::FileCredentialStore;
use channel_tracker::fetch::YtDlpProvider;
use channel_tracker::processor::Collaborators;
use channel_tracker::{Config, Database, Error, JobScheduler, Result, run_with_shutdown};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_CONFIG_FILE: &str = "channel-tracker.json";

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = load_config(std::env::args().nth(1).map(PathBuf::from)).await?;
    config.validate()?;

    let storage = &config.storage;
    let db = Arc::new(Database::new(&storage.database_path).await?);

    let fetch = match &storage.ytdlp_path {
        Some(path) => YtDlpProvider::new(path.clone(), storage.download_dir.clone()),
        None => YtDlpProvider::from_path(storage.download_dir.clone()).ok_or_else(|| {
            Error::ExternalTool("yt-dlp not found on PATH; set storage.ytdlp_path".into())
        })?,
    };
    tracing::info!(binary = %fetch.binary_path().display(), "using yt-dlp");

    let credentials = Arc::new(FileCredentialStore::new(storage.credentials_dir.clone()));

    let scheduler = JobScheduler::new(
        config,
        Collaborators {
            channels: db.clone(),
            downloads: db,
            fetch: Arc::new(fetch),
        },
        credentials,
    );

    scheduler.start().await?;
    run_with_shutdown(scheduler).await?;

    tracing::info!("channel-tracker stopped");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    if let Err(e) = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialise logging: {e}");
    }
}

async fn load_config(path: Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::from_json_file(&path).await,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            Config::from_json_file(Path::new(DEFAULT_CONFIG_FILE)).await
        }
        None => {
            tracing::info!("no config file, using defaults");
            Ok(Config::default())
        }
    }
}
