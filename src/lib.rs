//! # channel-tracker
//!
//! Background tracker that watches user-registered content channels for new
//! items and acquires the ones not yet downloaded, while coping with an
//! unreliable, rate-limiting source.
//!
//! ## Architecture
//!
//! - [`JobScheduler`] runs sweeps on a fixed cadence. One sweep at a time,
//!   channels in priority order, at most `max_concurrent_jobs` at once.
//! - [`ChannelProcessor`](processor::ChannelProcessor) handles one channel:
//!   list recent items, walk down to the high-water mark, skip recorded items,
//!   acquire the rest. Repeated failures deactivate the channel.
//! - [`ExecutionEngine`](engine::ExecutionEngine) wraps every call to the
//!   fetch provider, rotating credential and identity strategies and cooling
//!   down according to how the last attempt failed.
//! - Persistence, fetching and credentials sit behind traits
//!   ([`repository`], [`fetch`], [`credentials`]). [`Database`] (SQLite) and
//!   [`YtDlpProvider`](fetch::YtDlpProvider) are the bundled implementations.
//!
//! ## Quick Start
//!
//! ```no_run
//! use channel_tracker::credentials::FileCredentialStore;
//! use channel_tracker::fetch::YtDlpProvider;
//! use channel_tracker::processor::Collaborators;
//! use channel_tracker::{Config, Database, JobScheduler, run_with_shutdown};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let db = Arc::new(Database::new(&config.storage.database_path).await?);
//!     let fetch = YtDlpProvider::from_path(config.storage.download_dir.clone())
//!         .ok_or("yt-dlp not found on PATH")?;
//!     let credentials = Arc::new(FileCredentialStore::new(config.storage.credentials_dir.clone()));
//!
//!     let scheduler = JobScheduler::new(
//!         config,
//!         Collaborators {
//!             channels: db.clone(),
//!             downloads: db,
//!             fetch: Arc::new(fetch),
//!         },
//!         credentials,
//!     );
//!
//!     // Subscribe to events
//!     let mut events = scheduler.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     scheduler.start().await?;
//!     run_with_shutdown(scheduler).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Stored credential access and housekeeping
pub mod credentials;
/// Database persistence layer
pub mod db;
/// Strategy-rotating execution of external operations
pub mod engine;
/// Error types
pub mod error;
/// Fetch provider trait and the yt-dlp implementation
pub mod fetch;
/// Per-channel discovery and acquisition
pub mod processor;
/// Repository traits for channels and downloads
pub mod repository;
/// Channel-level retry
pub mod retry;
/// Job scheduling: sweeps, cleanup, maintenance
pub mod scheduler;
/// Sweep and lifetime statistics
pub mod stats;
/// Core types and events
pub mod types;
/// Utility functions
pub mod utils;

#[cfg(test)]
mod test_helpers;

// Re-export commonly used types
pub use config::{Config, HighWaterMark};
pub use db::Database;
pub use error::{DatabaseError, Error, Result};
pub use scheduler::{JobScheduler, SweepOutcome};
pub use stats::{ChannelRunStats, RunStats, SchedulerSnapshot, SchedulerStats};
pub use types::{
    ChannelId, DownloadRecord, DownloadSource, Event, ItemSummary, NewTrackedChannel,
    TrackedChannel,
};

/// Run the scheduler until a termination signal arrives, then stop it.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use channel_tracker::{JobScheduler, run_with_shutdown};
///
/// # async fn example(scheduler: JobScheduler) -> Result<(), Box<dyn std::error::Error>> {
/// scheduler.start().await?;
///
/// // Blocks until SIGTERM/SIGINT
/// run_with_shutdown(scheduler).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(scheduler: JobScheduler) -> Result<()> {
    wait_for_signal().await;
    scheduler.stop().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
