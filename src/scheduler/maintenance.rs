//! Daily cleanup and weekly maintenance jobs

use super::JobScheduler;
use crate::error::Result;
use crate::types::{ChannelId, Event};
use crate::utils::{PARTIAL_DOWNLOAD_EXTENSIONS, remove_stale_files};
use serde::{Deserialize, Serialize};

/// What the daily cleanup removed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Expired stored credentials
    pub expired_credentials: usize,
    /// Credential temp files and stale partial downloads
    pub temp_files: usize,
}

/// What the weekly maintenance changed
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    /// Stored credentials that failed validation
    pub invalid_credentials: usize,
    /// Channels brought back into the sweep
    pub reactivated: Vec<ChannelId>,
}

impl JobScheduler {
    /// Remove expired credentials and stale temporary files
    ///
    /// Each step runs even if an earlier one failed; failures are logged.
    pub async fn run_cleanup(&self) -> CleanupReport {
        let storage = &self.inner.config.storage;
        let credentials = &self.inner.credentials;
        let mut report = CleanupReport::default();

        match credentials.cleanup_expired().await {
            Ok(n) => report.expired_credentials = n,
            Err(e) => tracing::warn!(store = credentials.name(), error = %e, "failed to remove expired credentials"),
        }

        match credentials.cleanup_temp_files(storage.temp_file_max_age).await {
            Ok(n) => report.temp_files += n,
            Err(e) => tracing::warn!(store = credentials.name(), error = %e, "failed to remove credential temp files"),
        }

        for dir in [&storage.download_dir, &storage.temp_dir] {
            match remove_stale_files(dir, PARTIAL_DOWNLOAD_EXTENSIONS, storage.temp_file_max_age).await {
                Ok(n) => report.temp_files += n,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to remove partial downloads")
                }
            }
        }

        tracing::info!(
            expired_credentials = report.expired_credentials,
            temp_files = report.temp_files,
            "daily cleanup completed"
        );
        self.emit(Event::CleanupCompleted {
            expired_credentials: report.expired_credentials,
            temp_files: report.temp_files,
        });
        report
    }

    /// Validate stored credentials and reactivate recoverable channels
    ///
    /// An inactive channel is reactivated when its error count is below the
    /// configured reactivation threshold. Reactivation clears the error state.
    ///
    /// # Errors
    ///
    /// Fails if the inactive channels cannot be loaded. A single channel that
    /// cannot be reactivated is logged and skipped.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport> {
        let credentials = &self.inner.credentials;
        let channels = self.inner.processor.channels();
        let threshold = self.inner.config.processor.reactivation_threshold;
        let mut report = MaintenanceReport::default();

        match credentials.validate_active().await {
            Ok(n) => report.invalid_credentials = n,
            Err(e) => tracing::warn!(store = credentials.name(), error = %e, "failed to validate credentials"),
        }

        for channel in channels.find_inactive().await? {
            if channel.error_count >= threshold {
                tracing::debug!(
                    channel_id = %channel.id,
                    error_count = channel.error_count,
                    threshold,
                    "channel stays inactive"
                );
                continue;
            }
            match channels.reactivate(channel.id).await {
                Ok(()) => {
                    tracing::info!(
                        channel_id = %channel.id,
                        channel = %channel.display_name,
                        previous_errors = channel.error_count,
                        "channel reactivated"
                    );
                    report.reactivated.push(channel.id);
                }
                Err(e) => {
                    tracing::warn!(channel_id = %channel.id, error = %e, "failed to reactivate channel")
                }
            }
        }

        tracing::info!(
            invalid_credentials = report.invalid_credentials,
            reactivated = report.reactivated.len(),
            "weekly maintenance completed"
        );
        self.emit(Event::MaintenanceCompleted {
            invalid_credentials: report.invalid_credentials,
            reactivated: report.reactivated.clone(),
        });
        Ok(report)
    }
}
