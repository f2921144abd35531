//! Utility functions for file housekeeping

use crate::error::Result;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Extensions of leftover partial downloads removed by the daily cleanup
pub const PARTIAL_DOWNLOAD_EXTENSIONS: &[&str] = &["part", "ytdl", "tmp"];

/// Delete files in `dir` with one of `extensions` that were last modified more
/// than `max_age` ago
///
/// Only the top level of `dir` is scanned. A missing directory counts as
/// empty. Files that cannot be inspected or removed are logged and skipped.
///
/// # Arguments
///
/// * `dir` - Directory to scan
/// * `extensions` - Extensions to match, without the leading dot (case-insensitive)
/// * `max_age` - Minimum age for a file to be removed
///
/// # Returns
///
/// Number of files removed
///
/// # Examples
///
/// ```no_run
/// use channel_tracker::utils::{PARTIAL_DOWNLOAD_EXTENSIONS, remove_stale_files};
/// use std::path::Path;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let week = Duration::from_secs(7 * 24 * 60 * 60);
/// let removed = remove_stale_files(Path::new("downloads"), PARTIAL_DOWNLOAD_EXTENSIONS, week).await?;
/// println!("removed {removed} partial files");
/// # Ok(())
/// # }
/// ```
pub async fn remove_stale_files(dir: &Path, extensions: &[&str], max_age: Duration) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !has_extension(&path, extensions) {
            continue;
        }

        let metadata = match entry.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to stat file");
                continue;
            }
        };

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .unwrap_or(Duration::ZERO);
        if age < max_age {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), age_secs = age.as_secs(), "removed stale file");
                removed += 1;
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove stale file");
            }
        }
    }

    Ok(removed)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
