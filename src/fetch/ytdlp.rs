//! Fetch provider backed by the external yt-dlp binary

use super::FetchProvider;
use crate::engine::{CredentialSource, InvocationDescriptor};
use crate::error::{Error, Result};
use crate::types::{AcquiredItem, ItemSummary};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Thumbnail extensions yt-dlp may write next to the media file
const THUMBNAIL_EXTENSIONS: &[&str] = &["jpg", "webp", "png"];

/// Maximum stderr length carried into an error message
const MAX_ERROR_LEN: usize = 2000;

/// Provider that spawns `yt-dlp` for each invocation
///
/// The child is spawned with `kill_on_drop`, so when the engine's timeout drops
/// the invocation future the subprocess is killed with it.
///
/// # Examples
///
/// ```no_run
/// use channel_tracker::fetch::YtDlpProvider;
/// use std::path::PathBuf;
///
/// let provider = YtDlpProvider::from_path(PathBuf::from("downloads"))
///     .expect("yt-dlp not found in PATH");
/// ```
pub struct YtDlpProvider {
    binary_path: PathBuf,
    download_dir: PathBuf,
}

/// One line of `--dump-json --flat-playlist` output
#[derive(Debug, Deserialize)]
struct ListingLine {
    #[serde(rename = "_type")]
    kind: Option<String>,
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
    duration: Option<f64>,
    upload_date: Option<String>,
    view_count: Option<u64>,
}

impl YtDlpProvider {
    /// Create a provider with an explicit binary path
    ///
    /// # Arguments
    ///
    /// * `binary_path` - Path to the yt-dlp binary
    /// * `download_dir` - Directory acquired media is written to
    pub fn new(binary_path: PathBuf, download_dir: PathBuf) -> Self {
        Self {
            binary_path,
            download_dir,
        }
    }

    /// Attempt to find yt-dlp in PATH
    ///
    /// # Returns
    ///
    /// `Some(YtDlpProvider)` if the binary is found, `None` otherwise.
    pub fn from_path(download_dir: PathBuf) -> Option<Self> {
        which::which("yt-dlp")
            .ok()
            .map(|binary| Self::new(binary, download_dir))
    }

    /// Binary this provider runs
    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    /// Arguments shared by every invocation: credential, identity and pacing
    pub fn descriptor_args(descriptor: &InvocationDescriptor) -> Vec<String> {
        let mut args = vec!["--no-warnings".to_string()];

        match &descriptor.credential {
            CredentialSource::Stored(path) => {
                args.push("--cookies".into());
                args.push(path.display().to_string());
            }
            CredentialSource::Browser(browser) => {
                args.push("--cookies-from-browser".into());
                args.push(browser.clone());
            }
            CredentialSource::None => {}
        }

        let identity = &descriptor.identity;
        if let Some(user_agent) = &identity.user_agent {
            args.push("--user-agent".into());
            args.push(user_agent.clone());
        }
        for (name, value) in &identity.headers {
            args.push("--add-header".into());
            args.push(format!("{name}:{value}"));
        }
        if let Some(client) = &identity.player_client {
            args.push("--extractor-args".into());
            args.push(format!("youtube:player_client={client}"));
        }

        args.push("--sleep-interval".into());
        args.push(descriptor.pacing.min.as_secs().to_string());
        args.push("--max-sleep-interval".into());
        args.push(descriptor.pacing.max.as_secs().to_string());

        args
    }

    /// Full argument list for a listing invocation
    pub fn list_args(source_url: &str, limit: usize, descriptor: &InvocationDescriptor) -> Vec<String> {
        let mut args = vec![
            "--dump-json".to_string(),
            "--flat-playlist".to_string(),
            "--playlist-end".to_string(),
            limit.to_string(),
        ];
        args.extend(Self::descriptor_args(descriptor));
        args.push(source_url.to_string());
        args
    }

    /// Full argument list for an acquisition invocation
    pub fn acquire_args(
        &self,
        item_url: &str,
        quality: &str,
        descriptor: &InvocationDescriptor,
    ) -> Vec<String> {
        let template = self
            .download_dir
            .join("%(uploader)s")
            .join("%(title).150B [%(id)s].%(ext)s");
        let mut args = vec![
            "--format".to_string(),
            format_selector(quality),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "--write-info-json".to_string(),
            "--write-thumbnail".to_string(),
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--output".to_string(),
            template.display().to_string(),
        ];
        args.extend(Self::descriptor_args(descriptor));
        args.push(item_url.to_string());
        args
    }

    async fn run(&self, args: &[String]) -> Result<Vec<u8>> {
        tracing::debug!(binary = %self.binary_path.display(), ?args, "running yt-dlp");
        let output = Command::new(&self.binary_path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if output.status.success() {
            return Ok(output.stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mut message = stderr.trim().to_string();
        if message.is_empty() {
            message = format!("yt-dlp exited with {}", output.status);
        }
        if message.len() > MAX_ERROR_LEN {
            let mut cut = MAX_ERROR_LEN;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Err(Error::Fetch(message))
    }
}

#[async_trait]
impl FetchProvider for YtDlpProvider {
    async fn list_recent_items(
        &self,
        source_url: &str,
        limit: usize,
        descriptor: &InvocationDescriptor,
    ) -> Result<Vec<ItemSummary>> {
        let stdout = self
            .run(&Self::list_args(source_url, limit, descriptor))
            .await?;
        let mut items = parse_listing(&String::from_utf8_lossy(&stdout));
        items.truncate(limit);
        Ok(items)
    }

    async fn acquire_item(
        &self,
        item_url: &str,
        quality: &str,
        descriptor: &InvocationDescriptor,
    ) -> Result<AcquiredItem> {
        let stdout = self
            .run(&self.acquire_args(item_url, quality, descriptor))
            .await?;
        let stdout = String::from_utf8_lossy(&stdout);
        let file_path = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| Error::Fetch("yt-dlp did not report an output file".into()))?;

        let file_size_bytes = tokio::fs::metadata(&file_path).await.ok().map(|m| m.len());
        let metadata_path = existing(file_path.with_extension("info.json")).await;
        let mut thumbnail_path = None;
        for ext in THUMBNAIL_EXTENSIONS {
            if let Some(path) = existing(file_path.with_extension(ext)).await {
                thumbnail_path = Some(path);
                break;
            }
        }

        Ok(AcquiredItem {
            file_path,
            thumbnail_path,
            metadata_path,
            file_size_bytes,
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}

async fn existing(path: PathBuf) -> Option<PathBuf> {
    match tokio::fs::try_exists(&path).await {
        Ok(true) => Some(path),
        _ => None,
    }
}

/// Parse JSON-lines listing output into item summaries, in output order
///
/// Playlist header lines and entries without an id are skipped; malformed
/// lines are logged and ignored. A missing item URL is derived from the id.
pub fn parse_listing(stdout: &str) -> Vec<ItemSummary> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<ListingLine>(line) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse yt-dlp listing line");
                None
            }
        })
        .filter(|entry| entry.kind.as_deref() != Some("playlist"))
        .filter_map(|entry| {
            let id = entry.id?;
            let url = entry
                .url
                .or(entry.webpage_url)
                .unwrap_or_else(|| format!("https://www.youtube.com/watch?v={id}"));
            Some(ItemSummary {
                title: entry.title.unwrap_or_else(|| id.clone()),
                url,
                duration_seconds: entry.duration,
                upload_date: entry.upload_date,
                view_count: entry.view_count,
                id,
            })
        })
        .collect()
}

/// Map a quality preference to a yt-dlp format selector
///
/// `best` (or anything without a height) prefers mp4/m4a and falls back to
/// whatever is best. A height such as `720p` caps the height first and then
/// falls back to the best overall format.
pub fn format_selector(quality: &str) -> String {
    const BEST: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/bestvideo+bestaudio/best[ext=mp4]/best";

    let height = quality
        .trim()
        .trim_end_matches(['p', 'P'])
        .parse::<u32>()
        .ok()
        .filter(|h| *h > 0);

    match height {
        Some(h) => format!(
            "bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/bestvideo[height<={h}]+bestaudio/best[height<={h}][ext=mp4]/best[height<={h}]/{BEST}"
        ),
        None => BEST.to_string(),
    }
}
