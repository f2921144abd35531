//! Fetch provider seam
//!
//! A [`FetchProvider`] performs one concrete invocation against the content
//! source with the credential, identity and pacing chosen by the execution
//! engine. Providers do no retrying of their own: failures are returned with
//! the tool's raw message so the engine can classify them.
//!
//! - [`YtDlpProvider`]: spawns the external `yt-dlp` binary

mod ytdlp;

pub use ytdlp::{YtDlpProvider, format_selector, parse_listing};

use crate::engine::InvocationDescriptor;
use crate::types::{AcquiredItem, ItemSummary};
use async_trait::async_trait;

/// Access to the content source
#[async_trait]
pub trait FetchProvider: Send + Sync {
    /// List the `limit` most recent items of a channel, newest first
    ///
    /// # Errors
    ///
    /// [`Error::Fetch`](crate::Error::Fetch) carrying the source's failure message,
    /// or [`Error::ExternalTool`](crate::Error::ExternalTool) when the tool
    /// cannot run at all.
    async fn list_recent_items(
        &self,
        source_url: &str,
        limit: usize,
        descriptor: &InvocationDescriptor,
    ) -> crate::Result<Vec<ItemSummary>>;

    /// Acquire one item's media at the given quality preference
    async fn acquire_item(
        &self,
        item_url: &str,
        quality: &str,
        descriptor: &InvocationDescriptor,
    ) -> crate::Result<AcquiredItem>;

    /// Name of this implementation
    fn name(&self) -> &'static str;
}
