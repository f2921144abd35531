//! Common test utilities for channel-tracker integration tests

use async_trait::async_trait;
use channel_tracker::engine::InvocationDescriptor;
use channel_tracker::fetch::FetchProvider;
use channel_tracker::types::AcquiredItem;
use channel_tracker::{Error, ItemSummary, Result};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Mutex;

/// Fetch provider serving fixed listings and writing nothing to disk
#[derive(Default)]
pub struct FakeProvider {
    listings: Mutex<HashMap<String, Vec<String>>>,
    failing: Mutex<HashSet<String>>,
    acquired: Mutex<Vec<String>>,
}

impl FakeProvider {
    /// `url` lists `ids`, newest first
    pub fn set_listing(&self, url: &str, ids: &[&str]) {
        self.listings.lock().unwrap().insert(
            url.to_string(),
            ids.iter().map(|id| id.to_string()).collect(),
        );
    }

    /// Listing `url` always fails as a rate-limited request would
    pub fn fail_channel(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    /// Item ids acquired so far
    pub fn acquired(&self) -> Vec<String> {
        self.acquired.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchProvider for FakeProvider {
    async fn list_recent_items(
        &self,
        source_url: &str,
        limit: usize,
        _descriptor: &InvocationDescriptor,
    ) -> Result<Vec<ItemSummary>> {
        if self.failing.lock().unwrap().contains(source_url) {
            return Err(Error::Fetch("HTTP Error 429: Too Many Requests".into()));
        }
        let ids = self
            .listings
            .lock()
            .unwrap()
            .get(source_url)
            .cloned()
            .unwrap_or_default();
        Ok(ids
            .into_iter()
            .take(limit)
            .map(|id| ItemSummary {
                title: format!("Item {id}"),
                url: format!("https://example.com/watch?v={id}"),
                id,
                duration_seconds: Some(42.0),
                upload_date: Some("20240501".into()),
                view_count: None,
            })
            .collect())
    }

    async fn acquire_item(
        &self,
        item_url: &str,
        _quality: &str,
        _descriptor: &InvocationDescriptor,
    ) -> Result<AcquiredItem> {
        let id = item_url.rsplit('=').next().unwrap_or(item_url).to_string();
        self.acquired.lock().unwrap().push(id.clone());
        Ok(AcquiredItem {
            file_path: PathBuf::from(format!("/media/{id}.webm")),
            thumbnail_path: None,
            metadata_path: Some(PathBuf::from(format!("/media/{id}.info.json"))),
            file_size_bytes: Some(4096),
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}
