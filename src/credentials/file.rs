//! Netscape cookie-file credential store

use super::traits::{CredentialSnapshot, CredentialStore};
use crate::utils::remove_stale_files;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name of the primary stored credential
const PRIMARY_FILE: &str = "cookies.txt";
/// File name of the secondary stored credential
const SECONDARY_FILE: &str = "cookies.secondary.txt";

/// One cookie line from a Netscape cookie file
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CookieEntry {
    /// Cookie domain
    pub domain: String,
    /// Cookie name
    pub name: String,
    /// Expiry as a unix timestamp; `None` for session cookies
    pub expires_at: Option<i64>,
}

impl CookieEntry {
    /// Whether the cookie had expired at unix time `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|t| t <= now)
    }
}

/// Parse the cookie lines of a Netscape cookie file
///
/// Comment and blank lines are skipped, except `#HttpOnly_` lines which are
/// cookies. Lines without the seven tab-separated fields are ignored. An
/// expiry of `0` marks a session cookie.
///
/// # Examples
///
/// ```
/// use channel_tracker::credentials::parse_netscape_cookies;
///
/// let text = "# Netscape HTTP Cookie File\n\
///             .example.com\tTRUE\t/\tTRUE\t0\tSID\tabc\n";
/// let cookies = parse_netscape_cookies(text);
/// assert_eq!(cookies.len(), 1);
/// assert_eq!(cookies[0].expires_at, None);
/// ```
pub fn parse_netscape_cookies(text: &str) -> Vec<CookieEntry> {
    text.lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let line = match line.strip_prefix("#HttpOnly_") {
                Some(rest) => rest,
                None if line.starts_with('#') || line.trim().is_empty() => return None,
                None => line,
            };
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                return None;
            }
            let expiry: i64 = fields[4].trim().parse().ok()?;
            Some(CookieEntry {
                domain: fields[0].to_string(),
                name: fields[5].to_string(),
                expires_at: (expiry > 0).then_some(expiry),
            })
        })
        .collect()
}

/// State of one stored cookie file
#[derive(Debug, PartialEq, Eq)]
enum FileState {
    Missing,
    Valid,
    Expired,
    Unusable,
}

/// Credential store backed by a directory of Netscape cookie files
///
/// `cookies.txt` is the primary credential and `cookies.secondary.txt` the
/// secondary one. A file is expired when every cookie in it has expired;
/// session cookies never expire.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    /// Create a store over `dir`
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Directory holding the cookie files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stored_files(&self) -> [PathBuf; 2] {
        [self.dir.join(PRIMARY_FILE), self.dir.join(SECONDARY_FILE)]
    }

    async fn inspect(path: &Path) -> crate::Result<FileState> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileState::Missing),
            Err(e) => return Err(e.into()),
        };
        let cookies = parse_netscape_cookies(&text);
        if cookies.is_empty() {
            return Ok(FileState::Unusable);
        }
        let now = chrono::Utc::now().timestamp();
        if cookies.iter().all(|c| c.is_expired(now)) {
            Ok(FileState::Expired)
        } else {
            Ok(FileState::Valid)
        }
    }

    async fn existing(path: PathBuf) -> Option<PathBuf> {
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            _ => None,
        }
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn snapshot(&self) -> CredentialSnapshot {
        let [primary, secondary] = self.stored_files();
        CredentialSnapshot {
            primary: Self::existing(primary).await,
            secondary: Self::existing(secondary).await,
        }
    }

    async fn cleanup_expired(&self) -> crate::Result<usize> {
        let mut removed = 0;
        for path in self.stored_files() {
            if Self::inspect(&path).await? == FileState::Expired {
                tokio::fs::remove_file(&path).await?;
                tracing::info!(path = %path.display(), "removed expired credential");
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn cleanup_temp_files(&self, max_age: Duration) -> crate::Result<usize> {
        remove_stale_files(&self.dir, &["tmp"], max_age).await
    }

    async fn validate_active(&self) -> crate::Result<usize> {
        let mut invalid = 0;
        for path in self.stored_files() {
            match Self::inspect(&path).await? {
                FileState::Missing | FileState::Valid => {}
                state => {
                    tracing::warn!(path = %path.display(), ?state, "stored credential is not usable");
                    invalid += 1;
                }
            }
        }
        Ok(invalid)
    }

    fn name(&self) -> &'static str {
        "cookie-files"
    }
}
