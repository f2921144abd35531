//! Traits and types for stored credentials

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Which stored credentials exist at the moment of a snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CredentialSnapshot {
    /// Primary credential file, if stored
    pub primary: Option<PathBuf>,
    /// Secondary credential file, if stored
    pub secondary: Option<PathBuf>,
}

impl CredentialSnapshot {
    /// True when no stored credential is available
    pub fn is_empty(&self) -> bool {
        self.primary.is_none() && self.secondary.is_none()
    }
}

/// Access to stored credentials used by the execution engine
///
/// The engine takes one [`snapshot`](CredentialStore::snapshot) per logical
/// operation to decide which credential strategies are applicable. The
/// housekeeping methods are driven by the scheduler's cleanup and maintenance
/// triggers.
///
/// # Examples
///
/// ```
/// use channel_tracker::credentials::{CredentialStore, NoCredentials};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let store = NoCredentials;
/// assert!(store.snapshot().await.is_empty());
/// assert_eq!(store.cleanup_expired().await?, 0);
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Which stored credentials currently exist
    async fn snapshot(&self) -> CredentialSnapshot;

    /// Remove stored credentials that have expired
    ///
    /// # Returns
    ///
    /// Number of credentials removed
    async fn cleanup_expired(&self) -> crate::Result<usize>;

    /// Remove temporary files older than `max_age`
    ///
    /// # Returns
    ///
    /// Number of files removed
    async fn cleanup_temp_files(&self, max_age: Duration) -> crate::Result<usize>;

    /// Check every stored credential
    ///
    /// # Returns
    ///
    /// Number of stored credentials that failed validation
    async fn validate_active(&self) -> crate::Result<usize>;

    /// Name of this implementation
    fn name(&self) -> &'static str;
}
