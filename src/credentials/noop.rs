//! Credential store with nothing in it

use super::traits::{CredentialSnapshot, CredentialStore};
use async_trait::async_trait;
use std::time::Duration;

/// Store used when no credential directory is configured
///
/// Every snapshot is empty, so credential strategies are skipped and the engine
/// falls through to browser, headers-only and bare strategies.
pub struct NoCredentials;

#[async_trait]
impl CredentialStore for NoCredentials {
    async fn snapshot(&self) -> CredentialSnapshot {
        CredentialSnapshot::default()
    }

    async fn cleanup_expired(&self) -> crate::Result<usize> {
        Ok(0)
    }

    async fn cleanup_temp_files(&self, _max_age: Duration) -> crate::Result<usize> {
        Ok(0)
    }

    async fn validate_active(&self) -> crate::Result<usize> {
        Ok(0)
    }

    fn name(&self) -> &'static str {
        "none"
    }
}
