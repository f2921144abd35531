//! Stored credential handling
//!
//! The execution engine's first strategies use stored credentials (exported
//! cookie files). This module puts that storage behind the [`CredentialStore`]
//! trait:
//!
//! - [`FileCredentialStore`]: Netscape cookie files in a directory
//! - [`NoCredentials`]: empty store when nothing is configured
//!
//! ## Usage
//!
//! ```no_run
//! use channel_tracker::credentials::{CredentialStore, FileCredentialStore};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = FileCredentialStore::new(PathBuf::from("credentials"));
//!     let snapshot = store.snapshot().await;
//!     if snapshot.primary.is_none() {
//!         println!("no primary cookie file, browser strategies will be used");
//!     }
//!     let removed = store.cleanup_expired().await?;
//!     println!("removed {removed} expired cookie files");
//!     Ok(())
//! }
//! ```

mod file;
mod noop;
mod traits;

pub use file::{CookieEntry, FileCredentialStore, parse_netscape_cookies};
pub use noop::NoCredentials;
pub use traits::{CredentialSnapshot, CredentialStore};
