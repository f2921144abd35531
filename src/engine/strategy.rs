//! Invocation strategies for the execution engine
//!
//! A [`Strategy`] is a recipe (credential source, identity choice) that turns an
//! attempt position into a concrete [`InvocationDescriptor`], or into nothing
//! when its precondition is unmet (for example a stored credential that does not
//! exist). The engine walks a strategy list round-robin; [`Strategy::descriptor`]
//! is where pass-dependent rotation and pacing growth happen.

use crate::credentials::CredentialSnapshot;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where the invocation takes its credential from
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CredentialSource {
    /// A stored credential file
    Stored(PathBuf),
    /// Cookies exported from a locally installed browser
    Browser(String),
    /// No credential
    None,
}

/// A user-agent/header bundle presented to the content source
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// Short name used in logs
    pub name: String,
    /// User agent, if one is sent
    pub user_agent: Option<String>,
    /// Extra request headers
    pub headers: Vec<(String, String)>,
    /// Alternative player client requested from the source, if any
    pub player_client: Option<String>,
}

impl IdentityProfile {
    /// Profile that sends nothing beyond the tool's defaults
    pub fn bare() -> Self {
        Self {
            name: "bare".into(),
            user_agent: None,
            headers: Vec::new(),
            player_client: None,
        }
    }

    fn desktop(name: &str, user_agent: &str, language: &str) -> Self {
        Self {
            name: name.into(),
            user_agent: Some(user_agent.into()),
            headers: vec![
                ("Accept-Language".into(), language.into()),
                (
                    "Accept".into(),
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".into(),
                ),
            ],
            player_client: None,
        }
    }

    fn client(name: &str, user_agent: &str, player_client: &str) -> Self {
        Self {
            name: name.into(),
            user_agent: Some(user_agent.into()),
            headers: vec![("Accept-Language".into(), "en-US,en;q=0.9".into())],
            player_client: Some(player_client.into()),
        }
    }
}

/// Desktop browser bundles rotated across passes
pub fn desktop_profiles() -> Vec<IdentityProfile> {
    vec![
        IdentityProfile::desktop(
            "chrome-windows",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
            "en-US,en;q=0.9",
        ),
        IdentityProfile::desktop(
            "firefox-linux",
            "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
            "en-US,en;q=0.5",
        ),
        IdentityProfile::desktop(
            "safari-macos",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
            "en-GB,en;q=0.9",
        ),
        IdentityProfile::desktop(
            "edge-windows",
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36 Edg/124.0.0.0",
            "en-US,en;q=0.9",
        ),
    ]
}

/// Sleep bounds handed to the external tool between its own requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacing {
    /// Lower bound
    pub min: Duration,
    /// Upper bound
    pub max: Duration,
}

impl Pacing {
    /// Bounds for the given pass: `1 + pass` to `3 + 2 * pass` seconds
    pub fn for_pass(pass: u32) -> Self {
        let pass = u64::from(pass);
        Self {
            min: Duration::from_secs(1 + pass),
            max: Duration::from_secs(3 + 2 * pass),
        }
    }
}

/// Everything a provider needs for one concrete invocation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationDescriptor {
    /// Name of the strategy that produced this descriptor
    pub strategy: String,
    /// Position of the strategy in its list
    pub strategy_index: usize,
    /// Zero-based attempt number within the list
    pub attempt: u32,
    /// How many times the list has wrapped around before this attempt
    pub pass: u32,
    /// Credential source
    pub credential: CredentialSource,
    /// Identity profile
    pub identity: IdentityProfile,
    /// Tool-side pacing
    pub pacing: Pacing,
    /// Hard timeout for the invocation
    pub timeout: Duration,
}

/// Which credential a strategy requires
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialPlan {
    /// Stored primary credential; skipped when absent
    Primary,
    /// Stored secondary credential; skipped when absent
    Secondary,
    /// Browser-exported cookies from the named browser
    Browser(String),
    /// No credential
    None,
}

/// How a strategy picks its identity profile
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityPlan {
    /// Rotate through the desktop profiles by `(index + pass)`
    Rotating,
    /// Always send no identity headers
    Bare,
    /// Always use this profile
    Fixed(IdentityProfile),
}

/// One way of attempting an external operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Strategy {
    /// Name used in logs and descriptors
    pub name: String,
    /// Credential requirement
    pub credential: CredentialPlan,
    /// Identity choice
    pub identity: IdentityPlan,
}

/// Position of one attempt within a strategy list
#[derive(Clone, Copy, Debug)]
pub struct AttemptSlot {
    /// Index of the selected strategy
    pub index: usize,
    /// Zero-based attempt number
    pub attempt: u32,
    /// Completed passes over the list
    pub pass: u32,
    /// Timeout for the invocation
    pub timeout: Duration,
}

impl AttemptSlot {
    /// Round-robin slot for `attempt` over a list of `len` strategies
    pub fn round_robin(attempt: u32, len: usize, timeout: Duration) -> Self {
        let len = len.max(1);
        let attempt_usize = attempt as usize;
        Self {
            index: attempt_usize % len,
            attempt,
            pass: (attempt_usize / len) as u32,
            timeout,
        }
    }
}

impl Strategy {
    /// Create a strategy
    pub fn new(name: impl Into<String>, credential: CredentialPlan, identity: IdentityPlan) -> Self {
        Self {
            name: name.into(),
            credential,
            identity,
        }
    }

    /// Build the descriptor for `slot`, or `None` if the credential is unavailable
    pub fn descriptor(
        &self,
        slot: AttemptSlot,
        credentials: &CredentialSnapshot,
        profiles: &[IdentityProfile],
    ) -> Option<InvocationDescriptor> {
        let credential = match &self.credential {
            CredentialPlan::Primary => CredentialSource::Stored(credentials.primary.clone()?),
            CredentialPlan::Secondary => CredentialSource::Stored(credentials.secondary.clone()?),
            CredentialPlan::Browser(browser) => CredentialSource::Browser(browser.clone()),
            CredentialPlan::None => CredentialSource::None,
        };

        let identity = match &self.identity {
            IdentityPlan::Rotating if !profiles.is_empty() => {
                profiles[(slot.index + slot.pass as usize) % profiles.len()].clone()
            }
            IdentityPlan::Rotating | IdentityPlan::Bare => IdentityProfile::bare(),
            IdentityPlan::Fixed(profile) => profile.clone(),
        };

        Some(InvocationDescriptor {
            strategy: self.name.clone(),
            strategy_index: slot.index,
            attempt: slot.attempt,
            pass: slot.pass,
            credential,
            identity,
            pacing: Pacing::for_pass(slot.pass),
            timeout: slot.timeout,
        })
    }
}

/// Primary list: stored credentials first, then browsers, then progressively less
pub fn default_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new("primary-credential", CredentialPlan::Primary, IdentityPlan::Rotating),
        Strategy::new(
            "secondary-credential",
            CredentialPlan::Secondary,
            IdentityPlan::Rotating,
        ),
        Strategy::new(
            "browser-chrome",
            CredentialPlan::Browser("chrome".into()),
            IdentityPlan::Rotating,
        ),
        Strategy::new(
            "browser-firefox",
            CredentialPlan::Browser("firefox".into()),
            IdentityPlan::Rotating,
        ),
        Strategy::new(
            "browser-edge",
            CredentialPlan::Browser("edge".into()),
            IdentityPlan::Rotating,
        ),
        Strategy::new("headers-only", CredentialPlan::None, IdentityPlan::Rotating),
        Strategy::new("bare", CredentialPlan::None, IdentityPlan::Bare),
    ]
}

/// Advanced-bypass list: alternative player clients, no stored credential needed
pub fn advanced_strategies() -> Vec<Strategy> {
    vec![
        Strategy::new(
            "client-android",
            CredentialPlan::None,
            IdentityPlan::Fixed(IdentityProfile::client(
                "android",
                "com.google.android.youtube/19.09.37 (Linux; U; Android 14) gzip",
                "android",
            )),
        ),
        Strategy::new(
            "client-ios",
            CredentialPlan::None,
            IdentityPlan::Fixed(IdentityProfile::client(
                "ios",
                "com.google.ios.youtube/19.09.3 (iPhone16,2; U; CPU iOS 17_4 like Mac OS X)",
                "ios",
            )),
        ),
        Strategy::new(
            "client-tv",
            CredentialPlan::None,
            IdentityPlan::Fixed(IdentityProfile::client(
                "tv",
                "Mozilla/5.0 (SMART-TV; Linux; Tizen 6.0) AppleWebKit/538.1 (KHTML, like Gecko) Version/6.0 TV Safari/538.1",
                "tv_embedded",
            )),
        ),
    ]
}
