//! Failure classification and cool-down policy.
//!
//! The fetch tool only reports failures as text, so classification matches the
//! message against a fixed set of patterns. Rules are checked in order and the
//! first match wins; anything unmatched is [`FailureClass::Generic`].

use crate::config::CooldownConfig;
use crate::error::Error;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

/// Category of an external-operation failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureClass {
    /// The source asked us to prove we are not a bot
    BotDetection,
    /// Too many requests
    RateLimited,
    /// Access denied for this identity
    Forbidden,
    /// Content is gone or private; more retries are unlikely to help
    Unavailable,
    /// Anything else, including timeouts
    Generic,
}

impl FailureClass {
    /// Stable kebab-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClass::BotDetection => "bot-detection",
            FailureClass::RateLimited => "rate-limited",
            FailureClass::Forbidden => "forbidden",
            FailureClass::Unavailable => "unavailable",
            FailureClass::Generic => "generic",
        }
    }

    /// Classify a failure message
    pub fn classify(message: &str) -> Self {
        RULES
            .iter()
            .find(|(pattern, _)| pattern.is_match(message))
            .map(|(_, class)| *class)
            .unwrap_or(FailureClass::Generic)
    }

    /// Classify a crate error; timeouts are always generic
    pub fn of(error: &Error) -> Self {
        match error {
            Error::Timeout(_) => FailureClass::Generic,
            Error::AttemptsExhausted { last_failure, .. } => *last_failure,
            other => Self::classify(&other.to_string()),
        }
    }
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Word boundaries keep ids such as "abc429x" or "robotics" from matching.
static RULES: LazyLock<Vec<(Regex, FailureClass)>> = LazyLock::new(|| {
    [
        (
            r"(?i)\bbots?\b|sign in to confirm|\bsign in\b|captcha",
            FailureClass::BotDetection,
        ),
        (
            r"(?i)\b429\b|rate[- ]?limit|too many requests",
            FailureClass::RateLimited,
        ),
        (r"(?i)\b403\b|forbidden", FailureClass::Forbidden),
        (
            r"(?i)\bprivate\b|unavailable|\bremoved\b|\b404\b|does not exist|members[- ]only",
            FailureClass::Unavailable,
        ),
    ]
    .into_iter()
    .filter_map(|(pattern, class)| match Regex::new(pattern) {
        Ok(re) => Some((re, class)),
        Err(e) => {
            tracing::error!(pattern, error = %e, "invalid classification pattern");
            None
        }
    })
    .collect()
});

/// Maps a failure class and attempt number to a cool-down
#[derive(Clone, Debug)]
pub struct CooldownPolicy {
    config: CooldownConfig,
}

impl CooldownPolicy {
    /// Create a policy from configuration
    pub fn new(config: CooldownConfig) -> Self {
        Self { config }
    }

    /// Cool-down before the attempt following a failure.
    ///
    /// `failures` counts failed invocations so far (1 after the first failure).
    /// Bot-detection and rate-limit delays grow by one step per failure up to
    /// the cap; the other classes use fixed delays.
    pub fn delay_for(&self, class: FailureClass, failures: u32) -> Duration {
        let cfg = &self.config;
        let base = match class {
            FailureClass::BotDetection | FailureClass::RateLimited => {
                let steps = failures.saturating_sub(1);
                let grown = cfg.escalating_base + cfg.escalating_step.saturating_mul(steps);
                grown.min(cfg.escalating_cap)
            }
            FailureClass::Forbidden => cfg.forbidden,
            FailureClass::Unavailable => cfg.unavailable,
            FailureClass::Generic => cfg.generic,
        };
        if cfg.jitter { add_jitter(base) } else { base }
    }
}

/// Add up to 25% random jitter so parallel channels do not retry in lockstep
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=0.25);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
