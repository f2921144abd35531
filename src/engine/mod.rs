//! Resilient execution of external operations
//!
//! [`ExecutionEngine::execute`] turns one logical request ("list recent items",
//! "acquire item") into a round-robin walk over a strategy list. Each failure is
//! classified and a class-specific cool-down is slept before the next real
//! invocation. The first non-empty success wins. When the primary list is
//! exhausted, the optional advanced-bypass list gets a short second chance with
//! longer timeouts.
//!
//! Cancellation is cooperative: the engine checks its token before each
//! invocation and while cooling down, but never interrupts a running
//! invocation.

mod classify;
mod strategy;

pub use classify::{CooldownPolicy, FailureClass};
pub use strategy::{
    AttemptSlot, CredentialPlan, CredentialSource, IdentityPlan, IdentityProfile,
    InvocationDescriptor, Pacing, Strategy, advanced_strategies, default_strategies,
    desktop_profiles,
};

use crate::config::EngineConfig;
use crate::credentials::{CredentialSnapshot, CredentialStore};
use crate::error::{Error, Result};
use crate::types::{AcquiredItem, ItemSummary};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Result values the engine can recognise as "nothing came back"
///
/// An empty value is not a failure: the engine moves on to the next strategy
/// without a cool-down, and returns the empty value if nothing better turns up.
pub trait Outcome {
    /// Whether this value carries no data
    fn is_empty_outcome(&self) -> bool {
        false
    }
}

impl<T> Outcome for Vec<T> {
    fn is_empty_outcome(&self) -> bool {
        self.is_empty()
    }
}

impl Outcome for AcquiredItem {}

impl Outcome for () {}

/// Strategy-rotating executor for fetch-provider calls
///
/// Cheap to clone; all clones share the credential store and cancellation token.
#[derive(Clone)]
pub struct ExecutionEngine {
    config: EngineConfig,
    strategies: Arc<Vec<Strategy>>,
    advanced: Arc<Vec<Strategy>>,
    profiles: Arc<Vec<IdentityProfile>>,
    cooldowns: CooldownPolicy,
    credentials: Arc<dyn CredentialStore>,
    cancel: CancellationToken,
}

/// Running totals across the primary and advanced lists of one `execute` call
struct Progress<T> {
    invocations: u32,
    failures: u32,
    pending_cooldown: Option<Duration>,
    empty: Option<T>,
    last_failure: Option<(FailureClass, String)>,
}

impl ExecutionEngine {
    /// Engine with the default primary and advanced strategy lists
    pub fn new(config: EngineConfig, credentials: Arc<dyn CredentialStore>) -> Self {
        Self::with_strategies(
            config,
            credentials,
            default_strategies(),
            advanced_strategies(),
        )
    }

    /// Engine with explicit strategy lists
    pub fn with_strategies(
        config: EngineConfig,
        credentials: Arc<dyn CredentialStore>,
        strategies: Vec<Strategy>,
        advanced: Vec<Strategy>,
    ) -> Self {
        let cooldowns = CooldownPolicy::new(config.cooldowns.clone());
        Self {
            config,
            strategies: Arc::new(strategies),
            advanced: Arc::new(advanced),
            profiles: Arc::new(desktop_profiles()),
            cooldowns,
            credentials,
            cancel: CancellationToken::new(),
        }
    }

    /// Share a cancellation token (typically the scheduler's)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run `op` through the strategy lists
    ///
    /// `timeout` bounds each single invocation. `max_total_attempts` is the
    /// number of slots walked on the primary list; slots whose strategy has no
    /// descriptor are skipped without a cool-down.
    ///
    /// # Errors
    ///
    /// - [`Error::AttemptsExhausted`] when every attempt on both lists failed
    /// - [`Error::ShuttingDown`] when cancelled between attempts
    /// - [`Error::ExternalTool`] immediately, since a missing tool cannot recover
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        timeout: Duration,
        max_total_attempts: u32,
        mut op: F,
    ) -> Result<T>
    where
        T: Outcome,
        F: FnMut(InvocationDescriptor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let snapshot = self.credentials.snapshot().await;
        let mut progress = Progress {
            invocations: 0,
            failures: 0,
            pending_cooldown: None,
            empty: None,
            last_failure: None,
        };

        if let Some(value) = self
            .run_list(
                operation,
                &self.strategies,
                max_total_attempts,
                timeout,
                &snapshot,
                &mut op,
                &mut progress,
            )
            .await?
        {
            return Ok(value);
        }

        if let Some(empty) = progress.empty.take() {
            return Ok(empty);
        }

        let bypass = &self.config.advanced_bypass;
        if bypass.enabled && !self.advanced.is_empty() && bypass.max_attempts > 0 {
            tracing::info!(
                operation,
                attempts = bypass.max_attempts,
                "primary strategies exhausted, trying advanced bypass"
            );
            let advanced_timeout = timeout.saturating_mul(bypass.timeout_multiplier);
            if let Some(value) = self
                .run_list(
                    operation,
                    &self.advanced,
                    bypass.max_attempts,
                    advanced_timeout,
                    &snapshot,
                    &mut op,
                    &mut progress,
                )
                .await?
            {
                return Ok(value);
            }
            if let Some(empty) = progress.empty.take() {
                return Ok(empty);
            }
        }

        let (last_failure, last_error) = progress
            .last_failure
            .unwrap_or((FailureClass::Generic, "no strategy was applicable".to_string()));
        tracing::error!(
            operation,
            attempts = progress.invocations,
            class = %last_failure,
            error = %last_error,
            "all strategies exhausted"
        );
        Err(Error::AttemptsExhausted {
            operation: operation.to_string(),
            attempts: progress.invocations,
            last_failure,
            last_error,
        })
    }

    /// List recent items through the engine
    pub async fn list_recent_items<F, Fut>(&self, op: F) -> Result<Vec<ItemSummary>>
    where
        F: FnMut(InvocationDescriptor) -> Fut,
        Fut: Future<Output = Result<Vec<ItemSummary>>>,
    {
        self.execute(
            "list-items",
            self.config.list_timeout,
            self.config.max_total_attempts,
            op,
        )
        .await
    }

    /// Acquire one item through the engine
    pub async fn acquire_item<F, Fut>(&self, op: F) -> Result<AcquiredItem>
    where
        F: FnMut(InvocationDescriptor) -> Fut,
        Fut: Future<Output = Result<AcquiredItem>>,
    {
        self.execute(
            "acquire-item",
            self.config.acquire_timeout,
            self.config.max_total_attempts,
            op,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_list<T, F, Fut>(
        &self,
        operation: &str,
        list: &[Strategy],
        attempts: u32,
        timeout: Duration,
        snapshot: &CredentialSnapshot,
        op: &mut F,
        progress: &mut Progress<T>,
    ) -> Result<Option<T>>
    where
        T: Outcome,
        F: FnMut(InvocationDescriptor) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if list.is_empty() {
            return Ok(None);
        }

        for attempt in 0..attempts {
            let slot = AttemptSlot::round_robin(attempt, list.len(), timeout);
            let strategy = &list[slot.index];
            let Some(descriptor) = strategy.descriptor(slot, snapshot, &self.profiles) else {
                tracing::debug!(
                    operation,
                    attempt,
                    strategy = %strategy.name,
                    "strategy precondition unmet, skipping"
                );
                continue;
            };

            if let Some(delay) = progress.pending_cooldown.take() {
                tracing::debug!(
                    operation,
                    delay_ms = delay.as_millis() as u64,
                    "cooling down before next attempt"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => return Err(Error::ShuttingDown),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            if self.cancel.is_cancelled() {
                return Err(Error::ShuttingDown);
            }

            progress.invocations += 1;
            let result = match tokio::time::timeout(timeout, op(descriptor)).await {
                Ok(result) => result,
                Err(_) => Err(Error::Timeout(timeout)),
            };

            match result {
                Ok(value) if value.is_empty_outcome() => {
                    tracing::debug!(
                        operation,
                        attempt,
                        strategy = %strategy.name,
                        "empty result, trying next strategy"
                    );
                    progress.empty = Some(value);
                }
                Ok(value) => {
                    if progress.invocations > 1 {
                        tracing::info!(
                            operation,
                            attempts = progress.invocations,
                            strategy = %strategy.name,
                            "operation succeeded after retry"
                        );
                    }
                    return Ok(Some(value));
                }
                Err(e @ (Error::ExternalTool(_) | Error::ShuttingDown)) => return Err(e),
                Err(e) => {
                    let class = FailureClass::of(&e);
                    progress.failures += 1;
                    let delay = self.cooldowns.delay_for(class, progress.failures);
                    tracing::warn!(
                        operation,
                        attempt,
                        strategy = %strategy.name,
                        class = %class,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "attempt failed"
                    );
                    progress.pending_cooldown = Some(delay);
                    progress.last_failure = Some((class, e.to_string()));
                }
            }
        }

        Ok(None)
    }
}
