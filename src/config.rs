//! Configuration types for channel-tracker

use crate::error::{Error, Result};
use crate::scheduler::triggers::{Weekday, time_format};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Sweep cadence, fan-out and auxiliary trigger settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between channel sweeps (default: 15 minutes)
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// Delay before the one-shot initial sweep after `start()` (default: 2 minutes)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum channels processed concurrently within a sweep (default: 5)
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Pause between batches (default: 10 seconds)
    #[serde(
        default = "default_batch_cooldown",
        rename = "batch_cooldown_ms",
        with = "duration_ms_serde"
    )]
    pub batch_cooldown: Duration,

    /// Local time of the daily cleanup (default: 03:00)
    #[serde(default = "default_cleanup_at", with = "time_format")]
    pub cleanup_at: NaiveTime,

    /// Day of the weekly maintenance (default: Sunday)
    #[serde(default = "default_maintenance_day")]
    pub maintenance_day: Weekday,

    /// Local time of the weekly maintenance (default: 02:00)
    #[serde(default = "default_maintenance_at", with = "time_format")]
    pub maintenance_at: NaiveTime,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: default_check_interval(),
            initial_delay: default_initial_delay(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            batch_cooldown: default_batch_cooldown(),
            cleanup_at: default_cleanup_at(),
            maintenance_day: default_maintenance_day(),
            maintenance_at: default_maintenance_at(),
        }
    }
}

/// When the channel high-water mark (`last_known_item_id`) moves forward
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighWaterMark {
    /// Advance only past items that were acquired (or already recorded).
    /// A failed item stays above the mark and is walked again next sweep.
    #[default]
    Confirmed,
    /// Advance to the newest item as soon as the first new item is found,
    /// even if its acquisition later fails.
    FirstFound,
}

/// Per-channel processing settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Attempts per channel pass before recording a failure (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Fixed delay between channel attempts (default: 5 seconds)
    #[serde(
        default = "default_retry_delay",
        rename = "retry_delay_ms",
        with = "duration_ms_serde"
    )]
    pub retry_delay: Duration,

    /// Number of most recent items requested per channel (default: 3)
    #[serde(default = "default_recent_item_limit")]
    pub recent_item_limit: usize,

    /// Delay between successive item acquisitions (default: 2 seconds)
    #[serde(
        default = "default_item_delay",
        rename = "item_delay_ms",
        with = "duration_ms_serde"
    )]
    pub item_delay: Duration,

    /// Error count at which a channel is deactivated (default: 5)
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Weekly maintenance reactivates inactive channels below this error count (default: 10)
    #[serde(default = "default_reactivation_threshold")]
    pub reactivation_threshold: u32,

    /// High-water mark policy (default: confirmed)
    #[serde(default)]
    pub high_water_mark: HighWaterMark,

    /// Quality used when a channel has none set (default: "best")
    #[serde(default = "default_quality")]
    pub default_quality: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            retry_attempts: default_retry_attempts(),
            retry_delay: default_retry_delay(),
            recent_item_limit: default_recent_item_limit(),
            item_delay: default_item_delay(),
            error_threshold: default_error_threshold(),
            reactivation_threshold: default_reactivation_threshold(),
            high_water_mark: HighWaterMark::default(),
            default_quality: default_quality(),
        }
    }
}

/// Cool-down applied between engine attempts, per failure class
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// First cool-down for bot-detection and rate-limit failures (default: 10s)
    #[serde(
        default = "default_escalating_base",
        rename = "escalating_base_ms",
        with = "duration_ms_serde"
    )]
    pub escalating_base: Duration,

    /// Added per attempt for bot-detection and rate-limit failures (default: 5s)
    #[serde(
        default = "default_escalating_step",
        rename = "escalating_step_ms",
        with = "duration_ms_serde"
    )]
    pub escalating_step: Duration,

    /// Upper bound for the escalating tiers (default: 30s)
    #[serde(
        default = "default_escalating_cap",
        rename = "escalating_cap_ms",
        with = "duration_ms_serde"
    )]
    pub escalating_cap: Duration,

    /// Cool-down after a forbidden failure (default: 15s)
    #[serde(
        default = "default_forbidden_cooldown",
        rename = "forbidden_ms",
        with = "duration_ms_serde"
    )]
    pub forbidden: Duration,

    /// Cool-down after an unavailable/private failure (default: 2s)
    #[serde(
        default = "default_unavailable_cooldown",
        rename = "unavailable_ms",
        with = "duration_ms_serde"
    )]
    pub unavailable: Duration,

    /// Cool-down after any other failure (default: 3s)
    #[serde(
        default = "default_generic_cooldown",
        rename = "generic_ms",
        with = "duration_ms_serde"
    )]
    pub generic: Duration,

    /// Add up to 25% random jitter to each cool-down (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            escalating_base: default_escalating_base(),
            escalating_step: default_escalating_step(),
            escalating_cap: default_escalating_cap(),
            forbidden: default_forbidden_cooldown(),
            unavailable: default_unavailable_cooldown(),
            generic: default_generic_cooldown(),
            jitter: true,
        }
    }
}

/// Secondary strategy list tried once the primary list is exhausted
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AdvancedBypassConfig {
    /// Whether the advanced path runs at all (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Attempts on the advanced list (default: 3)
    #[serde(default = "default_advanced_attempts")]
    pub max_attempts: u32,

    /// Timeout multiplier applied to advanced attempts (default: 2)
    #[serde(default = "default_timeout_multiplier")]
    pub timeout_multiplier: u32,
}

impl Default for AdvancedBypassConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_advanced_attempts(),
            timeout_multiplier: default_timeout_multiplier(),
        }
    }
}

/// Execution engine settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Attempts across the primary strategy list (default: 6)
    #[serde(default = "default_max_total_attempts")]
    pub max_total_attempts: u32,

    /// Hard timeout for one listing invocation (default: 60 seconds)
    #[serde(default = "default_list_timeout", with = "duration_serde")]
    pub list_timeout: Duration,

    /// Hard timeout for one acquisition invocation (default: 5 minutes)
    #[serde(default = "default_acquire_timeout", with = "duration_serde")]
    pub acquire_timeout: Duration,

    /// Failure-class cool-downs
    #[serde(default)]
    pub cooldowns: CooldownConfig,

    /// Advanced-bypass path
    #[serde(default)]
    pub advanced_bypass: AdvancedBypassConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_total_attempts: default_max_total_attempts(),
            list_timeout: default_list_timeout(),
            acquire_timeout: default_acquire_timeout(),
            cooldowns: CooldownConfig::default(),
            advanced_bypass: AdvancedBypassConfig::default(),
        }
    }
}

/// File system locations and external binaries
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file (default: "channel-tracker.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Where acquired media lands (default: "downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Scratch directory swept by the daily cleanup (default: "temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory holding stored credential files (default: "credentials")
    #[serde(default = "default_credentials_dir")]
    pub credentials_dir: PathBuf,

    /// Leftover partial files older than this are deleted (default: 7 days)
    #[serde(default = "default_temp_file_max_age", with = "duration_serde")]
    pub temp_file_max_age: Duration,

    /// Explicit yt-dlp binary (None = search PATH)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            download_dir: default_download_dir(),
            temp_dir: default_temp_dir(),
            credentials_dir: default_credentials_dir(),
            temp_file_max_age: default_temp_file_max_age(),
            ytdlp_path: None,
        }
    }
}

/// Main configuration for channel-tracker
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sweep cadence and fan-out
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Per-channel processing
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Execution engine
    #[serde(default)]
    pub engine: EngineConfig,

    /// Paths and binaries
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load and validate a JSON configuration file
    pub async fn from_json_file(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the scheduler cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_concurrent_jobs == 0 {
            return Err(Error::config(
                "max_concurrent_jobs",
                "must process at least one channel at a time",
            ));
        }
        if self.scheduler.check_interval.is_zero() {
            return Err(Error::config("check_interval", "must be greater than zero"));
        }
        if self.processor.retry_attempts == 0 {
            return Err(Error::config("retry_attempts", "must be at least 1"));
        }
        if self.processor.recent_item_limit == 0 {
            return Err(Error::config("recent_item_limit", "must be at least 1"));
        }
        if self.processor.error_threshold == 0 {
            return Err(Error::config("error_threshold", "must be at least 1"));
        }
        if self.engine.max_total_attempts == 0 {
            return Err(Error::config("max_total_attempts", "must be at least 1"));
        }
        if self.engine.list_timeout.is_zero() {
            return Err(Error::config("list_timeout", "must be greater than zero"));
        }
        if self.engine.acquire_timeout.is_zero() {
            return Err(Error::config("acquire_timeout", "must be greater than zero"));
        }
        let cd = &self.engine.cooldowns;
        if cd.escalating_base > cd.escalating_cap {
            return Err(Error::config(
                "escalating_base_ms",
                "escalating base cool-down exceeds its cap",
            ));
        }
        if self.engine.advanced_bypass.timeout_multiplier == 0 {
            return Err(Error::config("timeout_multiplier", "must be at least 1"));
        }
        Ok(())
    }
}

// Default value functions
fn default_check_interval() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(2 * 60)
}

fn default_max_concurrent_jobs() -> usize {
    5
}

fn default_batch_cooldown() -> Duration {
    Duration::from_secs(10)
}

fn default_cleanup_at() -> NaiveTime {
    NaiveTime::from_hms_opt(3, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_maintenance_day() -> Weekday {
    Weekday::Sunday
}

fn default_maintenance_at() -> NaiveTime {
    NaiveTime::from_hms_opt(2, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_recent_item_limit() -> usize {
    3
}

fn default_item_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_error_threshold() -> u32 {
    5
}

fn default_reactivation_threshold() -> u32 {
    10
}

fn default_quality() -> String {
    "best".into()
}

fn default_escalating_base() -> Duration {
    Duration::from_secs(10)
}

fn default_escalating_step() -> Duration {
    Duration::from_secs(5)
}

fn default_escalating_cap() -> Duration {
    Duration::from_secs(30)
}

fn default_forbidden_cooldown() -> Duration {
    Duration::from_secs(15)
}

fn default_unavailable_cooldown() -> Duration {
    Duration::from_secs(2)
}

fn default_generic_cooldown() -> Duration {
    Duration::from_secs(3)
}

fn default_advanced_attempts() -> u32 {
    3
}

fn default_timeout_multiplier() -> u32 {
    2
}

fn default_max_total_attempts() -> u32 {
    6
}

fn default_list_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("channel-tracker.db")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("temp")
}

fn default_credentials_dir() -> PathBuf {
    PathBuf::from("credentials")
}

fn default_temp_file_max_age() -> Duration {
    Duration::from_secs(7 * 24 * 60 * 60)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Duration serialization helper (milliseconds)
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
