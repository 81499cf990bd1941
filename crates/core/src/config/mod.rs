//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (STRIPS_*, nested tables split on `__`)
//! 2. TOML config file (if STRIPS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (STRIPS_*)
/// 2. TOML config file (if STRIPS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Root directory of the strip archive.
    ///
    /// Set via STRIPS_ARCHIVE_ROOT environment variable.
    #[serde(default = "default_archive_root")]
    pub archive_root: PathBuf,

    /// Path to the SQLite state database (retrieval records, task runs).
    ///
    /// Set via STRIPS_STATE_DB_PATH environment variable.
    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,

    /// Path to the JSON comic catalog.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Path to the JSON bootstrap list. Reconciliation is skipped when absent.
    #[serde(default)]
    pub bootstrap_path: Option<PathBuf>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Per-fetch timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether to respect robots.txt rules.
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// Whether sources may use the headless browser.
    #[serde(default)]
    pub render_enabled: bool,

    /// IANA timezone that defines "today" and the daily schedule.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Maximum comics updated concurrently.
    #[serde(default = "default_update_concurrency")]
    pub update_concurrency: usize,

    /// Days of retrieval records to keep.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    #[serde(default)]
    pub duplicates: DuplicateConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub backfill: BackfillConfig,
}

/// Duplicate-detection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateConfig {
    /// When off every valid image is stored.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub algorithm: HashAlgorithm,

    /// Maximum Hamming distance still treated as a duplicate.
    #[serde(default = "default_threshold")]
    pub threshold: u32,

    /// Number of most recent strips in the year compared against.
    #[serde(default = "default_window")]
    pub window: usize,
}

/// Fingerprint function used for duplicate detection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Difference hash over a 9x8 grayscale grid.
    #[default]
    Dhash,
    /// Average hash over an 8x8 grayscale grid.
    Ahash,
    /// Byte-exact content hash, no perceptual tolerance.
    Sha256,
}

/// Size and lifetime of one in-memory cache tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTier {
    /// Entries kept before the least recently used one is evicted.
    pub max_size: usize,
    pub ttl_minutes: u64,
}

impl CacheTier {
    /// Entry lifetime as a [`Duration`].
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

/// Tiers of the navigation cache plus look-ahead warming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_navigation_tier")]
    pub navigation: CacheTier,

    #[serde(default = "default_boundary_tier")]
    pub boundary: CacheTier,

    #[serde(default = "default_navigation_dates_tier")]
    pub navigation_dates: CacheTier,

    #[serde(default = "default_metadata_tier")]
    pub metadata: CacheTier,

    #[serde(default = "default_true")]
    pub lookahead_enabled: bool,

    /// Strips warmed ahead of each navigation in the travel direction.
    #[serde(default = "default_lookahead_count")]
    pub lookahead_count: usize,
}

/// Which built-in jobs run and when. Times are in the reference timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub daily_enabled: bool,

    /// Local wall-clock time (HH:MM) of the daily update.
    #[serde(default = "default_daily_time")]
    pub daily_time: String,

    #[serde(default = "default_true")]
    pub reconcile_enabled: bool,

    #[serde(default = "default_reconcile_time")]
    pub reconcile_time: String,

    #[serde(default = "default_true")]
    pub purge_enabled: bool,

    #[serde(default = "default_purge_time")]
    pub purge_time: String,

    #[serde(default = "default_true")]
    pub backfill_enabled: bool,

    /// Local time (HH:MM) of the year backfill, after the daily update.
    #[serde(default = "default_backfill_time")]
    pub backfill_time: String,
}

/// Gap filling for past strips.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillConfig {
    /// Year scanned for missing strips; the current year when unset.
    #[serde(default)]
    pub target_year: Option<i32>,

    /// Consecutive unavailable dates after which a comic's scan stops.
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,

    /// Maximum download attempts per comic per run.
    #[serde(default = "default_max_per_run")]
    pub max_per_run: usize,
}

fn default_archive_root() -> PathBuf {
    PathBuf::from("./archive")
}

fn default_state_db_path() -> PathBuf {
    PathBuf::from("./strips-state.sqlite")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("./comics.json")
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36".into()
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "America/New_York".into()
}

fn default_update_concurrency() -> usize {
    4
}

fn default_retention_days() -> u32 {
    7
}

fn default_threshold() -> u32 {
    5
}

fn default_window() -> usize {
    30
}

fn default_navigation_tier() -> CacheTier {
    CacheTier { max_size: 300, ttl_minutes: 10 }
}

fn default_boundary_tier() -> CacheTier {
    CacheTier { max_size: 100, ttl_minutes: 60 }
}

fn default_navigation_dates_tier() -> CacheTier {
    CacheTier { max_size: 200, ttl_minutes: 30 }
}

fn default_metadata_tier() -> CacheTier {
    CacheTier { max_size: 60, ttl_minutes: 60 }
}

fn default_lookahead_count() -> usize {
    3
}

fn default_daily_time() -> String {
    "07:00".into()
}

fn default_reconcile_time() -> String {
    "06:00".into()
}

fn default_purge_time() -> String {
    "02:30".into()
}

fn default_backfill_time() -> String {
    "03:30".into()
}

fn default_max_consecutive_failures() -> u32 {
    3
}

fn default_max_per_run() -> usize {
    50
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            algorithm: HashAlgorithm::default(),
            threshold: default_threshold(),
            window: default_window(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            navigation: default_navigation_tier(),
            boundary: default_boundary_tier(),
            navigation_dates: default_navigation_dates_tier(),
            metadata: default_metadata_tier(),
            lookahead_enabled: true,
            lookahead_count: default_lookahead_count(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            daily_enabled: true,
            daily_time: default_daily_time(),
            reconcile_enabled: true,
            reconcile_time: default_reconcile_time(),
            purge_enabled: true,
            purge_time: default_purge_time(),
            backfill_enabled: true,
            backfill_time: default_backfill_time(),
        }
    }
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            target_year: None,
            max_consecutive_failures: default_max_consecutive_failures(),
            max_per_run: default_max_per_run(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            archive_root: default_archive_root(),
            state_db_path: default_state_db_path(),
            catalog_path: default_catalog_path(),
            bootstrap_path: None,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            respect_robots: true,
            render_enabled: false,
            timezone: default_timezone(),
            update_concurrency: default_update_concurrency(),
            retention_days: default_retention_days(),
            duplicates: DuplicateConfig::default(),
            cache: CacheConfig::default(),
            scheduler: SchedulerConfig::default(),
            backfill: BackfillConfig::default(),
        }
    }
}

/// Parse a `HH:MM` wall-clock time.
pub fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reference timezone.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an unknown IANA name.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone.parse::<Tz>().map_err(|e| ConfigError::Invalid {
            field: "timezone".into(),
            reason: e.to_string(),
        })
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `STRIPS_`
    /// 2. TOML file from `STRIPS_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("STRIPS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("STRIPS_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
