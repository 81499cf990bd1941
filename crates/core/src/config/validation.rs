//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, CacheTier, HashAlgorithm, parse_time_of_day};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn validate_tier(field: &str, tier: &CacheTier) -> Result<(), ConfigError> {
    if tier.max_size == 0 {
        return Err(invalid(field, "max_size must be greater than 0"));
    }
    if tier.ttl_minutes == 0 {
        return Err(invalid(field, "ttl_minutes must be greater than 0"));
    }
    Ok(())
}

fn validate_time(field: &str, value: &str) -> Result<(), ConfigError> {
    match parse_time_of_day(value) {
        Some(_) => Ok(()),
        None => Err(invalid(field, "expected HH:MM")),
    }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `timezone` is not a known IANA zone
    /// - a schedule time is not `HH:MM`
    /// - a cache tier has zero size or TTL
    /// - a backfill limit is 0
    /// - the duplicate threshold exceeds the 64-bit fingerprint width
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        self.tz()?;

        if self.update_concurrency == 0 {
            return Err(invalid("update_concurrency", "must be greater than 0"));
        }

        if self.retention_days == 0 {
            return Err(invalid("retention_days", "must be greater than 0"));
        }

        if self.duplicates.threshold > 64 {
            return Err(invalid("duplicates.threshold", "must not exceed 64 bits"));
        }
        if self.duplicates.window == 0 {
            return Err(invalid("duplicates.window", "must be greater than 0"));
        }
        if self.duplicates.algorithm == HashAlgorithm::Sha256 && self.duplicates.threshold > 0 {
            tracing::warn!(
                threshold = self.duplicates.threshold,
                "duplicates.threshold is ignored for sha256; only byte-identical images match"
            );
        }

        validate_tier("cache.navigation", &self.cache.navigation)?;
        validate_tier("cache.boundary", &self.cache.boundary)?;
        validate_tier("cache.navigation_dates", &self.cache.navigation_dates)?;
        validate_tier("cache.metadata", &self.cache.metadata)?;

        validate_time("scheduler.daily_time", &self.scheduler.daily_time)?;
        validate_time("scheduler.reconcile_time", &self.scheduler.reconcile_time)?;
        validate_time("scheduler.purge_time", &self.scheduler.purge_time)?;
        validate_time("scheduler.backfill_time", &self.scheduler.backfill_time)?;

        if self.backfill.max_consecutive_failures == 0 {
            return Err(invalid("backfill.max_consecutive_failures", "must be greater than 0"));
        }
        if self.backfill.max_per_run == 0 {
            return Err(invalid("backfill.max_per_run", "must be greater than 0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BackfillConfig, CacheConfig, DuplicateConfig, SchedulerConfig};

    #[test]
    fn test_default_config_is_valid() {
        assert!(AppConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_max_bytes_rejected() {
        let config = AppConfig { max_bytes: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "max_bytes"));
    }

    #[test]
    fn test_timeout_bounds() {
        let config = AppConfig { timeout_ms: 50, ..Default::default() };
        assert!(config.validate().is_err());
        let config = AppConfig { timeout_ms: 400_000, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let config = AppConfig { timezone: "Nowhere/Special".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "timezone"));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = AppConfig { update_concurrency: 0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold_bounds() {
        let config =
            AppConfig { duplicates: DuplicateConfig { threshold: 65, ..Default::default() }, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_cache_tier_rejected() {
        let mut cache = CacheConfig::default();
        cache.metadata.max_size = 0;
        let config = AppConfig { cache, ..Default::default() };
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "cache.metadata")
        );
    }

    #[test]
    fn test_bad_schedule_time_rejected() {
        let scheduler = SchedulerConfig { daily_time: "7 o'clock".into(), ..Default::default() };
        let config = AppConfig { scheduler, ..Default::default() };
        assert!(
            matches!(config.validate(), Err(ConfigError::Invalid { field, .. }) if field == "scheduler.daily_time")
        );
    }

    #[test]
    fn test_zero_backfill_limit_rejected() {
        let backfill = BackfillConfig { max_consecutive_failures: 0, ..Default::default() };
        let config = AppConfig { backfill, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "backfill.max_consecutive_failures"
        ));
    }
}
