//! Configuration types

use crate::{AttributionError, AttributionResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observations age out this long after the last write to their key.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 24 * 60 * 60);

/// Longest accepted retention window (100 years).
pub const MAX_RETENTION: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Namespace prefix for every observation key.
pub const DEFAULT_KEY_PREFIX: &str = "SM:";

/// Default number of in-flight store queries per `resolve` call.
pub const DEFAULT_QUERY_CONCURRENCY: usize = 16;

/// Default LMDB map size in megabytes.
pub const DEFAULT_LMDB_MAX_SIZE_MB: usize = 256;

/// Configuration shared by the observation store and the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributionConfig {
    /// Prefix namespacing observation keys in the backend.
    pub key_prefix: String,
    /// Sliding retention window, refreshed on every write to a key.
    pub retention: Duration,
    /// Maximum concurrent store queries issued by one `resolve` call.
    pub query_concurrency: usize,
    /// LMDB map size in megabytes (only used by the LMDB backend).
    pub lmdb_max_size_mb: usize,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            retention: DEFAULT_RETENTION,
            query_concurrency: DEFAULT_QUERY_CONCURRENCY,
            lmdb_max_size_mb: DEFAULT_LMDB_MAX_SIZE_MB,
        }
    }
}

impl AttributionConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the retention window.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    /// Set the resolver query fan-out.
    pub fn with_query_concurrency(mut self, concurrency: usize) -> Self {
        self.query_concurrency = concurrency;
        self
    }

    /// Set the LMDB map size.
    pub fn with_lmdb_max_size_mb(mut self, max_size_mb: usize) -> Self {
        self.lmdb_max_size_mb = max_size_mb;
        self
    }

    /// Create from environment variables with fallback to defaults.
    ///
    /// Environment variables:
    /// - `SCRIPTSOURCE_KEY_PREFIX`: Observation key prefix (default: "SM:")
    /// - `SCRIPTSOURCE_RETENTION_DAYS`: Retention window in days (default: 60)
    /// - `SCRIPTSOURCE_QUERY_CONCURRENCY`: Concurrent queries per resolve (default: 16)
    /// - `SCRIPTSOURCE_LMDB_MAX_SIZE_MB`: LMDB map size (default: 256)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            key_prefix: lookup("SCRIPTSOURCE_KEY_PREFIX")
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.key_prefix),
            retention: lookup("SCRIPTSOURCE_RETENTION_DAYS")
                .and_then(|s| s.trim().parse::<u64>().ok())
                .and_then(|days| days.checked_mul(24 * 60 * 60))
                .map(Duration::from_secs)
                .unwrap_or(defaults.retention),
            query_concurrency: lookup("SCRIPTSOURCE_QUERY_CONCURRENCY")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.query_concurrency),
            lmdb_max_size_mb: lookup("SCRIPTSOURCE_LMDB_MAX_SIZE_MB")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.lmdb_max_size_mb),
        }
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - key_prefix is non-empty
    /// - retention is positive and at most [`MAX_RETENTION`]
    /// - query_concurrency > 0
    /// - lmdb_max_size_mb > 0
    pub fn validate(&self) -> AttributionResult<()> {
        if self.key_prefix.is_empty() {
            return Err(invalid("key_prefix", "", "key_prefix must not be empty"));
        }

        if self.retention.is_zero() {
            return Err(invalid(
                "retention",
                format!("{:?}", self.retention),
                "retention must be positive",
            ));
        }

        if self.retention > MAX_RETENTION {
            return Err(invalid(
                "retention",
                format!("{:?}", self.retention),
                "retention must not exceed 100 years",
            ));
        }

        if self.query_concurrency == 0 {
            return Err(invalid(
                "query_concurrency",
                "0",
                "query_concurrency must be greater than 0",
            ));
        }

        if self.lmdb_max_size_mb == 0 {
            return Err(invalid(
                "lmdb_max_size_mb",
                "0",
                "lmdb_max_size_mb must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Retention as a chrono duration, for deadline arithmetic.
    pub fn retention_delta(&self) -> AttributionResult<chrono::Duration> {
        chrono::Duration::from_std(self.retention).map_err(|e| {
            invalid("retention", format!("{:?}", self.retention), e.to_string())
        })
    }
}

fn invalid(
    field: &str,
    value: impl Into<String>,
    reason: impl Into<String>,
) -> AttributionError {
    AttributionError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.into(),
        reason: reason.into(),
    })
}


// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================
