//! Engine configuration.
//!
//! Settings are read from a JSON file. Missing fields (or a missing file) fall
//! back to defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::AppError;

/// Slots a reviewer has when no override is set.
pub const DEFAULT_CAPACITY: i64 = 2;

/// Default per-call store deadline in seconds.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Default lifetime of a cached directory listing in seconds.
pub const DEFAULT_DIRECTORY_CACHE_TTL_SECS: u64 = 60;

/// Minimum aggregate score change that counts as a trend.
pub const DEFAULT_TREND_THRESHOLD: f64 = 0.3;

/// Default look-back for windowed score averages.
pub const DEFAULT_SCORE_WINDOW_DAYS: i64 = 30;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of a reviewer without an override.
    pub default_capacity: i64,

    /// Deadline for each public operation, in seconds.
    pub store_timeout_secs: u64,

    /// How long directory listings stay cached, in seconds.
    pub directory_cache_ttl_secs: u64,

    /// Aggregate score delta beyond which a trend is reported.
    pub trend_threshold: f64,

    /// Look-back window for dashboard score averages, in days.
    pub score_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_capacity: DEFAULT_CAPACITY,
            store_timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            directory_cache_ttl_secs: DEFAULT_DIRECTORY_CACHE_TTL_SECS,
            trend_threshold: DEFAULT_TREND_THRESHOLD,
            score_window_days: DEFAULT_SCORE_WINDOW_DAYS,
        }
    }
}

impl EngineConfig {
    /// Load settings from a JSON file, using defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("[config] {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(AppError::internal(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            AppError::validation(format!("Malformed config {}: {}", path.display(), e))
        })?;
        config.validate()?;

        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.default_capacity < 0 {
            return Err(AppError::validation_field(
                "default_capacity must not be negative",
                "default_capacity",
            ));
        }
        if self.store_timeout_secs == 0 {
            return Err(AppError::validation_field(
                "store_timeout_secs must be positive",
                "store_timeout_secs",
            ));
        }
        if !self.trend_threshold.is_finite() || self.trend_threshold < 0.0 {
            return Err(AppError::validation_field(
                "trend_threshold must be a non-negative number",
                "trend_threshold",
            ));
        }
        if self.score_window_days <= 0 {
            return Err(AppError::validation_field(
                "score_window_days must be positive",
                "score_window_days",
            ));
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn directory_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.directory_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.default_capacity, 2);
        assert_eq!(config.store_timeout(), Duration::from_secs(10));
        assert_eq!(config.trend_threshold, 0.3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = EngineConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");
        std::fs::write(&path, r#"{"default_capacity": 3, "store_timeout_secs": 2}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.default_capacity, 3);
        assert_eq!(config.store_timeout_secs, 2);
        assert_eq!(config.directory_cache_ttl_secs, DEFAULT_DIRECTORY_CACHE_TTL_SECS);
    }

    #[test]
    fn test_malformed_or_invalid_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engine.json");

        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(AppError::Validation { .. })
        ));

        std::fs::write(&path, r#"{"store_timeout_secs": 0}"#).unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(AppError::Validation { .. })
        ));
    }
}
