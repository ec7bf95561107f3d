//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
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

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_prefix`, `shell`, `version_param` or `user_agent` is empty
    /// - `max_bytes` is 0 or exceeds 100MB
    /// - `timeout_ms` is set outside 100ms..=5 minutes
    ///
    /// Returns `ConfigError::Missing` if no version or scope can be resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("cache_prefix", &self.cache_prefix),
            ("shell", &self.shell),
            ("version_param", &self.version_param),
            ("user_agent", &self.user_agent),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid { field: field.into(), reason: "must not be empty".into() });
            }
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 100 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 100MB".into() });
        }

        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms < 100 {
                return Err(ConfigError::Invalid {
                    field: "timeout_ms".into(),
                    reason: "must be at least 100ms".into(),
                });
            }
            if timeout_ms > 300_000 {
                return Err(ConfigError::Invalid {
                    field: "timeout_ms".into(),
                    reason: "must not exceed 5 minutes (300000ms)".into(),
                });
            }
        }

        let version = self.resolved_version()?;
        if version.trim().is_empty() {
            return Err(ConfigError::Invalid { field: "version".into(), reason: "must not be empty".into() });
        }

        self.resolved_scope()?;

        if self.precache.iter().any(|locator| locator.trim().is_empty()) {
            tracing::warn!("precache list contains empty locators; they will be skipped");
        }

        Ok(())
    }
}
