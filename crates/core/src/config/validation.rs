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
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `size_budget` or `max_bytes` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `cache_prefix`, `cache_version` or `user_agent` is empty
    /// - `api_prefix`, `offline_page` or `data_key` is not an absolute path
    /// - `origin` is not an http(s) URL
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.size_budget == 0 {
            return Err(invalid("size_budget", "must be greater than 0"));
        }
        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.cache_prefix.is_empty() {
            return Err(invalid("cache_prefix", "must not be empty"));
        }
        if self.cache_version.is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }
        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        for (field, value) in
            [("api_prefix", &self.api_prefix), ("offline_page", &self.offline_page), ("data_key", &self.data_key)]
        {
            if !value.starts_with('/') {
                return Err(invalid(field, "must start with '/'"));
            }
        }

        self.origin_url()?;

        if self.max_bytes as u64 > self.size_budget {
            tracing::warn!(
                max_bytes = self.max_bytes,
                size_budget = self.size_budget,
                "max_bytes exceeds size_budget; a single response can evict the whole cache"
            );
        }

        Ok(())
    }
}
