//! Layered configuration: built-in defaults, `config/default` and `config/local`
//! files, then `EVENT_INBOX__*` environment variables.

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{LifecycleError, Result};

/// Application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Storage location and pool sizing
    pub database: DatabaseConfig,
    /// Log level, format and optional file output
    pub logging: LoggingConfig,
    /// Due-notification polling
    pub notifications: NotificationConfig,
    /// History retention and read sizing
    pub history: HistoryConfig,
}

/// SQLite database and connection pool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database path, optionally prefixed with `sqlite:` or `sqlite://`
    pub url: String,
    /// Pool size
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection
    pub connection_timeout_secs: u64,
    /// SQLite busy timeout per connection
    pub busy_timeout_ms: u64,
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
    /// Directory-qualified file name for daily rolling JSON logs
    pub file_path: Option<String>,
    /// Console format
    pub format: String, // "json" or "text"
}

/// Due-notification polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Whether `poll` runs the dispatcher
    pub enabled: bool,
    /// Seconds between polls
    pub poll_interval_secs: u64,
    /// Maximum items claimed per kind per poll
    pub batch_limit: usize,
}

/// Message history retention and context window
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Rows kept per channel by retention pruning
    pub keep_count: usize,
    /// Over-fetch factor used before deduplication
    pub fetch_multiplier: usize,
    /// Hard cap on rows fetched before deduplication
    pub fetch_ceiling: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:data/event_inbox.db".to_string(),
            max_connections: 10,
            connection_timeout_secs: 30,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            format: "text".to_string(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: 60,
            batch_limit: 50,
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            keep_count: 500,
            fetch_multiplier: 5,
            fetch_ceiling: 500,
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources with precedence
    pub fn load() -> Result<Self> {
        let config = Config::builder()
            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("EVENT_INBOX").separator("__"))
            .build()
            .map_err(|e| LifecycleError::InvalidConfig(format!("Failed to load configuration: {e}")))?;

        Self::finish(config)
    }

    /// Load configuration from an explicit file, ignoring the environment
    pub fn load_from(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()
            .map_err(|e| LifecycleError::InvalidConfig(format!("Failed to load {}: {e}", path.display())))?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let app_config: Self = config.try_deserialize().map_err(|e| {
            LifecycleError::InvalidConfig(format!("Failed to deserialize configuration: {e}"))
        })?;

        // Validate configuration
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        // Validate database config
        if self.database.url.trim().is_empty() {
            return Err(invalid("database.url must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(invalid("max_connections must be greater than 0"));
        }
        if self.database.connection_timeout_secs == 0 {
            return Err(invalid("connection_timeout_secs must be greater than 0"));
        }

        // Validate logging config
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            )));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            return Err(invalid(format!(
                "Invalid log format: {}. Must be one of: {:?}",
                self.logging.format, valid_formats
            )));
        }

        // Validate notification config
        if self.notifications.poll_interval_secs == 0 {
            return Err(invalid("poll_interval_secs must be greater than 0"));
        }
        if self.notifications.batch_limit == 0 {
            return Err(invalid("batch_limit must be greater than 0"));
        }

        // Validate history config
        if self.history.keep_count == 0 {
            return Err(invalid("keep_count must be greater than 0"));
        }
        if self.history.fetch_multiplier == 0 {
            return Err(invalid("fetch_multiplier must be greater than 0"));
        }
        if self.history.fetch_ceiling == 0 {
            return Err(invalid("fetch_ceiling must be greater than 0"));
        }

        Ok(())
    }

    /// Get log level from environment or config
    #[must_use]
    pub fn get_log_level(&self) -> String {
        std::env::var("RUST_LOG").unwrap_or_else(|_| self.logging.level.clone())
    }
}

fn invalid(message: impl Into<String>) -> LifecycleError {
    LifecycleError::InvalidConfig(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.database.url, "sqlite:data/event_inbox.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.notifications.batch_limit, 50);
        assert_eq!(config.history.fetch_ceiling, 500);
    }

    #[test]
    fn test_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AppConfig::default();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());
    }
}
