//! Node configuration.

use std::path::PathBuf;

use tally_common::millis_to_limit;
use tally_ledger::LedgerConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Main node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Database URL.
    pub database_url: String,
    /// CSV file used by `seed`.
    pub seed_file: PathBuf,
    /// Log level.
    pub log_level: String,
    /// Log format.
    pub log_format: LogFormat,
    /// Engine configuration.
    pub ledger: LedgerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://tally.db".to_string(),
            seed_file: PathBuf::from("data/users.csv"),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            ledger: LedgerConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("DATABASE_URL") {
            config.database_url = url;
        }

        if let Some(path) = lookup("TALLY_SEED_FILE") {
            config.seed_file = PathBuf::from(path);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = lookup("TALLY_LOG_FORMAT").and_then(|f| LogFormat::parse(&f)) {
            config.log_format = format;
        }

        if let Some(millis) = lookup("TALLY_LOCK_TIMEOUT_MS") {
            if let Ok(millis) = millis.parse() {
                config.ledger.lock_acquisition_timeout = millis_to_limit(millis);
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("Database URL cannot be empty".to_string());
        }

        if !self.database_url.starts_with("sqlite:") {
            return Err(format!(
                "Unsupported database URL {}: expected a sqlite: URL",
                self.database_url
            ));
        }

        self.ledger.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = NodeConfig::default();
        config.database_url = "postgres://localhost/tally".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("DATABASE_URL", "sqlite::memory:"),
            ("TALLY_LOG_FORMAT", "JSON"),
            ("TALLY_LOCK_TIMEOUT_MS", "1500"),
        ]
        .into_iter()
        .collect();

        let config = NodeConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(
            config.ledger.lock_acquisition_timeout,
            Some(Duration::from_millis(1500))
        );
        assert_eq!(config.log_level, "info");
    }
}
