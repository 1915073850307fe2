//! Store configuration
//!
//! Loaded from TOML with defaults for every key, then overlaid with
//! `BIBLIO_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::{config_error, io_error, Result};

pub const ENV_DATABASE: &str = "BIBLIO_DATABASE";
pub const ENV_POOL_SIZE: &str = "BIBLIO_POOL_SIZE";
pub const ENV_PAGE_SIZE: &str = "BIBLIO_PAGE_SIZE";
pub const ENV_LISTENER_POLL_MS: &str = "BIBLIO_LISTENER_POLL_MS";

/// Database path that selects a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    /// SQLite file path, or `:memory:`
    pub database: String,
    pub pool_size: u32,
    /// Upper bound on waiting for a pooled connection
    pub connection_timeout_ms: u64,
    /// SQLite busy timeout applied to every connection
    pub busy_timeout_ms: u64,
    /// Rows fetched per page by lazy reads
    pub page_size: usize,
    /// How long a listener sleeps before re-checking the outbox
    pub listener_poll_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: "biblio.db".to_string(),
            pool_size: 8,
            connection_timeout_ms: 30_000,
            busy_timeout_ms: 5_000,
            page_size: 500,
            listener_poll_ms: 250,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self::default().with_database(IN_MEMORY)
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database == IN_MEMORY
    }

    /// Parse a TOML document; missing keys take their defaults
    ///
    /// # Errors
    ///
    /// `Config` when the document is malformed or fails validation.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(s).map_err(|e| config_error(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file
    ///
    /// # Errors
    ///
    /// `Io` when the file cannot be read, `Config` when it is invalid.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| io_error("read_config", e))?;
        Self::from_toml_str(&text)
    }

    /// Defaults overlaid with the process environment
    ///
    /// # Errors
    ///
    /// `Config` when a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self> {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup` (normally the environment) onto `self`
    ///
    /// # Errors
    ///
    /// `Config` when a value is unparseable or the result fails validation.
    pub fn overlay<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup(ENV_DATABASE) {
            self.database = db;
        }
        if let Some(v) = lookup(ENV_POOL_SIZE) {
            self.pool_size = parse_var(ENV_POOL_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_PAGE_SIZE) {
            self.page_size = parse_var(ENV_PAGE_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_LISTENER_POLL_MS) {
            self.listener_poll_ms = parse_var(ENV_LISTENER_POLL_MS, &v)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// # Errors
    ///
    /// `Config` for an empty database path or a zero pool or page size.
    pub fn validate(&self) -> Result<()> {
        if self.database.trim().is_empty() {
            return Err(config_error("database must not be empty"));
        }
        if self.pool_size == 0 {
            return Err(config_error("pool_size must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(config_error("page_size must be at least 1"));
        }
        Ok(())
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn listener_poll(&self) -> Duration {
        Duration::from_millis(self.listener_poll_ms.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| config_error(format!("{} has invalid value \"{}\"", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use biblio_core::ExErrorKind;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.database, "biblio.db");
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.listener_poll(), Duration::from_millis(250));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = StoreConfig::from_toml_str("database = \"/tmp/x.db\"\npage_size = 10\n").unwrap();
        assert_eq!(config.database, "/tmp/x.db");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.busy_timeout_ms, 5_000);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = StoreConfig::from_toml_str("databse = \"typo.db\"").unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Config);
    }

    #[test]
    fn test_overlay() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(ENV_DATABASE, ":memory:"), (ENV_POOL_SIZE, "2")]);
        let config = StoreConfig::default()
            .overlay(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert!(config.is_in_memory());
        assert_eq!(config.pool_size, 2);

        let err = StoreConfig::default()
            .overlay(|k| (k == ENV_PAGE_SIZE).then(|| "lots".to_string()))
            .unwrap_err();
        assert_eq!(err.kind(), ExErrorKind::Config);
    }
}
