//! Store configuration loaded from JSON.
//!
//! ```json
//! { "db_path": "/var/lib/app/store.sqlite3", "log_level": "info", "log_dir": "/var/log/app" }
//! ```
//!
//! Every key is optional: no `db_path` opens an in-memory store, no
//! `log_dir` leaves logging uninitialized.

use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::logging::{default_log_level, init_logging, LoggingError};
use rusqlite::Connection;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Logging(LoggingError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::Logging(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Logging(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

impl From<LoggingError> for ConfigError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl StoreConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Configured level, falling back to the build-mode default.
    pub fn effective_log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or(default_log_level())
    }

    /// Starts file logging when `log_dir` is set.
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        if let Some(dir) = &self.log_dir {
            init_logging(self.effective_log_level(), dir)?;
        }
        Ok(())
    }
}

/// Reads and parses a JSON config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<StoreConfig, ConfigError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    StoreConfig::from_json_str(&text)
}

/// Opens the configured database with migrations applied.
pub fn open_store(config: &StoreConfig) -> DbResult<Connection> {
    match &config.db_path {
        Some(path) => open_db(path),
        None => open_db_in_memory(),
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig};

    #[test]
    fn empty_object_uses_defaults() {
        let config = StoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.effective_log_level(), super::default_log_level());
        config.init_logging().unwrap();
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = StoreConfig::from_json_str(r#"{"db": "x"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn explicit_values_are_kept() {
        let config =
            StoreConfig::from_json_str(r#"{"db_path": "/tmp/a.db", "log_level": "warn"}"#).unwrap();
        assert_eq!(config.effective_log_level(), "warn");
        assert_eq!(config.db_path.as_deref(), Some(std::path::Path::new("/tmp/a.db")));
    }
}
