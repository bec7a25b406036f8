//! Process configuration read from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `SCRIPTORIUM_DB_PATH` | `<temp>/scriptorium.sqlite3` |
//! | `SCRIPTORIUM_LOG_LEVEL` | `debug` (debug builds) / `info` (release) |
//! | `SCRIPTORIUM_LOG_DIR` | unset: logging stays off |
//!
//! Blank values count as unset.

use crate::logging::LogLevel;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub const DB_PATH_VAR: &str = "SCRIPTORIUM_DB_PATH";
pub const LOG_LEVEL_VAR: &str = "SCRIPTORIUM_LOG_LEVEL";
pub const LOG_DIR_VAR: &str = "SCRIPTORIUM_LOG_DIR";

const DEFAULT_DB_FILE: &str = "scriptorium.sqlite3";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub db_path: PathBuf,
    pub log_level: LogLevel,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidLogLevel { var: &'static str, value: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLogLevel { var, value } => {
                write!(f, "{var}=`{value}` is not a log level")
            }
        }
    }
}

impl Error for ConfigError {}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            db_path: std::env::temp_dir().join(DEFAULT_DB_FILE),
            log_level: LogLevel::build_default(),
            log_dir: None,
        }
    }
}

impl CoreConfig {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let log_level = match value(LOG_LEVEL_VAR) {
            Some(raw) => LogLevel::parse(&raw).ok_or(ConfigError::InvalidLogLevel {
                var: LOG_LEVEL_VAR,
                value: raw,
            })?,
            None => defaults.log_level,
        };

        Ok(Self {
            db_path: value(DB_PATH_VAR)
                .map(|raw| PathBuf::from(raw.trim()))
                .unwrap_or(defaults.db_path),
            log_level,
            log_dir: value(LOG_DIR_VAR).map(|raw| PathBuf::from(raw.trim())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = CoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, CoreConfig::default());
        assert!(config.db_path.ends_with("scriptorium.sqlite3"));
        assert!(config.log_dir.is_none());
    }

    #[test]
    fn explicit_values_override_defaults_and_blank_is_unset() {
        let config = CoreConfig::from_lookup(lookup(&[
            (DB_PATH_VAR, "/data/novel.sqlite3"),
            (LOG_LEVEL_VAR, "WARN"),
            (LOG_DIR_VAR, "   "),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/novel.sqlite3"));
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.log_dir, None);
    }

    #[test]
    fn unknown_log_level_is_rejected() {
        let err = CoreConfig::from_lookup(lookup(&[(LOG_LEVEL_VAR, "loud")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidLogLevel {
                var: LOG_LEVEL_VAR,
                value: "loud".to_string()
            }
        );
    }
}
