//! Store configuration
//!
//! A small serde-friendly config so embedding applications can load store
//! settings from whatever configuration file they already carry.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnectOptions;

/// Settings for opening a store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the store file. `:memory:` opens a private in-memory store.
    pub path: PathBuf,
    /// Create the file when it does not exist yet.
    pub create_if_missing: bool,
    /// Enforce foreign keys at the storage layer.
    pub foreign_keys: bool,
    /// How long a writer waits on a locked store before giving up.
    pub busy_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(":memory:"),
            create_if_missing: true,
            foreign_keys: false,
            busy_timeout_seconds: 5,
        }
    }
}

impl DatabaseConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub(crate) fn connect_options(&self) -> SqliteConnectOptions {
        let options = if self.path == Path::new(":memory:") {
            SqliteConnectOptions::new().in_memory(true)
        } else {
            SqliteConnectOptions::new()
                .filename(&self.path)
                .create_if_missing(self.create_if_missing)
        };
        options
            .foreign_keys(self.foreign_keys)
            .busy_timeout(Duration::from_secs(self.busy_timeout_seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_open_an_in_memory_store() {
        let config = DatabaseConfig::default();
        assert_eq!(config.path, PathBuf::from(":memory:"));
        assert!(config.create_if_missing);
    }

    #[test]
    fn with_path_keeps_the_remaining_defaults() {
        let config = DatabaseConfig::with_path("/tmp/app.db");
        assert_eq!(config.path, PathBuf::from("/tmp/app.db"));
        assert_eq!(config.busy_timeout_seconds, 5);
    }
}
