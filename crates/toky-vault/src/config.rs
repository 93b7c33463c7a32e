//! Vault settings, stored as plain JSON next to the token file.
//!
//! Everything has a default, so a missing or corrupt settings file never
//! prevents the vault from starting.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::persistence::{TokenFile, TOKENS_FILE};
use crate::refresh::DEFAULT_REFRESH_INTERVAL;

/// Default settings file name.
pub const CONFIG_FILE: &str = "toky.json";

/// Where the tokens live and how often codes refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VaultConfig {
    /// Token file location. Relative paths resolve against the directory
    /// holding the settings file.
    #[serde(default = "default_data_file")]
    pub data_file: PathBuf,

    /// Refresh tick period in milliseconds. `0` means the default.
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_file: default_data_file(),
            refresh_interval_ms: default_refresh_interval_ms(),
        }
    }
}

fn default_data_file() -> PathBuf {
    PathBuf::from(TOKENS_FILE)
}
fn default_refresh_interval_ms() -> u64 {
    u64::try_from(DEFAULT_REFRESH_INTERVAL.as_millis()).unwrap_or(1_000)
}

impl VaultConfig {
    /// Defaults with the token file placed in `dir`.
    #[must_use]
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            data_file: dir.join(TOKENS_FILE),
            ..Self::default()
        }
    }

    /// Read settings from `path`.
    ///
    /// Returns defaults (anchored in the file's directory) when the file
    /// is missing or is not valid JSON.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let mut config = match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt settings file");
                Self::default()
            }),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "no settings file, using defaults");
                Self::default()
            }
        };

        if config.data_file.is_relative() {
            if let Some(dir) = path.parent() {
                config.data_file = dir.join(&config.data_file);
            }
        }
        config
    }

    /// Tick period for the refresh scheduler.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        if self.refresh_interval_ms == 0 {
            DEFAULT_REFRESH_INTERVAL
        } else {
            Duration::from_millis(self.refresh_interval_ms)
        }
    }

    /// JSON token file at [`VaultConfig::data_file`].
    #[must_use]
    pub fn token_file(&self) -> TokenFile {
        TokenFile::new(self.data_file.clone())
    }
}
