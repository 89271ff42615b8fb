//! Node configuration: persisted nickname and downloads-directory
//! override, loaded from a TOML file in the platform config directory.
//!
//! Mirrors the teacher's `AppConfig`: platform-appropriate directory
//! resolution via `dirs`, a `load`/`load_from` + `save`/`save_to` split so
//! tests can point at a `tempfile::TempDir` instead of the real home
//! directory, and "missing file ⇒ first run" semantics.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_DIR_NAME: &str = "offgrid";
const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not determine platform config directory")]
    NoConfigDir,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub local_nickname: String,
    /// Cached normalized local address, stable across runs once set —
    /// distinct from whatever ephemeral port the transport binds to on
    /// any given run. `None` until the node has bound a listener at
    /// least once.
    #[serde(default)]
    pub local_address: Option<String>,
    /// Override for where received files land; defaults to the
    /// platform downloads directory when absent.
    pub downloads_dir: Option<PathBuf>,
}

impl NodeConfig {
    /// A config for a node that has never run before: a generic nickname,
    /// no cached identity, no overrides.
    pub fn new_first_run() -> Self {
        NodeConfig {
            local_nickname: "anonymous".to_string(),
            local_address: None,
            downloads_dir: None,
        }
    }

    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|d| d.join(APP_DIR_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn config_file_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Platform data directory (`<data_dir>/offgrid`), used for the log
    /// file. Separate from `config_dir` the way the teacher keeps config
    /// and data apart.
    pub fn data_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(APP_DIR_NAME))
    }

    /// Resolves the effective downloads directory: the configured
    /// override, or the platform downloads directory, or `.` as a last
    /// resort (mirrors the teacher's fallback-rather-than-fail stance on
    /// non-essential paths).
    pub fn downloads_dir(&self) -> PathBuf {
        self.downloads_dir
            .clone()
            .or_else(dirs::download_dir)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Loads the config from the default platform path. Returns `Ok(None)`
    /// if no config file exists yet (first run).
    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        let config = toml::from_str(&text)?;
        Ok(Some(config))
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}
