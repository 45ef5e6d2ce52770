use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sieve_core::Thresholds;

use crate::error::{Result, StoreError};
use crate::notify::DEFAULT_CHANNEL;
use crate::spam_log::{AppendMode, DEFAULT_BUSY_TIMEOUT_MS};

/// Config file name looked up inside the container directory.
pub const CONFIG_FILE: &str = "sieve.toml";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// When false the filter classifies but never persists or notifies.
    pub enabled: bool,
    pub append_mode: AppendMode,
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            append_mode: AppendMode::default(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub channel: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model bundle to load instead of the bundled one.
    pub path: Option<PathBuf>,
}

/// Everything the filter reads at process start.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub policy: Thresholds,
    pub store: StoreConfig,
    pub notify: NotifyConfig,
    pub model: ModelConfig,
}

impl FilterConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: FilterConfig = toml::from_str(content)?;
        config.policy.validate()?;
        if config.notify.channel.trim().is_empty() {
            return Err(StoreError::InvalidData("notify.channel is empty".into()));
        }
        Ok(config)
    }

    /// Read `path`; a missing file (or a missing container) yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => {
                tracing::info!("loaded config from {}", path.display());
                Self::from_toml(&content)
            }
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(Self::default())
            }
            Err(e) => Err(StoreError::InvalidData(format!(
                "failed to read {}: {e}",
                path.display()
            ))),
        }
    }

    /// `<container>/sieve.toml`, or defaults when absent.
    pub fn load_from_container(container: &Path) -> Result<Self> {
        Self::load(&container.join(CONFIG_FILE))
    }
}
