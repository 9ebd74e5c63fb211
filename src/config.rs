use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::client::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_retries: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_retries: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub backend_url: String,
    pub log_level: String,
    pub log_format: LogFormat,
    /// Unset means requests may hang; the console never times them out itself.
    pub request_timeout_secs: Option<u64>,
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BASE_URL.to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            request_timeout_secs: None,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("could not determine config directory")?;
        Ok(config_dir.join("fixloop").join("config.yaml"))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// Defaults, then the YAML file, then `FIXLOOP_*` environment variables.
/// A missing file is not an error.
pub fn load(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::path()?,
    };
    figment(&path)
        .merge(Env::prefixed("FIXLOOP_").split("__"))
        .extract()
        .with_context(|| format!("loading configuration (file: {})", path.display()))
}

fn figment(path: &Path) -> Figment {
    Figment::from(Serialized::defaults(Config::default())).merge(Yaml::file(path))
}
