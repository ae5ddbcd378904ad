use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use url::Url;

use crate::error::ConfigError;

// Include default config at compile time
const DEFAULT_CONFIG: &str = include_str!("../default_config.toml");

pub const DEFAULT_CONFIG_FILE: &str = "geosense.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    pub earth_engine: EarthEngineConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EarthEngineConfig {
    #[serde(default)]
    pub project: Option<String>,
    pub api_base: String,
    pub token_uri: String,
    pub scope: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("reports"),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

impl EarthEngineConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn api_base_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.api_base)
            .map_err(|e| ConfigError::InvalidEndpoint(self.api_base.clone(), e))
    }
}

impl Config {
    fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.earth_engine.api_base_url()?;
        Ok(config)
    }
}

/// Loads `path` if given, else `geosense.toml` from `search_dir`, else the
/// embedded defaults.
pub fn load_config(path: Option<&Path>, search_dir: &Path) -> Result<Config, ConfigError> {
    let start_time = Instant::now();
    info!(
        action = "start",
        component = "config_loading",
        "Starting config loading"
    );

    let config = if let Some(path) = path {
        info!(action = "load", component = "config_file", file_path = ?path, "Loading config from specified file");
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Config::parse(&fs::read_to_string(path)?, path)?
    } else {
        let default_file = search_dir.join(DEFAULT_CONFIG_FILE);
        if default_file.exists() {
            info!(action = "load", component = "default_config_file", file_path = ?default_file, "Loading config from default file");
            Config::parse(&fs::read_to_string(&default_file)?, &default_file)?
        } else {
            info!(
                action = "load",
                component = "embedded_config",
                "Using embedded default config"
            );
            Config::parse(DEFAULT_CONFIG, Path::new("<embedded>"))?
        }
    };

    info!(
        action = "complete",
        component = "config_loading",
        api_base = %config.earth_engine.api_base,
        duration_ms = start_time.elapsed().as_millis(),
        "Config loaded"
    );
    Ok(config)
}

pub fn init_default_config(dir: &Path) -> Result<PathBuf, ConfigError> {
    let default_file = dir.join(DEFAULT_CONFIG_FILE);

    if default_file.exists() {
        return Err(ConfigError::AlreadyExists(default_file));
    }

    fs::write(&default_file, DEFAULT_CONFIG)?;
    Ok(default_file)
}
