// Client configuration. Everything has a sensible default so the CLI
// works without a config file; a TOML file and a couple of environment
// variables can override the defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SharepointError};

/// Env var pointing at an explicit config file.
pub const CONFIG_ENV: &str = "SHAREPOINT_CLIENT_CONFIG";
/// Env var overriding `log_level`.
pub const LOG_ENV: &str = "SHAREPOINT_CLIENT_LOG";

const MIB: u64 = 1024 * 1024;

/// Tunables for the HTTP transport, the chunked upload and logging.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Bytes sent per chunk request.
    pub chunk_size: usize,
    /// Files of this size or larger go through the chunked transfer.
    pub chunked_upload_threshold: u64,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub log_level: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chunk_size: (10 * MIB) as usize,
            chunked_upload_threshold: 30 * MIB,
            timeout_secs: 300,
            user_agent: concat!("sharepoint-client/", env!("CARGO_PKG_VERSION")).to_string(),
            log_level: "warn".to_string(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| SharepointError::Config(format!("config parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Resolve the configuration the CLI runs with.
    ///
    /// `SHAREPOINT_CLIENT_CONFIG` wins if set (and must exist), then the
    /// per-user config file if present, then the defaults. Environment
    /// overrides are applied last.
    pub fn discover() -> Result<Self> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path)?,
            None => match default_path().filter(|p| p.is_file()) {
                Some(path) => Self::load(path)?,
                None => Self::default(),
            },
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var(LOG_ENV) {
            if !level.is_empty() {
                self.log_level = level;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SharepointError::Config(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// `<config_dir>/sharepoint-client/config.toml`, when the platform has one.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sharepoint-client").join("config.toml"))
}
