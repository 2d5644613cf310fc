use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use session_client::ClientConfig;
use tracing::debug;

const APP_DIR: &str = "session-client";

/// CLI configuration file.
///
/// ```toml
/// store_path = "/var/lib/sessionctl/credentials.json"
///
/// [client]
/// base_url = "https://api.example.com"
/// proactive_renewal = true
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Credential store file. Defaults to the user data directory.
    pub store_path: Option<PathBuf>,

    pub client: ClientConfig,
}

impl AppConfig {
    /// Load configuration. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            debug!(path = %path.display(), "No configuration file; using defaults");
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid configuration in {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Credential store location: the explicit override, then the
    /// configured path, then the user data directory.
    pub fn store_path(&self, override_path: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = override_path.or(self.store_path.as_deref()) {
            return Ok(path.to_path_buf());
        }
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR).join("credentials.json"))
            .ok_or_else(|| anyhow!("no data directory available; pass --store"))
    }

    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }
}
