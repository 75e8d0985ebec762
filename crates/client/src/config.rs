//! Client configuration, loaded from YAML.
//!
//! ```yaml
//! server_name: Hardcore Survival
//! admin_password: change-me
//! primary:
//!   enabled: true
//!   base_url: http://localhost:3000
//! jsonbin:
//!   enabled: false
//! static_base_url: https://raw.githubusercontent.com/me/quests/main
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_name: String,
    pub server_season: String,
    /// Shared admin secret, compared locally.
    pub admin_password: String,
    pub primary: PrimaryConfig,
    pub jsonbin: JsonBinConfig,
    /// Where `quests.json` can be fetched as a last remote resort.
    pub static_base_url: Option<String>,
    /// Durable cache file. Falls back to the platform data dir.
    pub cache_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_name: "Hardcore Survival".to_string(),
            server_season: "Saison 1".to_string(),
            admin_password: "admin1234".to_string(),
            primary: PrimaryConfig::default(),
            jsonbin: JsonBinConfig::default(),
            static_base_url: None,
            cache_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrimaryConfig {
    pub enabled: bool,
    pub base_url: String,
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonBinConfig {
    pub enabled: bool,
    pub bin_id: String,
    pub api_key: String,
    /// Overrides the public JSONBin endpoint.
    pub base_url: Option<String>,
}

impl ClientConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary.enabled && self.primary.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "primary.base_url is required when primary is enabled".to_string(),
            ));
        }
        if self.jsonbin.enabled
            && (self.jsonbin.bin_id.trim().is_empty() || self.jsonbin.api_key.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "jsonbin.bin_id and jsonbin.api_key are required when jsonbin is enabled"
                    .to_string(),
            ));
        }
        Ok(())
    }
}
