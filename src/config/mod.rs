//! # Configuration Management Module
//!
//! TOML configuration for the remote inventory core, plus the one-shot
//! migration that upgrades legacy (version 1) files.
//!
//! ## Configuration File Format
//!
//! ```toml
//! config_version = 2
//!
//! [host]
//! version = "v1_9_R1"
//! data_dir = "./data"
//!
//! [items]
//! open_inv = "STICK"
//!
//! [notify]
//! any_chest = true
//! silent_chest = true
//!
//! [logging]
//! level = "info"
//! file = "remoteinv.log"
//!
//! [toggles.silent_chest]
//! "8667ba71-b85a-4004-af54-457a9734eed7" = true
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use remoteinv::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("Host version: {}", config.host.version);
//!     Ok(())
//! }
//! ```

pub mod migration;

use anyhow::{anyhow, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::fs;

use crate::inventory::types::{HostVersion, ParticipantId};
use migration::CURRENT_CONFIG_VERSION;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Schema version of this file. Missing means a legacy (v1) file.
    #[serde(default = "default_config_version")]
    pub config_version: u32,
    pub host: HostConfig,
    #[serde(default)]
    pub items: ItemsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub toggles: TogglesConfig,
}

fn default_config_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    /// Host runtime version id, e.g. "v1_9_R1". Must match a registered adapter.
    pub version: String,
    /// Directory of the sled database holding host player data.
    pub data_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemsConfig {
    /// Material name of the item that opens inventories on use.
    pub open_inv: String,
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Self {
            open_inv: "STICK".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_true")]
    pub any_chest: bool,
    /// Tell the operator when an inventory is opened silently.
    #[serde(default = "default_true")]
    pub silent_chest: bool,
}

fn default_true() -> bool {
    true
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            any_chest: true,
            silent_chest: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

/// Per-operator toggles keyed by participant id string.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TogglesConfig {
    #[serde(default)]
    pub silent_chest: BTreeMap<String, bool>,
    #[serde(default)]
    pub any_chest: BTreeMap<String, bool>,
    #[serde(default)]
    pub open_inv_item: BTreeMap<String, bool>,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Write this configuration, replacing the file.
    pub async fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| anyhow!("Failed to serialize config: {}", e))?;
        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;
        Ok(())
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        Config::default().save(path).await
    }

    pub fn host_version(&self) -> HostVersion {
        HostVersion::new(&self.host.version)
    }

    /// Silent flags keyed by id. Entries that are not valid ids are skipped.
    pub fn silent_toggles(&self) -> HashMap<ParticipantId, bool> {
        self.toggles
            .silent_chest
            .iter()
            .filter_map(|(key, enabled)| match ParticipantId::parse(key) {
                Some(id) => Some((id, *enabled)),
                None => {
                    warn!("Ignoring silent toggle for invalid id '{}'", key);
                    None
                }
            })
            .collect()
    }

    pub fn set_silent_toggles(&mut self, flags: &HashMap<ParticipantId, bool>) {
        self.toggles.silent_chest = flags
            .iter()
            .map(|(id, enabled)| (id.to_string(), *enabled))
            .collect();
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            config_version: CURRENT_CONFIG_VERSION,
            host: HostConfig {
                version: "v1_9_R1".to_string(),
                data_dir: "./data".to_string(),
            },
            items: ItemsConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig {
                level: "info".to_string(),
                file: Some("remoteinv.log".to_string()),
            },
            toggles: TogglesConfig::default(),
        }
    }
}
