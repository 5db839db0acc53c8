//! One-shot upgrade of legacy configuration files.
//!
//! Version 1 files used flat CamelCase keys and keyed per-player toggles by
//! player name:
//!
//! ```toml
//! ItemOpenInvItemID = 280
//! NotifySilentChest = true
//! NotifyAnyChest = true
//!
//! [SilentChest.Notch]
//! toggle = true
//! ```
//!
//! Version 2 is the layout described in [`crate::config`]. Names are turned
//! into participant ids through a [`ParticipantDirectory`]; names that no
//! longer resolve are dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use super::Config;
use crate::host::ParticipantDirectory;

pub const CURRENT_CONFIG_VERSION: u32 = 2;

const LEGACY_ITEM_ID: &str = "ItemOpenInvItemID";
const LEGACY_NOTIFY_SILENT: &str = "NotifySilentChest";
const LEGACY_NOTIFY_ANY: &str = "NotifyAnyChest";

/// Outcome of converting one legacy toggle section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleConversion {
    pub section: String,
    pub converted: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    pub migrated: bool,
    pub backup: Option<PathBuf>,
    pub sections: Vec<ToggleConversion>,
}

impl MigrationReport {
    fn unchanged(version: u32) -> Self {
        Self {
            from_version: version,
            to_version: version,
            migrated: false,
            backup: None,
            sections: Vec::new(),
        }
    }
}

pub struct ConfigMigrator {
    path: PathBuf,
    directory: Arc<dyn ParticipantDirectory>,
}

impl ConfigMigrator {
    pub fn new(path: impl Into<PathBuf>, directory: Arc<dyn ParticipantDirectory>) -> Self {
        Self {
            path: path.into(),
            directory,
        }
    }

    fn backup_path(&self) -> PathBuf {
        self.path.with_file_name("config_old.toml")
    }

    /// Upgrade the file if it is older than [`CURRENT_CONFIG_VERSION`].
    pub async fn check_for_updates(&self) -> Result<MigrationReport> {
        if !fs::try_exists(&self.path).await.unwrap_or(false) {
            info!("[Config] No config at {}; nothing to update.", self.path.display());
            return Ok(MigrationReport::unchanged(CURRENT_CONFIG_VERSION));
        }
        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", self.path.display(), e))?;
        let table: toml::Table = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", self.path.display(), e))?;

        let version = table
            .get("config_version")
            .and_then(|v| v.as_integer())
            .unwrap_or(1) as u32;
        if version >= CURRENT_CONFIG_VERSION {
            info!("[Config] Update not required.");
            return Ok(MigrationReport::unchanged(version));
        }

        info!("[Config] Update found! Performing update...");
        match version {
            1 => self.update_1_to_2(&table).await,
            other => Err(anyhow!("no migration path from config version {}", other)),
        }
    }

    async fn update_1_to_2(&self, legacy: &toml::Table) -> Result<MigrationReport> {
        // Tables already in the current layout are carried over as written;
        // the flat legacy keys only override what they name.
        let mut config = Config::default();
        keep_table(legacy, "host", &mut config.host)?;
        keep_table(legacy, "logging", &mut config.logging)?;
        keep_table(legacy, "items", &mut config.items)?;
        keep_table(legacy, "notify", &mut config.notify)?;
        keep_table(legacy, "toggles", &mut config.toggles)?;

        if let Some(item_id) = legacy.get(LEGACY_ITEM_ID).and_then(|v| v.as_integer()) {
            config.items.open_inv = material_name(item_id).to_string();
        }
        if let Some(notify) = legacy.get(LEGACY_NOTIFY_SILENT).and_then(|v| v.as_bool()) {
            config.notify.silent_chest = notify;
        }
        if let Some(notify) = legacy.get(LEGACY_NOTIFY_ANY).and_then(|v| v.as_bool()) {
            config.notify.any_chest = notify;
        }

        let backup = self.backup_path();
        fs::rename(&self.path, &backup).await.map_err(|e| {
            anyhow!(
                "Failed to back up {} to {}: {}",
                self.path.display(),
                backup.display(),
                e
            )
        })?;
        info!("[Config] Backup of old config created at {}.", backup.display());

        let mut sections = Vec::new();
        if let Some((toggles, report)) = self.convert_toggles(legacy, "AnyChest") {
            config.toggles.any_chest = toggles;
            sections.push(report);
        }
        if let Some((toggles, report)) = self.convert_toggles(legacy, "ItemOpenInv") {
            config.toggles.open_inv_item = toggles;
            sections.push(report);
        }
        if let Some((toggles, report)) = self.convert_toggles(legacy, "SilentChest") {
            config.toggles.silent_chest = toggles;
            sections.push(report);
        }

        config.save(&path_str(&self.path)?).await?;
        info!("[Config] Update complete.");
        Ok(MigrationReport {
            from_version: 1,
            to_version: CURRENT_CONFIG_VERSION,
            migrated: true,
            backup: Some(backup),
            sections,
        })
    }

    /// Convert `[<section>.<name>] toggle = bool` into id-keyed flags.
    /// `None` when the section is absent or empty.
    fn convert_toggles(
        &self,
        legacy: &toml::Table,
        section: &str,
    ) -> Option<(BTreeMap<String, bool>, ToggleConversion)> {
        let entries = legacy.get(section)?.as_table()?;
        if entries.is_empty() {
            return None;
        }
        let mut toggles = BTreeMap::new();
        for (name, value) in entries {
            let Some(participant) = self.directory.resolve_participant(name) else {
                continue;
            };
            let toggled = value
                .get("toggle")
                .and_then(|t| t.as_bool())
                .unwrap_or(false);
            toggles.insert(participant.id.to_string(), toggled);
        }
        let report = ToggleConversion {
            section: section.to_string(),
            converted: toggles.len(),
            total: entries.len(),
        };
        info!(
            "[Config] Converted ({}/{}) {} toggle player usernames to UUIDs.",
            report.converted, report.total, section
        );
        Some((toggles, report))
    }
}

/// Deserialize `legacy[key]` into `slot` when the table is present.
fn keep_table<T: DeserializeOwned>(legacy: &toml::Table, key: &str, slot: &mut T) -> Result<()> {
    if let Some(value) = legacy.get(key) {
        *slot = value
            .clone()
            .try_into()
            .map_err(|e| anyhow!("Invalid [{}] table in unversioned config: {}", key, e))?;
    }
    Ok(())
}

fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("config path {} is not valid UTF-8", path.display()))
}

/// Legacy numeric item ids still seen in old files. Anything else maps to STICK.
fn material_name(id: i64) -> &'static str {
    match id {
        261 => "BOW",
        268 => "WOOD_SWORD",
        276 => "DIAMOND_SWORD",
        280 => "STICK",
        287 => "STRING",
        288 => "FEATHER",
        318 => "FLINT",
        340 => "BOOK",
        341 => "SLIME_BALL",
        345 => "COMPASS",
        347 => "WATCH",
        352 => "BONE",
        369 => "BLAZE_ROD",
        _ => "STICK",
    }
}
