//! Settings persistence for the `tms` command-line tool.
//!
//! Stores the database location, backup directory and workspace tunables in
//! a JSON file at an OS-appropriate location.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tms_core::WorkspaceConfig;

/// Persisted CLI settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliSettings {
    /// SQLite file holding the key-value store.
    pub database_path: String,
    /// Directory that `export` writes backup files into.
    pub backup_directory: String,
    /// Capacity and health-check tunables.
    pub workspace: WorkspaceConfig,
}

impl Default for CliSettings {
    fn default() -> Self {
        Self {
            database_path: default_data_directory()
                .join("tms.db")
                .to_string_lossy()
                .to_string(),
            backup_directory: default_backup_directory().to_string_lossy().to_string(),
            workspace: WorkspaceConfig::default(),
        }
    }
}

/// Returns the path to the settings JSON file.
///
/// - macOS / Linux: `~/.config/tms/settings.json`
/// - Windows: `%APPDATA%/Tms/settings.json`
pub fn settings_file_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let base = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        base.join("Tms").join("settings.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        home.join(".config").join("tms").join("settings.json")
    }
}

fn default_data_directory() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tms")
}

/// Returns the default backup directory: `~/Documents/TMS Backups`.
pub fn default_backup_directory() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("Documents")
        })
        .join("TMS Backups")
}

/// Loads settings from `path`; returns defaults if the file is missing or corrupt.
pub fn load_settings_from(path: &Path) -> CliSettings {
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            log::warn!("ignoring unreadable settings file {}: {e}", path.display());
            CliSettings::default()
        }),
        Err(_) => CliSettings::default(),
    }
}

/// Saves settings to `path`, creating parent directories as needed.
pub fn save_settings_to(path: &Path, settings: &CliSettings) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create settings directory")?;
    }
    let json = serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
    fs::write(path, json).context("Failed to write settings")?;
    Ok(())
}

pub fn load_settings() -> CliSettings {
    load_settings_from(&settings_file_path())
}

pub fn save_settings(settings: &CliSettings) -> anyhow::Result<()> {
    save_settings_to(&settings_file_path(), settings)
}
