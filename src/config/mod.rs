// SPDX-License-Identifier: MPL-2.0
//! Engine configuration, loaded from and saved to a `settings.toml` file.
//!
//! All fields are optional in the file; missing fields fall back to the
//! defaults in [`defaults`].

pub mod defaults;

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use defaults::{
    DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_HISTORY_ENTRY_LIMIT,
    DEFAULT_HISTORY_MEMORY_LIMIT_MB,
};

const CONFIG_FILE: &str = "settings.toml";
const APP_NAME: &str = "Lamina";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Undo history memory budget in megabytes.
    #[serde(default)]
    pub history_memory_limit_mb: Option<u32>,
    /// Maximum number of undo entries (count backstop).
    #[serde(default)]
    pub history_entry_limit: Option<usize>,
    /// Canvas width used when a document is created without explicit dimensions.
    #[serde(default)]
    pub default_canvas_width: Option<u32>,
    /// Canvas height used when a document is created without explicit dimensions.
    #[serde(default)]
    pub default_canvas_height: Option<u32>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            history_memory_limit_mb: Some(DEFAULT_HISTORY_MEMORY_LIMIT_MB),
            history_entry_limit: Some(DEFAULT_HISTORY_ENTRY_LIMIT),
            default_canvas_width: Some(DEFAULT_CANVAS_WIDTH),
            default_canvas_height: Some(DEFAULT_CANVAS_HEIGHT),
        }
    }
}

impl Config {
    /// History memory budget in bytes, applying the default when unset.
    #[must_use]
    pub fn history_memory_limit_bytes(&self) -> usize {
        let mb = self
            .history_memory_limit_mb
            .unwrap_or(DEFAULT_HISTORY_MEMORY_LIMIT_MB);
        mb as usize * 1024 * 1024
    }

    /// History entry count limit, applying the default when unset.
    #[must_use]
    pub fn history_entry_limit(&self) -> usize {
        self.history_entry_limit
            .unwrap_or(DEFAULT_HISTORY_ENTRY_LIMIT)
    }

    /// Default canvas dimensions, applying the defaults when unset.
    #[must_use]
    pub fn default_canvas_size(&self) -> (u32, u32) {
        (
            self.default_canvas_width.unwrap_or(DEFAULT_CANVAS_WIDTH),
            self.default_canvas_height.unwrap_or(DEFAULT_CANVAS_HEIGHT),
        )
    }
}

fn get_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut path| {
        path.push(APP_NAME);
        path.push(CONFIG_FILE);
        path
    })
}

pub fn load() -> Result<Config> {
    if let Some(path) = get_default_config_path() {
        if path.exists() {
            return load_from_path(&path);
        }
    }
    Ok(Config::default())
}

pub fn save(config: &Config) -> Result<()> {
    if let Some(path) = get_default_config_path() {
        return save_to_path(config, &path);
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content).unwrap_or_default())
}

pub fn save_to_path(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    fs::write(path, content)?;
    Ok(())
}
