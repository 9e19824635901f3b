// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files.
//!
//! JSON or YAML, chosen by file extension.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

use super::types::HostConfig;

/// Workspace config file names, first match wins.
pub const CONFIG_FILES: &[&str] = &[".mcp-host.json", ".mcp-host.yaml", "mcp-host.config.json"];

/// Local override file, kept out of version control.
pub const LOCAL_CONFIG_FILE: &str = ".mcp-host.local.json";

/// Global config directory name under the home directory.
pub const GLOBAL_CONFIG_DIR: &str = ".mcp-host";

pub const GLOBAL_CONFIG_FILE: &str = "config.json";

pub fn get_global_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(GLOBAL_CONFIG_DIR))
}

pub fn get_global_config_path() -> Option<PathBuf> {
    get_global_config_dir().map(|dir| dir.join(GLOBAL_CONFIG_FILE))
}

/// Path of the first existing file, if any.
fn existing(path: PathBuf) -> Option<PathBuf> {
    path.is_file().then_some(path)
}

/// `~/.mcp-host/config.json`, when present.
pub fn find_global_config() -> Option<PathBuf> {
    get_global_config_path().and_then(existing)
}

/// First of [`CONFIG_FILES`] present in `workspace_root`.
pub fn find_workspace_config(workspace_root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .find_map(|name| existing(workspace_root.join(name)))
}

pub fn find_local_config(workspace_root: &Path) -> Option<PathBuf> {
    existing(workspace_root.join(LOCAL_CONFIG_FILE))
}

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<HostConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let parsed = match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    };
    parsed.map_err(|e| ConfigError::InvalidFormat(format!("{}: {}", path.display(), e)))
}

/// Walk up from `start` to the first directory holding a workspace config.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| find_workspace_config(dir).is_some())
        .map(Path::to_path_buf)
}
