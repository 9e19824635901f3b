// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration module for the MCP host.
//!
//! Handles loading, merging, and validation of configuration from multiple sources:
//! - Global config: ~/.mcp-host/config.json
//! - Workspace config: .mcp-host.json, .mcp-host.yaml, or mcp-host.config.json
//! - Local config: .mcp-host.local.json (gitignored, for personal overrides)
//! - CLI options: command-line arguments
//!
//! Configuration is merged with precedence (CLI > local > workspace > global > defaults).

mod loader;
mod merger;
mod types;

pub use loader::{
    find_global_config, find_local_config, find_workspace_config, find_workspace_root,
    get_global_config_dir, get_global_config_path, load_config_file, CONFIG_FILES,
    GLOBAL_CONFIG_DIR, GLOBAL_CONFIG_FILE, LOCAL_CONFIG_FILE,
};

pub use merger::{default_config, merge_config, CliOptions};

pub use types::{
    AgentSection, HostConfig, LlmSection, ResolvedAgent, ResolvedConfig, ResolvedLlm,
    ResolvedSession, SessionSection,
};

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

fn load_optional(path: Option<PathBuf>, sources: &mut Vec<PathBuf>) -> Result<Option<HostConfig>, ConfigError> {
    let Some(path) = path else {
        return Ok(None);
    };
    debug!(path = %path.display(), "Loading config file");
    let config = load_config_file(&path)?;
    sources.push(path);
    Ok(Some(config))
}

/// Load, merge and validate all configuration sources for a workspace.
///
/// An explicit `cli_options.config_path` replaces the workspace file and
/// must exist.
pub fn load_config(
    workspace_root: &Path,
    cli_options: CliOptions,
) -> Result<ResolvedConfig, ConfigError> {
    let mut sources = Vec::new();

    let global = load_optional(find_global_config(), &mut sources)?;
    let workspace_path = match &cli_options.config_path {
        Some(path) if !path.is_file() => {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        Some(path) => Some(path.clone()),
        None => find_workspace_config(workspace_root),
    };
    let workspace = load_optional(workspace_path, &mut sources)?;
    let local = load_optional(find_local_config(workspace_root), &mut sources)?;

    let mut config = merge_config(global, workspace, local, cli_options);
    config.sources = sources;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_with_no_files() {
        let temp = TempDir::new().unwrap();
        let config = load_config(temp.path(), CliOptions::default()).unwrap();
        // Global config may exist on the machine; the agent section always resolves.
        assert!(config.agent.max_iterations >= 1);
    }

    #[test]
    fn test_workspace_and_local() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".mcp-host.json"),
            r#"{
                "mcpServers": {"weather": {"type": "stdio", "command": "weather-mcp"}},
                "agent": {"maxIterations": 4}
            }"#,
        )
        .unwrap();
        std::fs::write(
            temp.path().join(".mcp-host.local.json"),
            r#"{"agent": {"maxIterations": 7}}"#,
        )
        .unwrap();

        let config = load_config(temp.path(), CliOptions::default()).unwrap();
        assert_eq!(config.agent.max_iterations, 7);
        assert_eq!(config.mcp_servers["weather"].name, "weather");
        assert!(config
            .sources
            .iter()
            .any(|p| p.ends_with(".mcp-host.local.json")));
    }

    #[test]
    fn test_invalid_descriptor_rejected() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(".mcp-host.json"),
            r#"{"mcpServers": {"remote": {"type": "http"}}}"#,
        )
        .unwrap();

        let err = load_config(temp.path(), CliOptions::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f == "mcpServers.remote.url"));
    }

    #[test]
    fn test_explicit_config_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("custom.yaml");
        std::fs::write(&path, "agent:\n  toolTimeoutSecs: 9\n").unwrap();

        let cli = CliOptions {
            config_path: Some(path),
            ..Default::default()
        };
        let config = load_config(temp.path(), cli).unwrap();
        assert_eq!(config.agent.tool_timeout_secs, 9);

        let missing = CliOptions {
            config_path: Some(temp.path().join("absent.json")),
            ..Default::default()
        };
        assert!(matches!(
            load_config(temp.path(), missing),
            Err(ConfigError::NotFound(_))
        ));
    }
}
