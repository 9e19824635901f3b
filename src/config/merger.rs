// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration merging.
//!
//! Handles merging configurations from different sources with proper precedence.

use std::path::PathBuf;

use super::types::{AgentSection, HostConfig, LlmSection, ResolvedConfig, SessionSection};

/// CLI options that can override configuration.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    /// Explicit config file, used in place of the workspace file.
    pub config_path: Option<PathBuf>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_iterations: Option<usize>,
    pub tool_timeout_secs: Option<u64>,
    pub system_prompt: Option<String>,
    pub sequential_tools: Option<bool>,
}

/// Default configuration values.
pub fn default_config() -> ResolvedConfig {
    ResolvedConfig::default()
}

/// Merge multiple configurations with precedence.
///
/// Precedence (highest to lowest):
/// 1. CLI options
/// 2. Local config (.mcp-host.local.json)
/// 3. Workspace config (.mcp-host.json)
/// 4. Global config (~/.mcp-host/config.json)
/// 5. Default values
///
/// Scalars replace field by field. Servers merge by name, and a later
/// descriptor replaces an earlier one of the same name whole.
pub fn merge_config(
    global: Option<HostConfig>,
    workspace: Option<HostConfig>,
    local: Option<HostConfig>,
    cli: CliOptions,
) -> ResolvedConfig {
    let mut result = default_config();

    for config in [global, workspace, local].into_iter().flatten() {
        apply_host_config(&mut result, config);
    }

    apply_cli_options(&mut result, cli);
    result
}

fn apply_host_config(result: &mut ResolvedConfig, config: HostConfig) {
    if let Some(servers) = config.mcp_servers {
        for (name, mut descriptor) in servers {
            descriptor.name = name.clone();
            result.mcp_servers.insert(name, descriptor);
        }
    }
    if let Some(session) = config.session {
        apply_session(result, session);
    }
    if let Some(agent) = config.agent {
        apply_agent(result, agent);
    }
    if let Some(llm) = config.llm {
        apply_llm(result, llm);
    }
}

fn apply_session(result: &mut ResolvedConfig, section: SessionSection) {
    let s = &mut result.session;
    if let Some(v) = section.session_timeout_secs {
        s.session_timeout_secs = v;
    }
    if let Some(v) = section.cleanup_interval_secs {
        s.cleanup_interval_secs = v;
    }
    if let Some(v) = section.cache_ttl_secs {
        s.cache_ttl_secs = v;
    }
    if let Some(v) = section.capability_ttl_secs {
        s.capability_ttl_secs = v;
    }
    if let Some(v) = section.discovery_timeout_secs {
        s.discovery_timeout_secs = v;
    }
    if let Some(v) = section.max_reconnect_attempts {
        s.max_reconnect_attempts = v;
    }
    if let Some(v) = section.reconnect_delay_ms {
        s.reconnect_delay_ms = v;
    }
}

fn apply_agent(result: &mut ResolvedConfig, section: AgentSection) {
    let a = &mut result.agent;
    if let Some(v) = section.max_iterations {
        a.max_iterations = v;
    }
    if let Some(v) = section.tool_timeout_secs {
        a.tool_timeout_secs = v;
    }
    if let Some(v) = section.max_turn_duration_secs {
        a.max_turn_duration_secs = v;
    }
    if section.system_prompt.is_some() {
        a.system_prompt = section.system_prompt;
    }
    if let Some(v) = section.parallel_tool_calls {
        a.parallel_tool_calls = v;
    }
}

fn apply_llm(result: &mut ResolvedConfig, section: LlmSection) {
    let l = &mut result.llm;
    if section.model.is_some() {
        l.model = section.model;
    }
    if section.base_url.is_some() {
        l.base_url = section.base_url;
    }
    if section.api_key.is_some() {
        l.api_key = section.api_key;
    }
    if section.temperature.is_some() {
        l.temperature = section.temperature;
    }
    if section.max_tokens.is_some() {
        l.max_tokens = section.max_tokens;
    }
    if section.timeout_ms.is_some() {
        l.timeout_ms = section.timeout_ms;
    }
}

fn apply_cli_options(result: &mut ResolvedConfig, cli: CliOptions) {
    if cli.model.is_some() {
        result.llm.model = cli.model;
    }
    if cli.base_url.is_some() {
        result.llm.base_url = cli.base_url;
    }
    if let Some(v) = cli.max_iterations {
        result.agent.max_iterations = v;
    }
    if let Some(v) = cli.tool_timeout_secs {
        result.agent.tool_timeout_secs = v;
    }
    if cli.system_prompt.is_some() {
        result.agent.system_prompt = cli.system_prompt;
    }
    if let Some(sequential) = cli.sequential_tools {
        result.agent.parallel_tool_calls = !sequential;
    }
}
