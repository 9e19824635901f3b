// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration types.
//!
//! [`HostConfig`] is the shape of one file on disk; every field is optional
//! so layers can be merged. [`ResolvedConfig`] is the merged result with
//! defaults filled in.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::AgentConfig;
use crate::error::ConfigError;
use crate::mcp::config::expand_env_vars;
use crate::mcp::types::TOOL_NAME_SEPARATOR;
use crate::mcp::{ServerDescriptor, TransportType};
use crate::session::{ReconnectPolicy, SessionSettings};
use crate::types::ProviderConfig;

/// One configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    /// Server descriptors keyed by server name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_servers: Option<BTreeMap<String, ServerDescriptor>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentSection>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmSection>,
}

/// Session manager tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSection {
    pub session_timeout_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
    pub cache_ttl_secs: Option<u64>,
    pub capability_ttl_secs: Option<u64>,
    /// Per-request limit on discovery and probe connections.
    pub discovery_timeout_secs: Option<u64>,
    /// 0 retries forever.
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
}

/// Orchestrator tunables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSection {
    pub max_iterations: Option<usize>,
    pub tool_timeout_secs: Option<u64>,
    pub max_turn_duration_secs: Option<u64>,
    pub system_prompt: Option<String>,
    pub parallel_tool_calls: Option<bool>,
}

/// LLM endpoint settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmSection {
    pub model: Option<String>,
    pub base_url: Option<String>,
    /// Supports `${VAR}` expansion.
    pub api_key: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub timeout_ms: Option<u64>,
}

/// Session settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedSession {
    pub session_timeout_secs: u64,
    pub cleanup_interval_secs: u64,
    pub cache_ttl_secs: u64,
    pub capability_ttl_secs: u64,
    pub discovery_timeout_secs: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for ResolvedSession {
    fn default() -> Self {
        Self {
            session_timeout_secs: 1800,
            cleanup_interval_secs: 300,
            cache_ttl_secs: 1800,
            capability_ttl_secs: 300,
            discovery_timeout_secs: 30,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 2000,
        }
    }
}

/// Agent settings with defaults applied.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAgent {
    pub max_iterations: usize,
    pub tool_timeout_secs: u64,
    pub max_turn_duration_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub parallel_tool_calls: bool,
}

impl Default for ResolvedAgent {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_timeout_secs: 60,
            max_turn_duration_secs: 600,
            system_prompt: None,
            parallel_tool_calls: true,
        }
    }
}

/// LLM settings after merging. Unset values fall back to provider defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLlm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Fully merged configuration.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub mcp_servers: BTreeMap<String, ServerDescriptor>,
    pub session: ResolvedSession,
    pub agent: ResolvedAgent,
    pub llm: ResolvedLlm,
    /// Files that contributed, lowest precedence first.
    #[serde(skip)]
    pub sources: Vec<PathBuf>,
}

impl ResolvedConfig {
    /// Descriptors in name order, each carrying its map key as its name.
    pub fn server_descriptors(&self) -> Vec<ServerDescriptor> {
        self.mcp_servers
            .iter()
            .map(|(name, descriptor)| ServerDescriptor {
                name: name.clone(),
                ..descriptor.clone()
            })
            .collect()
    }

    pub fn session_settings(&self) -> SessionSettings {
        let s = &self.session;
        SessionSettings {
            session_timeout: Duration::from_secs(s.session_timeout_secs),
            cleanup_interval: Duration::from_secs(s.cleanup_interval_secs),
            cache_ttl: Duration::from_secs(s.cache_ttl_secs),
            capability_ttl: Duration::from_secs(s.capability_ttl_secs),
            discovery_timeout: Duration::from_secs(s.discovery_timeout_secs),
            reconnect: ReconnectPolicy {
                max_attempts: s.max_reconnect_attempts,
                delay: Duration::from_millis(s.reconnect_delay_ms),
            },
        }
    }

    pub fn agent_config(&self) -> AgentConfig {
        let a = &self.agent;
        AgentConfig {
            max_iterations: a.max_iterations,
            tool_timeout: Duration::from_secs(a.tool_timeout_secs),
            max_turn_duration: Duration::from_secs(a.max_turn_duration_secs),
            system_prompt: a.system_prompt.clone(),
            parallel_tool_calls: a.parallel_tool_calls,
            model: self.llm.model.clone(),
        }
    }

    /// Provider settings, with `${VAR}` expanded in the API key.
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            api_key: self
                .llm
                .api_key
                .as_deref()
                .map(expand_env_vars)
                .filter(|k| !k.is_empty()),
            base_url: self.llm.base_url.clone(),
            model: self.llm.model.clone(),
            temperature: self.llm.temperature,
            max_tokens: self.llm.max_tokens,
            timeout_ms: self.llm.timeout_ms,
        }
    }

    /// Reject descriptors that could never connect and nonsensical limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, descriptor) in &self.mcp_servers {
            if name.is_empty() || name.contains(TOOL_NAME_SEPARATOR) {
                return Err(ConfigError::InvalidValue {
                    field: format!("mcpServers.{}", name),
                    message: format!("server names must be non-empty and must not contain '{}'", TOOL_NAME_SEPARATOR),
                });
            }
            match descriptor.transport {
                TransportType::Stdio if descriptor.command.as_deref().map_or(true, str::is_empty) => {
                    return Err(ConfigError::MissingField(format!("mcpServers.{}.command", name)));
                }
                TransportType::Http if descriptor.url.as_deref().map_or(true, str::is_empty) => {
                    return Err(ConfigError::MissingField(format!("mcpServers.{}.url", name)));
                }
                _ => {}
            }
        }

        if self.agent.max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.maxIterations".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.agent.tool_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "agent.toolTimeoutSecs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.session.cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.cleanupIntervalSecs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.session.discovery_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.discoveryTimeoutSecs".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Copy safe to print: API keys and header values are masked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.llm.api_key.is_some() {
            copy.llm.api_key = Some("***".to_string());
        }
        for descriptor in copy.mcp_servers.values_mut() {
            for value in descriptor.headers.values_mut() {
                *value = "***".to_string();
            }
            for value in descriptor.env.values_mut() {
                *value = "***".to_string();
            }
        }
        copy
    }
}
