// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP server descriptors.
//!
//! A [`ServerDescriptor`] is the static, immutable description of one tool
//! server, loaded from the `mcpServers` section of the host configuration.
//!
//! # Example Configuration
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "filesystem": {
//!       "type": "stdio",
//!       "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/path"],
//!       "startup_timeout_sec": 30
//!     },
//!     "github": {
//!       "type": "http",
//!       "url": "https://mcp.example.com/mcp",
//!       "headers": { "X-Team": "${TEAM_ID}" },
//!       "forward_bearer_token": true,
//!       "listen": true
//!     }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::error::McpError;
use super::types::TOOL_NAME_SEPARATOR;

/// Static configuration for a single MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique server name. Filled from the map key when loaded from a file.
    #[serde(default)]
    pub name: String,

    /// Transport kind.
    #[serde(rename = "type", alias = "transport", default)]
    pub transport: TransportType,

    /// Whether this server is enabled.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Command for stdio transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Arguments for stdio transport.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Environment variables for stdio transport (supports ${ENV_VAR} expansion).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,

    /// Working directory for stdio transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,

    /// Endpoint URL for HTTP transport.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Extra HTTP headers (supports ${ENV_VAR} expansion).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// Forward the caller's bearer token as an `Authorization` header.
    /// Only honoured for HTTP transport.
    #[serde(default)]
    pub forward_bearer_token: bool,

    /// Keep a long-lived SSE listener open for server push notifications.
    #[serde(default)]
    pub listen: bool,

    /// Handshake timeout in seconds.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_sec: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_startup_timeout() -> u64 {
    30
}

impl ServerDescriptor {
    fn base(name: impl Into<String>, transport: TransportType) -> Self {
        Self {
            name: name.into(),
            transport,
            enabled: true,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            url: None,
            headers: HashMap::new(),
            forward_bearer_token: false,
            listen: false,
            startup_timeout_sec: default_startup_timeout(),
        }
    }

    /// Create a stdio transport descriptor.
    pub fn stdio(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            command: Some(command.into()),
            ..Self::base(name, TransportType::Stdio)
        }
    }

    /// Create an HTTP transport descriptor.
    pub fn http(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::base(name, TransportType::Http)
        }
    }

    /// Add command arguments.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(|s| s.into()).collect();
        self
    }

    /// Set environment variables.
    pub fn with_env(
        mut self,
        env: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    /// Add an HTTP header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Request bearer token forwarding.
    pub fn forwarding_bearer(mut self) -> Self {
        self.forward_bearer_token = true;
        self
    }

    /// Keep a push-notification listener open.
    pub fn listening(mut self) -> Self {
        self.listen = true;
        self
    }

    /// Mark the server as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Whether sessions for this server are bound to the caller's token.
    ///
    /// True only when the descriptor uses HTTP and asks for forwarding.
    pub fn binds_bearer_token(&self) -> bool {
        self.transport == TransportType::Http && self.forward_bearer_token
    }

    /// The `Authorization` value to send for this caller, if any.
    pub fn authorization_for(&self, bearer_token: Option<&str>) -> Option<String> {
        if !self.binds_bearer_token() {
            return None;
        }
        bearer_token
            .filter(|t| !t.is_empty())
            .map(|t| format!("Bearer {}", t))
    }

    /// Headers with environment variables expanded.
    pub fn expanded_headers(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_vars(v)))
            .collect()
    }

    /// Environment with variables expanded.
    pub fn expanded_env(&self) -> HashMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_vars(v)))
            .collect()
    }

    /// Check the descriptor is usable for its transport.
    pub fn validate(&self) -> Result<(), McpError> {
        if self.name.is_empty() {
            return Err(McpError::Config("server name must not be empty".to_string()));
        }
        if self.name.contains(TOOL_NAME_SEPARATOR) {
            return Err(McpError::Config(format!(
                "server name '{}' must not contain '{}'",
                self.name, TOOL_NAME_SEPARATOR
            )));
        }
        match self.transport {
            TransportType::Stdio if self.command.as_deref().map_or(true, str::is_empty) => {
                Err(McpError::Config(format!(
                    "server '{}': stdio transport requires 'command'",
                    self.name
                )))
            }
            TransportType::Http if self.url.as_deref().map_or(true, str::is_empty) => {
                Err(McpError::Config(format!(
                    "server '{}': http transport requires 'url'",
                    self.name
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Simple `${VAR}` expansion; unset variables expand to the empty string.
pub fn expand_env_vars(value: &str) -> String {
    let mut result = value.to_string();
    let mut search_from = 0;
    while let Some(rel) = result[search_from..].find("${") {
        let start = search_from + rel;
        let Some(end_rel) = result[start..].find('}') else {
            break;
        };
        let end = start + end_rel;
        let var_value = std::env::var(&result[start + 2..end]).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], var_value, &result[end + 1..]);
        search_from = start + var_value.len();
    }
    result
}

/// Transport type for MCP connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportType {
    /// Child process speaking newline-delimited JSON over stdin/stdout.
    #[default]
    Stdio,

    /// HTTP POST with optional SSE responses.
    Http,
}

impl std::fmt::Display for TransportType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor() {
        let json = r#"
        {
            "type": "http",
            "url": "https://mcp.example.com/mcp",
            "headers": {"X-Team": "blue"},
            "forward_bearer_token": true
        }
        "#;

        let desc: ServerDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(desc.transport, TransportType::Http);
        assert!(desc.enabled);
        assert!(desc.forward_bearer_token);
        assert!(!desc.listen);
        assert_eq!(desc.startup_timeout_sec, 30);
    }

    #[test]
    fn test_transport_alias() {
        let desc: ServerDescriptor =
            serde_json::from_str(r#"{"transport": "stdio", "command": "echo"}"#).unwrap();
        assert_eq!(desc.transport, TransportType::Stdio);
    }

    #[test]
    fn test_builders() {
        let desc = ServerDescriptor::stdio("fs", "npx")
            .with_args(["-y", "@modelcontextprotocol/server-filesystem"])
            .with_env([("NODE_ENV", "production")]);

        assert_eq!(desc.transport, TransportType::Stdio);
        assert_eq!(desc.args.len(), 2);
        assert_eq!(desc.env.get("NODE_ENV").map(String::as_str), Some("production"));
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_bearer_forwarding_only_for_http() {
        let stdio = ServerDescriptor::stdio("fs", "npx").forwarding_bearer();
        assert!(!stdio.binds_bearer_token());
        assert_eq!(stdio.authorization_for(Some("tok")), None);

        let http = ServerDescriptor::http("gh", "https://x").forwarding_bearer();
        assert!(http.binds_bearer_token());
        assert_eq!(http.authorization_for(Some("tok")).as_deref(), Some("Bearer tok"));
        assert_eq!(http.authorization_for(Some("")), None);
        assert_eq!(http.authorization_for(None), None);

        let plain = ServerDescriptor::http("gh", "https://x");
        assert_eq!(plain.authorization_for(Some("tok")), None);
    }

    #[test]
    fn test_validation() {
        let mut missing_cmd = ServerDescriptor::stdio("fs", "");
        assert!(missing_cmd.validate().is_err());
        missing_cmd.command = None;
        assert!(missing_cmd.validate().is_err());

        let mut missing_url = ServerDescriptor::http("gh", "x");
        missing_url.url = None;
        assert!(missing_url.validate().is_err());

        let bad_name = ServerDescriptor::stdio("a:b", "echo");
        assert!(matches!(bad_name.validate(), Err(McpError::Config(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("MCP_HOST_TEST_TEAM", "blue");
        }

        assert_eq!(expand_env_vars("team-${MCP_HOST_TEST_TEAM}!"), "team-blue!");
        assert_eq!(expand_env_vars("${MCP_HOST_TEST_UNSET_VAR}x"), "x");
        assert_eq!(expand_env_vars("no vars"), "no vars");
        assert_eq!(expand_env_vars("${unterminated"), "${unterminated");

        let desc = ServerDescriptor::http("gh", "https://x").with_header("X-Team", "${MCP_HOST_TEST_TEAM}");
        assert_eq!(desc.expanded_headers().get("X-Team").map(String::as_str), Some("blue"));

        // SAFETY: cleanup of the variable set above.
        unsafe {
            std::env::remove_var("MCP_HOST_TEST_TEAM");
        }
    }

    #[test]
    fn test_transport_display() {
        assert_eq!(TransportType::Stdio.to_string(), "stdio");
        assert_eq!(TransportType::Http.to_string(), "http");
    }
}
