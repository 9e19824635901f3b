// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for the MCP host.
//!
//! Library layers return strongly-typed errors defined with `thiserror`;
//! application glue propagates them through `anyhow`. MCP transport,
//! protocol and session failures live in [`crate::mcp::McpError`].

use thiserror::Error;

/// Errors that can occur while talking to an LLM provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("API error: {message}")]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Response parsing error: {0}")]
    ParseError(String),

    #[error("Streaming error: {0}")]
    StreamError(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl ProviderError {
    /// Create an API error with status code.
    pub fn api(message: impl Into<String>, status_code: u16) -> Self {
        Self::ApiError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited(_) | Self::NetworkError(_) | Self::Timeout(_)
        )
    }

    /// Whether the provider could not be reached at all, as opposed to
    /// rejecting a request it received.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError(_) | Self::NotConfigured(_) | Self::Timeout(_)
        )
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config format: {0}")]
    InvalidFormat(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Errors raised by the orchestration loop.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM request failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid tool name: {0}")]
    InvalidToolName(String),

    #[error("Invalid arguments for '{tool}': {message}")]
    InvalidArguments { tool: String, message: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecutionFailed { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {timeout_secs}s")]
    ToolTimeout { tool: String, timeout_secs: u64 },

    #[error("Maximum iterations reached: {0}")]
    MaxIterationsReached(usize),

    #[error("User cancelled operation")]
    UserCancelled,

    #[error("Turn exceeded its time limit of {0}s")]
    TurnTimeout(u64),
}

impl AgentError {
    /// Classify a provider failure: unreachable providers are reported as
    /// unavailable, everything else as a failed request.
    pub fn from_provider(err: ProviderError) -> Self {
        if err.is_unavailable() {
            Self::LlmUnavailable(err.to_string())
        } else {
            Self::Provider(err)
        }
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_retryable() {
        assert!(ProviderError::RateLimited("wait 1s".to_string()).is_retryable());
        assert!(ProviderError::NetworkError("timeout".to_string()).is_retryable());
        assert!(ProviderError::Timeout(30000).is_retryable());
        assert!(!ProviderError::AuthError("invalid key".to_string()).is_retryable());
    }

    #[test]
    fn test_provider_error_api() {
        let err = ProviderError::api("Bad request", 400);
        match err {
            ProviderError::ApiError { message, status_code } => {
                assert_eq!(message, "Bad request");
                assert_eq!(status_code, Some(400));
            }
            _ => panic!("Expected ApiError"),
        }
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_agent_error_classifies_provider_failures() {
        let err = AgentError::from_provider(ProviderError::NetworkError("refused".into()));
        assert!(matches!(err, AgentError::LlmUnavailable(_)));

        let err = AgentError::from_provider(ProviderError::api("bad", 400));
        assert!(matches!(err, AgentError::Provider(_)));
    }

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::ToolTimeout {
            tool: "weather:get_forecast".to_string(),
            timeout_secs: 60,
        };
        let display = err.to_string();
        assert!(display.contains("weather:get_forecast"));
        assert!(display.contains("60"));
    }
}
