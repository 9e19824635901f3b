// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! mcp-host - bridge an LLM reasoning loop to Model Context Protocol tool servers.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`types`] - Core type definitions (Message, ToolDefinition, ProviderResponse, etc.)
//! - [`error`] - Error types and result aliases
//! - [`config`] - Configuration loading and merging
//! - [`providers`] - OpenAI-compatible LLM provider
//! - [`telemetry`] - Tracing, metrics, and observability infrastructure
//! - [`mcp`] - MCP transports (stdio, HTTP/SSE) and the protocol client
//! - [`session`] - Per-conversation MCP sessions, discovery caching and eviction
//! - [`agent`] - The tool-calling orchestration loop
//!
//! ```text
//!   ChatRequest ──► Agent ──► Provider (LLM)
//!                     │
//!                     ▼
//!              SessionManager ──► McpClient ──► Transport ──► tool server
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcp_host::agent::{Agent, ChatRequest};
//! use mcp_host::config::{load_config, CliOptions};
//! use mcp_host::providers::create_provider_from_config;
//! use mcp_host::session::SessionManager;
//!
//! let config = load_config(".".as_ref(), CliOptions::default())?;
//! let sessions = Arc::new(SessionManager::new(
//!     config.server_descriptors(),
//!     config.session_settings(),
//! ));
//! let provider = create_provider_from_config(&config.provider_config())?;
//! let agent = Agent::new(provider, sessions, config.agent_config());
//!
//! let response = agent
//!     .chat(ChatRequest::new("conv-1", "user-1", "What's the weather in Oslo?"))
//!     .await?;
//! println!("{}", response.content());
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod mcp;
pub mod providers;
pub mod session;
pub mod telemetry;
pub mod types;

// Re-export commonly used types at crate root
pub use agent::{Agent, AgentConfig, AgentEvent, ChatRequest, ChatResponse, ToolExecution, TurnError};
pub use error::{AgentError, ConfigError, ProviderError, Result};
pub use mcp::{McpClient, McpError, ServerDescriptor, TransportType};
pub use providers::{create_provider_from_config, OpenAIProvider};
pub use session::{SessionManager, SessionSettings};
pub use types::{
    Message, ModelInfo, Provider, ProviderConfig, ProviderResponse, Role, SharedProvider,
    StopReason, StreamEvent, TokenUsage, ToolCall, ToolDefinition,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_public_exports() {
        let msg = Message::user("test");
        assert_eq!(msg.role, Role::User);
        let _ = ServerDescriptor::stdio("fs", "npx");
    }
}
