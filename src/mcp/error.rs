// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP error types.

use thiserror::Error;

/// Coarse classification of an [`McpError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Connect or I/O failure, bad HTTP status, malformed frame.
    Transport,
    /// Server-returned JSON-RPC error, handshake failure, client misuse.
    Protocol,
    /// Missing session, unknown or disabled server.
    Session,
}

/// Errors that can occur during MCP operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// Transport-level failure (spawn, connect, write).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status.
    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    /// Response could not be decoded as JSON-RPC.
    #[error("Invalid response from MCP server: {0}")]
    InvalidResponse(String),

    /// The transport closed before a reply arrived.
    #[error("Transport closed")]
    TransportClosed,

    /// An operation exceeded its deadline.
    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    /// Protocol error returned by the server.
    #[error("Protocol error: code={code}, message={message}")]
    Protocol {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// Handshake failed.
    #[error("Failed to initialize MCP server '{server}': {message}")]
    InitializationFailed { server: String, message: String },

    /// Operation attempted before `initialize` completed.
    #[error("MCP client is not initialized")]
    NotInitialized,

    /// `initialize` called twice.
    #[error("MCP client is already initialized")]
    AlreadyInitialized,

    /// No live session for this conversation and server.
    #[error("No active session for server '{server}' in conversation '{conversation}'")]
    NoActiveSession { conversation: String, server: String },

    /// Server name not present in the configuration.
    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    /// Server is configured but disabled.
    #[error("MCP server '{0}' is disabled")]
    ServerDisabled(String),

    /// Invalid server descriptor.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// Create an initialization failed error.
    pub fn init_failed(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InitializationFailed {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Create a protocol error without data.
    pub fn protocol(code: i64, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, timeout_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_secs,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_)
            | Self::HttpStatus { .. }
            | Self::InvalidResponse(_)
            | Self::TransportClosed
            | Self::Timeout { .. }
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Transport,
            Self::Protocol { .. }
            | Self::InitializationFailed { .. }
            | Self::NotInitialized
            | Self::AlreadyInitialized => ErrorKind::Protocol,
            Self::NoActiveSession { .. }
            | Self::ServerNotFound(_)
            | Self::ServerDisabled(_)
            | Self::Config(_) => ErrorKind::Session,
        }
    }
}
