// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Model Context Protocol (MCP) client stack.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     McpClient                         │
//! │  handshake · typed operations · notification dispatch │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ dyn Transport
//!              ┌─────────────┴─────────────┐
//!        ┌─────▼─────┐               ┌─────▼─────┐
//!        │   Stdio   │               │   HTTP    │
//!        │ Transport │               │ (+ SSE)   │
//!        └───────────┘               └───────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcp_host::mcp::{
//!     ClientCapabilities, DefaultTransportFactory, Implementation, McpClient,
//!     ServerDescriptor, TransportFactory,
//! };
//!
//! let desc = ServerDescriptor::stdio("fs", "npx")
//!     .with_args(["-y", "@modelcontextprotocol/server-filesystem", "/tmp"]);
//! let transport = DefaultTransportFactory.create(&desc, None).await?;
//! let client = McpClient::new("fs", transport);
//! client.initialize(Implementation::default(), ClientCapabilities::default()).await?;
//!
//! for tool in client.list_tools().await? {
//!     println!("{}", tool.name);
//! }
//! client.close().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod transport;
pub mod types;

pub use client::{McpClient, NotificationHandlers};
pub use config::{ServerDescriptor, TransportType};
pub use error::{ErrorKind, McpError};
pub use jsonrpc::{JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RequestId};
pub use transport::{
    DefaultTransportFactory, HttpTransport, ListenMonitor, StdioTransport, Transport,
    TransportFactory,
};
pub use types::*;
