// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP session management.
//!
//! - **Sessions**: one live connection per (conversation, server), reused
//!   across turns and evicted when idle
//! - **Discovery cache**: tool and resource catalogs per (user, server),
//!   capabilities per server, all TTL-bound
//! - **Keyed locks**: concurrent discovery or session creation for the same
//!   key collapses into one connection
//! - **Reconnect tracking**: consecutive listener failures close a session
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SessionManager                          │
//! │  RwLock<HashMap<(conversation, server), Arc<Session>>>       │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                     │
//!          ▼                    ▼                     ▼
//! ┌─────────────────┐ ┌──────────────────┐ ┌───────────────────┐
//! │  DiscoveryCache │ │    KeyedLocks     │ │ ReconnectTracker  │
//! │  (TTL entries)  │ │ (per-key mutexes) │ │ (per session)     │
//! └─────────────────┘ └──────────────────┘ └───────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcp_host::mcp::ServerDescriptor;
//! use mcp_host::session::{SessionManager, SessionSettings};
//!
//! let manager = Arc::new(SessionManager::new(
//!     vec![ServerDescriptor::stdio("weather", "weather-mcp")],
//!     SessionSettings::default(),
//! ));
//! manager.spawn_cleanup_task();
//!
//! let tools = manager.list_tools_for_user("user-1", None).await;
//! manager.get_or_create_session("conv-1", "weather", None, "user-1").await?;
//! let result = manager
//!     .call_tool("conv-1", "weather", "get_forecast", serde_json::json!({"city": "Oslo"}))
//!     .await?;
//! ```

pub mod cache;
pub mod locks;
pub mod manager;
pub mod reconnect;
pub mod types;

pub use cache::{DiscoveryCache, TtlCache, UserServerKey};
pub use locks::KeyedLocks;
pub use manager::SessionManager;
pub use reconnect::{ReconnectDecision, ReconnectPolicy, ReconnectTracker};
pub use types::{hash_token, ServerStatus, Session, SessionInfo, SessionKey, SessionSettings};
