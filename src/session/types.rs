// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session types: the live binding of a conversation to one server.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::time::Instant;

use super::cache::{DEFAULT_CACHE_TTL, DEFAULT_CAPABILITY_TTL};
use super::reconnect::{ReconnectPolicy, ReconnectTracker};
use crate::mcp::types::ServerCapabilities;
use crate::mcp::McpClient;
use crate::telemetry::CorrelationId;

/// Key of the session map.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub conversation: String,
    pub server: String,
}

impl SessionKey {
    pub fn new(conversation: impl Into<String>, server: impl Into<String>) -> Self {
        Self {
            conversation: conversation.into(),
            server: server.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conversation, self.server)
    }
}

/// Hex SHA-256 of a bearer token. Sessions store this, never the token.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Mutable per-session fields, guarded separately from the session map.
#[derive(Debug)]
struct SessionState {
    last_accessed: Instant,
    token_hash: Option<String>,
}

/// A live connection from one conversation to one server.
pub struct Session {
    conversation_id: String,
    user_id: String,
    server_name: String,
    session_id: CorrelationId,
    client: Arc<McpClient>,
    created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
    reconnect: Option<Arc<ReconnectTracker>>,
}

impl Session {
    pub fn new(
        key: &SessionKey,
        user_id: impl Into<String>,
        client: Arc<McpClient>,
        bearer_token: Option<&str>,
    ) -> Self {
        Self {
            conversation_id: key.conversation.clone(),
            user_id: user_id.into(),
            server_name: key.server.clone(),
            session_id: CorrelationId::new(),
            client,
            created_at: Utc::now(),
            state: Mutex::new(SessionState {
                last_accessed: Instant::now(),
                token_hash: bearer_token.filter(|t| !t.is_empty()).map(hash_token),
            }),
            reconnect: None,
        }
    }

    /// Attach the listener failure tracker.
    pub fn with_reconnect(mut self, tracker: Arc<ReconnectTracker>) -> Self {
        self.reconnect = Some(tracker);
        self
    }

    pub fn key(&self) -> SessionKey {
        SessionKey::new(&self.conversation_id, &self.server_name)
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn session_id(&self) -> CorrelationId {
        self.session_id
    }

    pub fn client(&self) -> &Arc<McpClient> {
        &self.client
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn reconnect_tracker(&self) -> Option<&Arc<ReconnectTracker>> {
        self.reconnect.as_ref()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refresh the last-accessed time.
    pub fn touch(&self) {
        self.state().last_accessed = Instant::now();
    }

    pub fn last_accessed(&self) -> Instant {
        self.state().last_accessed
    }

    /// Time since the session was last used.
    pub fn idle_for(&self) -> Duration {
        self.last_accessed().elapsed()
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.idle_for() > timeout
    }

    pub fn token_hash(&self) -> Option<String> {
        self.state().token_hash.clone()
    }

    /// Whether this session was opened with the same bearer token.
    pub fn matches_token(&self, bearer_token: Option<&str>) -> bool {
        let incoming = bearer_token.filter(|t| !t.is_empty()).map(hash_token);
        self.state().token_hash == incoming
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            conversation_id: self.conversation_id.clone(),
            user_id: self.user_id.clone(),
            server: self.server_name.clone(),
            session_id: self.session_id,
            created_at: self.created_at,
            idle_secs: self.idle_for().as_secs(),
            listener_failures: self.reconnect.as_ref().map(|r| r.failures()).unwrap_or(0),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("conversation_id", &self.conversation_id)
            .field("user_id", &self.user_id)
            .field("server", &self.server_name)
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// Snapshot of a live session for status surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub conversation_id: String,
    pub user_id: String,
    pub server: String,
    pub session_id: CorrelationId,
    pub created_at: DateTime<Utc>,
    pub idle_secs: u64,
    pub listener_failures: u32,
}

/// Result of probing one server.
#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub name: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<ServerCapabilities>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerStatus {
    pub fn is_healthy(&self) -> bool {
        self.enabled && self.capabilities.is_some()
    }
}

/// Session manager tunables.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    /// Idle time after which a session is evicted.
    pub session_timeout: Duration,
    /// Interval of the idle sweep.
    pub cleanup_interval: Duration,
    /// Lifetime of cached tool/resource catalogs.
    pub cache_ttl: Duration,
    /// Lifetime of cached capabilities.
    pub capability_ttl: Duration,
    /// Per-request limit on the short-lived discovery and probe clients.
    pub discovery_timeout: Duration,
    /// Listener reconnect policy.
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(30 * 60),
            cleanup_interval: Duration::from_secs(5 * 60),
            cache_ttl: DEFAULT_CACHE_TTL,
            capability_ttl: DEFAULT_CAPABILITY_TTL,
            discovery_timeout: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}
