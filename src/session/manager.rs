// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session manager.
//!
//! Owns every live [`Session`], keyed by (conversation, server), plus the
//! per-user discovery caches. Discovery and probing use short-lived
//! connections and never need a session; tool calls and resource reads
//! require one.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::cache::{DiscoveryCache, TtlCache, UserServerKey};
use super::locks::KeyedLocks;
use super::reconnect::{ReconnectDecision, ReconnectTracker};
use super::types::{ServerStatus, Session, SessionInfo, SessionKey, SessionSettings};
use crate::mcp::client::{McpClient, NotificationHandlers};
use crate::mcp::config::ServerDescriptor;
use crate::mcp::error::McpError;
use crate::mcp::transport::{DefaultTransportFactory, ListenMonitor, Transport, TransportFactory};
use crate::mcp::types::{
    CallToolResult, ClientCapabilities, GetPromptResult, Implementation, Prompt,
    ReadResourceResult, Root, ServerCapabilities, ServerResource, ServerTool,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;
#[cfg(feature = "telemetry")]
use std::time::Instant;

type SessionMap = HashMap<SessionKey, Arc<Session>>;

/// Pools MCP connections per conversation and caches discovery per user.
pub struct SessionManager {
    servers: BTreeMap<String, ServerDescriptor>,
    settings: SessionSettings,
    factory: Arc<dyn TransportFactory>,
    sessions: Arc<RwLock<SessionMap>>,
    cache: Arc<DiscoveryCache>,
    discovery_locks: KeyedLocks<UserServerKey>,
    probe_locks: KeyedLocks<String>,
    creation_locks: KeyedLocks<SessionKey>,
    client_info: Implementation,
    roots: Vec<Root>,
    cleanup: Mutex<Option<CleanupTask>>,
}

struct CleanupTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SessionManager {
    /// Manager using the stock stdio/HTTP transports.
    pub fn new(servers: impl IntoIterator<Item = ServerDescriptor>, settings: SessionSettings) -> Self {
        Self::with_factory(servers, settings, Arc::new(DefaultTransportFactory))
    }

    /// Manager with a custom transport factory.
    pub fn with_factory(
        servers: impl IntoIterator<Item = ServerDescriptor>,
        settings: SessionSettings,
        factory: Arc<dyn TransportFactory>,
    ) -> Self {
        let cache = Arc::new(DiscoveryCache::new(settings.cache_ttl, settings.capability_ttl));
        Self {
            servers: servers.into_iter().map(|d| (d.name.clone(), d)).collect(),
            settings,
            factory,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            cache,
            discovery_locks: KeyedLocks::new(),
            probe_locks: KeyedLocks::new(),
            creation_locks: KeyedLocks::new(),
            client_info: Implementation::default(),
            roots: Vec::new(),
            cleanup: Mutex::new(None),
        }
    }

    /// Identity sent in the handshake.
    pub fn with_client_info(mut self, client_info: Implementation) -> Self {
        self.client_info = client_info;
        self
    }

    /// Roots offered to servers that ask for them.
    pub fn with_roots(mut self, roots: Vec<Root>) -> Self {
        self.roots = roots;
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn cache(&self) -> &DiscoveryCache {
        &self.cache
    }

    /// Every configured server, enabled or not, in name order.
    pub fn servers(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.servers.values()
    }

    fn enabled_servers(&self) -> impl Iterator<Item = &ServerDescriptor> {
        self.servers.values().filter(|d| d.enabled)
    }

    /// Look up an enabled server.
    pub fn descriptor(&self, server: &str) -> Result<&ServerDescriptor, McpError> {
        let descriptor = self
            .servers
            .get(server)
            .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;
        if !descriptor.enabled {
            return Err(McpError::ServerDisabled(server.to_string()));
        }
        Ok(descriptor)
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    fn client_capabilities(&self) -> ClientCapabilities {
        if self.roots.is_empty() {
            ClientCapabilities::default()
        } else {
            ClientCapabilities::with_roots()
        }
    }

    /// Open a transport and complete the handshake. `configure` runs before
    /// the handshake so no early notification is missed. If this future is
    /// dropped mid-handshake the transport is closed.
    ///
    /// `request_timeout` bounds every request after the handshake; session
    /// clients pass `None` and rely on the caller's own deadline.
    async fn connect(
        &self,
        descriptor: &ServerDescriptor,
        bearer_token: Option<&str>,
        request_timeout: Option<Duration>,
        configure: impl FnOnce(&Arc<McpClient>),
    ) -> Result<Arc<McpClient>, McpError> {
        if !descriptor.enabled {
            return Err(McpError::ServerDisabled(descriptor.name.clone()));
        }

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let authorization = descriptor.authorization_for(bearer_token);
        let transport = self.factory.create(descriptor, authorization).await?;
        let mut guard = CloseOnDrop::new(transport.clone());

        let mut client = McpClient::new(&descriptor.name, transport).with_roots(self.roots.clone());
        if let Some(timeout) = request_timeout {
            client = client.with_request_timeout(timeout);
        }
        let client = Arc::new(client);
        configure(&client);

        let limit = Duration::from_secs(descriptor.startup_timeout_sec);
        let handshake = client.initialize(self.client_info.clone(), self.client_capabilities());
        let outcome = match tokio::time::timeout(limit, handshake).await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(McpError::timeout(
                format!("initialize '{}'", descriptor.name),
                descriptor.startup_timeout_sec,
            )),
        };

        if let Err(e) = outcome {
            let _ = client.close().await;
            guard.disarm();
            warn!(server = %descriptor.name, error = %e, "MCP handshake failed");
            return Err(e);
        }

        guard.disarm();

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("mcp.client.initialize", start.elapsed());

        Ok(client)
    }

    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    /// Tools from every enabled server, namespaced by server. A failing
    /// server is logged and skipped.
    pub async fn list_tools_for_user(&self, user: &str, bearer_token: Option<&str>) -> Vec<ServerTool> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let fetches = self.enabled_servers().map(|descriptor| async move {
            let result = self
                .discover(descriptor, user, bearer_token, &self.cache.tools, |client| async move {
                    client.list_tools().await
                })
                .await;
            (descriptor.name.as_str(), result)
        });

        let mut tools = Vec::new();
        for (server, result) in join_all(fetches).await {
            match result {
                Ok(list) => tools.extend(list.into_iter().map(|tool| ServerTool {
                    server: server.to_string(),
                    tool,
                })),
                Err(e) => warn!(server = %server, user = %user, error = %e, "Skipping server in tool discovery"),
            }
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("session.discovery.tools", start.elapsed());

        tools
    }

    /// Resources from every enabled server. A failing server is logged and
    /// skipped.
    pub async fn list_resources_for_user(
        &self,
        user: &str,
        bearer_token: Option<&str>,
    ) -> Vec<ServerResource> {
        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let fetches = self.enabled_servers().map(|descriptor| async move {
            let result = self
                .discover(descriptor, user, bearer_token, &self.cache.resources, |client| async move {
                    let supported = client
                        .capabilities()
                        .await
                        .is_some_and(|c| c.supports_resources());
                    if supported {
                        client.list_resources().await
                    } else {
                        Ok(Vec::new())
                    }
                })
                .await;
            (descriptor.name.as_str(), result)
        });

        let mut resources = Vec::new();
        for (server, result) in join_all(fetches).await {
            match result {
                Ok(list) => resources.extend(list.into_iter().map(|resource| ServerResource {
                    server: server.to_string(),
                    resource,
                })),
                Err(e) => warn!(server = %server, user = %user, error = %e, "Skipping server in resource discovery"),
            }
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation("session.discovery.resources", start.elapsed());

        resources
    }

    /// Cached catalog lookup with a coalescing fetch on miss.
    async fn discover<T, F, Fut>(
        &self,
        descriptor: &ServerDescriptor,
        user: &str,
        bearer_token: Option<&str>,
        cache: &TtlCache<UserServerKey, Vec<T>>,
        fetch: F,
    ) -> Result<Vec<T>, McpError>
    where
        T: Clone,
        F: FnOnce(Arc<McpClient>) -> Fut,
        Fut: Future<Output = Result<Vec<T>, McpError>>,
    {
        let key = UserServerKey::new(user, &descriptor.name);
        if let Some(hit) = cache.get(&key) {
            return Ok(hit);
        }

        let _guard = self.discovery_locks.lock(&key).await;
        if let Some(hit) = cache.get(&key) {
            debug!(server = %descriptor.name, user = %user, "Discovery coalesced onto cached result");
            return Ok(hit);
        }

        let limit = Some(self.settings.discovery_timeout);
        let client = self.connect(descriptor, bearer_token, limit, |_| {}).await?;
        // A caller dropping this future mid-fetch must not leak the connection.
        let mut guard = CloseOnDrop::new(client.transport().clone());
        if let Some(caps) = client.capabilities().await {
            self.cache.capabilities.insert(descriptor.name.clone(), caps);
        }
        let result = fetch(client.clone()).await;
        if let Err(e) = client.close().await {
            debug!(server = %descriptor.name, error = %e, "Error closing discovery connection");
        }
        guard.disarm();

        let items = result?;
        cache.insert(key, items.clone());
        Ok(items)
    }

    /// Capabilities of one server, from cache or a short-lived handshake.
    pub async fn probe_server(
        &self,
        descriptor: &ServerDescriptor,
        bearer_token: Option<&str>,
    ) -> Result<ServerCapabilities, McpError> {
        if !descriptor.enabled {
            return Err(McpError::ServerDisabled(descriptor.name.clone()));
        }
        if let Some(caps) = self.cache.capabilities.get(&descriptor.name) {
            return Ok(caps);
        }

        let _guard = self.probe_locks.lock(&descriptor.name).await;
        if let Some(caps) = self.cache.capabilities.get(&descriptor.name) {
            return Ok(caps);
        }

        let limit = Some(self.settings.discovery_timeout);
        let client = self.connect(descriptor, bearer_token, limit, |_| {}).await?;
        let caps = client.capabilities().await.unwrap_or_default();
        if let Err(e) = client.close().await {
            debug!(server = %descriptor.name, error = %e, "Error closing probe connection");
        }

        self.cache.capabilities.insert(descriptor.name.clone(), caps.clone());
        Ok(caps)
    }

    /// Probe every configured server in parallel. Disabled servers are
    /// reported without connecting.
    pub async fn probe_all(&self, bearer_token: Option<&str>) -> Vec<ServerStatus> {
        let probes = self.servers.values().map(|descriptor| async move {
            if !descriptor.enabled {
                return ServerStatus {
                    name: descriptor.name.clone(),
                    enabled: false,
                    capabilities: None,
                    error: None,
                };
            }
            match self.probe_server(descriptor, bearer_token).await {
                Ok(caps) => ServerStatus {
                    name: descriptor.name.clone(),
                    enabled: true,
                    capabilities: Some(caps),
                    error: None,
                },
                Err(e) => ServerStatus {
                    name: descriptor.name.clone(),
                    enabled: true,
                    capabilities: None,
                    error: Some(e.to_string()),
                },
            }
        });
        join_all(probes).await
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// The live session for (conversation, server), if any.
    pub async fn get_session(&self, conversation: &str, server: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(&SessionKey::new(conversation, server))
            .cloned()
    }

    /// Return the session for (conversation, server), opening one if needed.
    ///
    /// For servers that forward bearer tokens, an existing session opened
    /// with a different token is closed and replaced. Concurrent callers for
    /// the same key share one handshake.
    pub async fn get_or_create_session(
        &self,
        conversation: &str,
        server: &str,
        bearer_token: Option<&str>,
        user: &str,
    ) -> Result<Arc<Session>, McpError> {
        let descriptor = self.descriptor(server)?;
        let key = SessionKey::new(conversation, server);

        if let Some(session) = self.reusable_session(&key, descriptor, bearer_token).await {
            return Ok(session);
        }

        let _creation = self.creation_locks.lock(&key).await;
        if let Some(session) = self.reusable_session(&key, descriptor, bearer_token).await {
            return Ok(session);
        }

        let session = self.open_session(&key, descriptor, bearer_token, user).await?;
        self.sessions.write().await.insert(key.clone(), session.clone());
        self.start_listener(key, &session);

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_session_opened();

        info!(
            conversation = %conversation,
            server = %server,
            user = %user,
            session_id = %session.session_id(),
            "MCP session created"
        );
        Ok(session)
    }

    /// Existing session usable by this caller. A token-mismatched session
    /// is removed and closed.
    async fn reusable_session(
        &self,
        key: &SessionKey,
        descriptor: &ServerDescriptor,
        bearer_token: Option<&str>,
    ) -> Option<Arc<Session>> {
        let existing = self.sessions.read().await.get(key).cloned()?;

        if !descriptor.binds_bearer_token() || existing.matches_token(bearer_token) {
            existing.touch();
            return Some(existing);
        }

        info!(
            conversation = %key.conversation,
            server = %key.server,
            session_id = %existing.session_id(),
            "Bearer token changed; replacing MCP session"
        );
        let removed = {
            let mut sessions = self.sessions.write().await;
            let current = sessions.get(key).is_some_and(|s| Arc::ptr_eq(s, &existing));
            if current {
                sessions.remove(key);
            }
            current
        };
        close_session_client(&existing).await;

        if removed {
            #[cfg(feature = "telemetry")]
            GLOBAL_METRICS.record_session_closed();
        }

        None
    }

    async fn open_session(
        &self,
        key: &SessionKey,
        descriptor: &ServerDescriptor,
        bearer_token: Option<&str>,
        user: &str,
    ) -> Result<Arc<Session>, McpError> {
        let catalog_key = UserServerKey::new(user, &key.server);
        let cache = self.cache.clone();
        let client = self
            .connect(descriptor, bearer_token, None, |client| {
                client.set_handlers(refresh_handlers(Arc::downgrade(client), cache, catalog_key));
            })
            .await?;

        let mut session = Session::new(key, user, client, bearer_token);
        let tracker = descriptor
            .listen
            .then(|| Arc::new(ReconnectTracker::new(self.settings.reconnect)));
        if let Some(tracker) = tracker {
            session = session.with_reconnect(tracker);
        }
        Ok(Arc::new(session))
    }

    /// Start the notification listener of a registered session. Must run
    /// after the session is in the map so a give-up can remove it.
    fn start_listener(&self, key: SessionKey, session: &Arc<Session>) {
        let Some(tracker) = session.reconnect_tracker().cloned() else {
            return;
        };
        let server = key.server.clone();
        let monitor = Arc::new(SessionListenMonitor {
            key,
            session: Arc::downgrade(session),
            tracker,
            sessions: Arc::downgrade(&self.sessions),
        });
        if !session.client().transport().start_listening(monitor) {
            debug!(server = %server, "Transport has no notification listener");
        }
    }

    /// Close and remove one session. Returns whether one existed.
    pub async fn close_session(&self, conversation: &str, server: &str) -> bool {
        let key = SessionKey::new(conversation, server);
        let removed = self.sessions.write().await.remove(&key);
        self.creation_locks.remove(&key);

        match removed {
            Some(session) => {
                close_session_client(&session).await;
                #[cfg(feature = "telemetry")]
                GLOBAL_METRICS.record_session_closed();
                info!(conversation = %conversation, server = %server, "MCP session closed");
                true
            }
            None => false,
        }
    }

    /// Close every session of a conversation. Returns how many were closed.
    pub async fn close_conversation(&self, conversation: &str) -> usize {
        let removed: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let keys: Vec<SessionKey> = sessions
                .keys()
                .filter(|k| k.conversation == conversation)
                .cloned()
                .collect();
            keys.iter().filter_map(|k| sessions.remove(k)).collect()
        };

        for session in &removed {
            self.creation_locks.remove(&session.key());
        }
        join_all(removed.iter().map(|s| close_session_client(s))).await;

        #[cfg(feature = "telemetry")]
        for _ in &removed {
            GLOBAL_METRICS.record_session_closed();
        }

        if !removed.is_empty() {
            info!(conversation = %conversation, count = removed.len(), "Closed conversation sessions");
        }
        removed.len()
    }

    /// Evict sessions idle longer than the configured timeout and prune
    /// expired cache entries. Returns how many sessions were evicted.
    pub async fn cleanup_idle_sessions(&self) -> usize {
        let timeout = self.settings.session_timeout;
        let evicted: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write().await;
            let idle: Vec<SessionKey> = sessions
                .iter()
                .filter(|(_, s)| s.is_idle(timeout))
                .map(|(k, _)| k.clone())
                .collect();
            idle.iter().filter_map(|k| sessions.remove(k)).collect()
        };

        for session in &evicted {
            debug!(
                conversation = %session.conversation_id(),
                server = %session.server_name(),
                idle_secs = session.idle_for().as_secs(),
                "Evicting idle MCP session"
            );
            self.creation_locks.remove(&session.key());
        }
        join_all(evicted.iter().map(|s| close_session_client(s))).await;

        let pruned = self.cache.prune();
        self.discovery_locks.prune();
        self.probe_locks.prune();

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_sessions_evicted(evicted.len() as u64);

        if !evicted.is_empty() || pruned > 0 {
            info!(evicted = evicted.len(), cache_pruned = pruned, "Session cleanup finished");
        }
        evicted.len()
    }

    /// Start the periodic idle sweep. Calling it again restarts the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) {
        let (stop, mut stopped) = watch::channel(false);
        let weak = Arc::downgrade(self);
        let period = self.settings.cleanup_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let Some(manager) = weak.upgrade() else { break };
                        manager.cleanup_idle_sessions().await;
                    }
                    _ = stopped.changed() => break,
                }
            }
            debug!("Session cleanup task stopped");
        });

        let previous = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(CleanupTask { stop, handle });
        if let Some(previous) = previous {
            previous.stop.send_replace(true);
            previous.handle.abort();
        }
    }

    /// Stop the sweep and close every session.
    pub async fn shutdown(&self) -> usize {
        let task = self
            .cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.stop.send_replace(true);
            let _ = task.handle.await;
        }

        let all: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        join_all(all.iter().map(|s| close_session_client(s))).await;
        self.creation_locks.prune();

        #[cfg(feature = "telemetry")]
        for _ in &all {
            GLOBAL_METRICS.record_session_closed();
        }

        info!(closed = all.len(), "Session manager shut down");
        all.len()
    }

    /// Snapshots of every live session.
    pub async fn active_sessions(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self.sessions.read().await.values().map(|s| s.info()).collect();
        infos.sort_by(|a, b| {
            (a.conversation_id.as_str(), a.server.as_str()).cmp(&(b.conversation_id.as_str(), b.server.as_str()))
        });
        infos
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    // ------------------------------------------------------------------
    // Invocation
    // ------------------------------------------------------------------

    async fn require_session(&self, conversation: &str, server: &str) -> Result<Arc<Session>, McpError> {
        self.get_session(conversation, server)
            .await
            .ok_or_else(|| McpError::NoActiveSession {
                conversation: conversation.to_string(),
                server: server.to_string(),
            })
    }

    /// Call a tool through the conversation's existing session.
    pub async fn call_tool(
        &self,
        conversation: &str,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<CallToolResult, McpError> {
        let session = self.require_session(conversation, server).await?;
        session.touch();
        let result = session.client().call_tool(tool, arguments).await;
        session.touch();
        result
    }

    /// Read a resource through the conversation's existing session.
    pub async fn read_resource(
        &self,
        conversation: &str,
        server: &str,
        uri: &str,
    ) -> Result<ReadResourceResult, McpError> {
        let session = self.require_session(conversation, server).await?;
        session.touch();
        let result = session.client().read_resource(uri).await;
        session.touch();
        result
    }

    pub async fn get_prompt(
        &self,
        conversation: &str,
        server: &str,
        name: &str,
        arguments: Option<Value>,
    ) -> Result<GetPromptResult, McpError> {
        let session = self.require_session(conversation, server).await?;
        session.touch();
        let result = session.client().get_prompt(name, arguments).await;
        session.touch();
        result
    }

    pub async fn list_prompts_for_session(
        &self,
        conversation: &str,
        server: &str,
    ) -> Result<Vec<Prompt>, McpError> {
        let session = self.require_session(conversation, server).await?;
        session.touch();
        let result = session.client().list_prompts().await;
        session.touch();
        result
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(task) = self
            .cleanup
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.handle.abort();
        }
    }
}

async fn close_session_client(session: &Session) {
    if let Err(e) = session.client().close().await {
        debug!(
            server = %session.server_name(),
            session_id = %session.session_id(),
            error = %e,
            "Error closing MCP session"
        );
    }
}

/// List-changed callbacks that refresh the user's cached catalogs.
fn refresh_handlers(
    client: Weak<McpClient>,
    cache: Arc<DiscoveryCache>,
    key: UserServerKey,
) -> NotificationHandlers {
    let tools_client = client.clone();
    let tools_cache = cache.clone();
    let tools_key = key.clone();

    NotificationHandlers::new()
        .on_tools_changed(move || {
            let client = tools_client.clone();
            let cache = tools_cache.clone();
            let key = tools_key.clone();
            tokio::spawn(async move {
                let Some(client) = client.upgrade() else { return };
                match client.list_tools().await {
                    Ok(tools) => {
                        debug!(server = %key.server, user = %key.user, count = tools.len(), "Refreshed tool cache");
                        cache.tools.insert(key, tools);
                    }
                    Err(e) => warn!(server = %key.server, error = %e, "Tool cache refresh failed"),
                }
            });
        })
        .on_resources_changed(move || {
            let client = client.clone();
            let cache = cache.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let Some(client) = client.upgrade() else { return };
                match client.list_resources().await {
                    Ok(resources) => {
                        debug!(server = %key.server, user = %key.user, count = resources.len(), "Refreshed resource cache");
                        cache.resources.insert(key, resources);
                    }
                    Err(e) => warn!(server = %key.server, error = %e, "Resource cache refresh failed"),
                }
            });
        })
}

/// Applies the reconnect policy to one session's listener and closes the
/// session once the policy gives up.
struct SessionListenMonitor {
    key: SessionKey,
    session: Weak<Session>,
    tracker: Arc<ReconnectTracker>,
    sessions: Weak<RwLock<SessionMap>>,
}

#[async_trait]
impl ListenMonitor for SessionListenMonitor {
    fn on_connected(&self) {
        self.tracker.record_success();
    }

    async fn on_failure(&self, error: &McpError) -> bool {
        match self.tracker.record_failure().await {
            ReconnectDecision::Retry { attempt } => {
                debug!(server = %self.key.server, attempt, error = %error, "Reconnecting notification listener");
                true
            }
            ReconnectDecision::GiveUp { attempts } => {
                warn!(
                    conversation = %self.key.conversation,
                    server = %self.key.server,
                    attempts,
                    error = %error,
                    "Notification listener abandoned; closing MCP session"
                );
                self.abandon().await;
                false
            }
        }
    }
}

impl SessionListenMonitor {
    async fn abandon(&self) {
        let (Some(session), Some(sessions)) = (self.session.upgrade(), self.sessions.upgrade()) else {
            return;
        };
        let removed = {
            let mut map = sessions.write().await;
            let current = map.get(&self.key).is_some_and(|s| Arc::ptr_eq(s, &session));
            if current {
                map.remove(&self.key);
            }
            current
        };
        if !removed {
            // Already closed and counted by whoever removed it.
            return;
        }

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_session_closed();

        // Closing the transport aborts this listener, so close elsewhere.
        tokio::spawn(async move { close_session_client(&session).await });
    }
}

/// Closes a transport whose handshake never finished.
struct CloseOnDrop {
    transport: Option<Arc<dyn Transport>>,
}

impl CloseOnDrop {
    fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    fn disarm(&mut self) {
        self.transport = None;
    }
}

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = transport.close().await;
            });
        }
    }
}
