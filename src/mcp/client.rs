// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP protocol client.
//!
//! One [`McpClient`] wraps one [`Transport`]. It performs the handshake,
//! exposes the typed request/response operations, and runs a dispatcher task
//! that hands inbound notifications to the registered callbacks and answers
//! the few requests a server may send back (`ping`, `roots/list`).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::McpError;
use super::jsonrpc::{
    InboundMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, INTERNAL_ERROR,
    METHOD_NOT_FOUND,
};
use super::transport::Transport;
use super::types::{
    methods, CallToolResult, ClientCapabilities, GetPromptResult, Implementation,
    InitializeResult, ListPromptsResult, ListResourcesResult, ListToolsResult, LogMessage,
    ProgressNotification, Prompt, ReadResourceResult, Resource, Root, ServerCapabilities, Tool,
    PROTOCOL_VERSION,
};

#[cfg(feature = "telemetry")]
use crate::telemetry::metrics::GLOBAL_METRICS;
#[cfg(feature = "telemetry")]
use std::time::Instant;

/// Upper bound on pages fetched by one list operation.
const MAX_PAGES: usize = 100;

/// Callback with no payload (list-changed notifications).
pub type ListChangedHandler = Arc<dyn Fn() + Send + Sync>;
/// Callback receiving the URI of an updated resource.
pub type ResourceUpdatedHandler = Arc<dyn Fn(String) + Send + Sync>;
/// Callback receiving progress reports.
pub type ProgressHandler = Arc<dyn Fn(ProgressNotification) + Send + Sync>;
/// Callback receiving server log messages.
pub type LogHandler = Arc<dyn Fn(LogMessage) + Send + Sync>;

/// Optional callbacks for server notifications.
///
/// Each callback runs on its own task, so a slow handler never stalls the
/// dispatcher.
#[derive(Clone, Default)]
pub struct NotificationHandlers {
    pub tools_changed: Option<ListChangedHandler>,
    pub resources_changed: Option<ListChangedHandler>,
    pub resource_updated: Option<ResourceUpdatedHandler>,
    pub prompts_changed: Option<ListChangedHandler>,
    pub progress: Option<ProgressHandler>,
    pub log_message: Option<LogHandler>,
}

impl NotificationHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_tools_changed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.tools_changed = Some(Arc::new(f));
        self
    }

    pub fn on_resources_changed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.resources_changed = Some(Arc::new(f));
        self
    }

    pub fn on_resource_updated(mut self, f: impl Fn(String) + Send + Sync + 'static) -> Self {
        self.resource_updated = Some(Arc::new(f));
        self
    }

    pub fn on_prompts_changed(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.prompts_changed = Some(Arc::new(f));
        self
    }

    pub fn on_progress(mut self, f: impl Fn(ProgressNotification) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(f));
        self
    }

    pub fn on_log_message(mut self, f: impl Fn(LogMessage) + Send + Sync + 'static) -> Self {
        self.log_message = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for NotificationHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationHandlers")
            .field("tools_changed", &self.tools_changed.is_some())
            .field("resources_changed", &self.resources_changed.is_some())
            .field("resource_updated", &self.resource_updated.is_some())
            .field("prompts_changed", &self.prompts_changed.is_some())
            .field("progress", &self.progress.is_some())
            .field("log_message", &self.log_message.is_some())
            .finish()
    }
}

/// Handshake state.
#[derive(Debug, Clone)]
enum ClientState {
    Created,
    Initializing,
    Ready(Box<InitializeResult>),
    Closed,
}

/// Client for a single MCP server connection.
pub struct McpClient {
    server_name: String,
    transport: Arc<dyn Transport>,
    state: AsyncMutex<ClientState>,
    next_id: AtomicI64,
    handlers: Arc<RwLock<NotificationHandlers>>,
    roots: Arc<Vec<Root>>,
    request_timeout: Option<Duration>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl McpClient {
    /// Wrap a connected transport. Call [`initialize`](Self::initialize)
    /// before any other operation.
    pub fn new(server_name: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            server_name: server_name.into(),
            transport,
            state: AsyncMutex::new(ClientState::Created),
            next_id: AtomicI64::new(1),
            handlers: Arc::new(RwLock::new(NotificationHandlers::default())),
            roots: Arc::new(Vec::new()),
            request_timeout: None,
            dispatcher: Mutex::new(None),
        }
    }

    /// Roots returned to servers that ask for them.
    pub fn with_roots(mut self, roots: Vec<Root>) -> Self {
        self.roots = Arc::new(roots);
        self
    }

    /// Per-request deadline. Unset means requests wait for the transport.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Replace the notification callbacks. Takes effect for the next
    /// notification dispatched.
    pub fn set_handlers(&self, handlers: NotificationHandlers) {
        *self.handlers.write().unwrap_or_else(PoisonError::into_inner) = handlers;
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Whether the handshake completed and the client is still open.
    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.lock().await, ClientState::Ready(_)) && self.transport.is_connected()
    }

    /// Result of the handshake, once it completed.
    pub async fn server_info(&self) -> Option<InitializeResult> {
        match &*self.state.lock().await {
            ClientState::Ready(result) => Some((**result).clone()),
            _ => None,
        }
    }

    /// Capabilities the server reported.
    pub async fn capabilities(&self) -> Option<ServerCapabilities> {
        self.server_info().await.map(|r| r.capabilities)
    }

    /// Perform the MCP handshake.
    ///
    /// Sends `initialize`, records the server's reply, sends the
    /// `initialized` notification and starts dispatching inbound messages.
    pub async fn initialize(
        &self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult, McpError> {
        {
            let mut state = self.state.lock().await;
            match *state {
                ClientState::Created => *state = ClientState::Initializing,
                ClientState::Initializing | ClientState::Ready(_) => {
                    return Err(McpError::AlreadyInitialized)
                }
                ClientState::Closed => return Err(McpError::TransportClosed),
            }
        }

        match self.handshake(client_info, capabilities).await {
            Ok(result) => {
                *self.state.lock().await = ClientState::Ready(Box::new(result.clone()));
                self.start_dispatcher();
                info!(
                    server = %self.server_name,
                    remote = %result.server_info.name,
                    version = %result.server_info.version,
                    protocol = %result.protocol_version,
                    "MCP server initialized"
                );
                Ok(result)
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                if matches!(*state, ClientState::Initializing) {
                    *state = ClientState::Created;
                }
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
    ) -> Result<InitializeResult, McpError> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": capabilities,
            "clientInfo": client_info,
        });

        let value = self.request(methods::INITIALIZE, Some(params)).await?;
        let result: InitializeResult = serde_json::from_value(value)
            .map_err(|e| McpError::init_failed(&self.server_name, format!("bad initialize result: {}", e)))?;

        if result.protocol_version != PROTOCOL_VERSION {
            debug!(
                server = %self.server_name,
                offered = PROTOCOL_VERSION,
                accepted = %result.protocol_version,
                "Server negotiated a different protocol version"
            );
        }
        self.transport.set_protocol_version(&result.protocol_version);

        self.transport
            .send_notification(JsonRpcNotification::new(methods::INITIALIZED, None))
            .await?;

        Ok(result)
    }

    fn start_dispatcher(&self) {
        let handle = tokio::spawn(dispatch_loop(
            self.server_name.clone(),
            self.transport.clone(),
            self.handlers.clone(),
            self.roots.clone(),
        ));
        if let Some(old) = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle)
        {
            old.abort();
        }
    }

    async fn ensure_ready(&self) -> Result<(), McpError> {
        match *self.state.lock().await {
            ClientState::Ready(_) => Ok(()),
            ClientState::Closed => Err(McpError::TransportClosed),
            ClientState::Created | ClientState::Initializing => Err(McpError::NotInitialized),
        }
    }

    /// Send one request and unwrap its result.
    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method, params);

        #[cfg(feature = "telemetry")]
        let start = Instant::now();

        let response = match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, self.transport.send(request))
                .await
                .map_err(|_| McpError::timeout(method, limit.as_secs()))??,
            None => self.transport.send(request).await?,
        };

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(&format!("mcp.{}", method), start.elapsed());

        response.into_result()
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T, McpError> {
        self.ensure_ready().await?;
        let value = self.request(method, params).await?;
        serde_json::from_value(value)
            .map_err(|e| McpError::InvalidResponse(format!("{}: {}", method, e)))
    }

    /// One page of tools.
    pub async fn list_tools_page(&self, cursor: Option<String>) -> Result<ListToolsResult, McpError> {
        self.call(methods::TOOLS_LIST, cursor_params(cursor)).await
    }

    /// All tools, following pagination.
    pub async fn list_tools(&self) -> Result<Vec<Tool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_PAGES {
            let page = self.list_tools_page(cursor.take()).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }
        warn!(server = %self.server_name, "tools/list pagination limit reached");
        Ok(tools)
    }

    /// Invoke a tool. A tool-level failure comes back as a result with
    /// `is_error` set, not as an `Err`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult, McpError> {
        let arguments = if arguments.is_null() { json!({}) } else { arguments };
        self.call(
            methods::TOOLS_CALL,
            Some(json!({ "name": name, "arguments": arguments })),
        )
        .await
    }

    /// One page of resources.
    pub async fn list_resources_page(
        &self,
        cursor: Option<String>,
    ) -> Result<ListResourcesResult, McpError> {
        self.call(methods::RESOURCES_LIST, cursor_params(cursor)).await
    }

    /// All resources, following pagination.
    pub async fn list_resources(&self) -> Result<Vec<Resource>, McpError> {
        let mut resources = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_PAGES {
            let page = self.list_resources_page(cursor.take()).await?;
            resources.extend(page.resources);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(resources),
            }
        }
        warn!(server = %self.server_name, "resources/list pagination limit reached");
        Ok(resources)
    }

    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        self.call(methods::RESOURCES_READ, Some(json!({ "uri": uri }))).await
    }

    /// One page of prompts.
    pub async fn list_prompts_page(&self, cursor: Option<String>) -> Result<ListPromptsResult, McpError> {
        self.call(methods::PROMPTS_LIST, cursor_params(cursor)).await
    }

    /// All prompts, following pagination.
    pub async fn list_prompts(&self) -> Result<Vec<Prompt>, McpError> {
        let mut prompts = Vec::new();
        let mut cursor = None;
        for _ in 0..MAX_PAGES {
            let page = self.list_prompts_page(cursor.take()).await?;
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(prompts),
            }
        }
        warn!(server = %self.server_name, "prompts/list pagination limit reached");
        Ok(prompts)
    }

    pub async fn get_prompt(&self, name: &str, arguments: Option<Value>) -> Result<GetPromptResult, McpError> {
        let mut params = json!({ "name": name });
        if let Some(args) = arguments {
            params["arguments"] = args;
        }
        self.call(methods::PROMPTS_GET, Some(params)).await
    }

    /// Round-trip liveness check.
    pub async fn ping(&self) -> Result<(), McpError> {
        self.ensure_ready().await?;
        self.request(methods::PING, None).await.map(|_| ())
    }

    /// Close the connection. Safe to call more than once.
    pub async fn close(&self) -> Result<(), McpError> {
        {
            let mut state = self.state.lock().await;
            if matches!(*state, ClientState::Closed) {
                return Ok(());
            }
            *state = ClientState::Closed;
        }
        let result = self.transport.close().await;
        if let Some(handle) = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        debug!(server = %self.server_name, "MCP client closed");
        result
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        if let Some(handle) = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("server_name", &self.server_name)
            .field("transport", &self.transport.kind())
            .finish()
    }
}

fn cursor_params(cursor: Option<String>) -> Option<Value> {
    cursor.map(|c| json!({ "cursor": c }))
}

async fn dispatch_loop(
    server: String,
    transport: Arc<dyn Transport>,
    handlers: Arc<RwLock<NotificationHandlers>>,
    roots: Arc<Vec<Root>>,
) {
    while let Some(message) = transport.receive().await {
        match message {
            InboundMessage::Notification(notification) => {
                let handlers = handlers
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                dispatch_notification(&server, &handlers, notification);
            }
            InboundMessage::Request(request) => {
                let response = answer_server_request(&roots, request);
                if let Err(e) = transport.respond(response).await {
                    debug!(server = %server, error = %e, "Failed to answer server request");
                }
            }
        }
    }
    debug!(server = %server, "MCP dispatcher stopped");
}

fn dispatch_notification(server: &str, handlers: &NotificationHandlers, notification: JsonRpcNotification) {
    let params = notification.params.unwrap_or(Value::Null);
    match notification.method.as_str() {
        methods::TOOLS_LIST_CHANGED => spawn_unit(&handlers.tools_changed),
        methods::RESOURCES_LIST_CHANGED => spawn_unit(&handlers.resources_changed),
        methods::PROMPTS_LIST_CHANGED => spawn_unit(&handlers.prompts_changed),
        methods::RESOURCE_UPDATED => {
            let Some(uri) = params.get("uri").and_then(Value::as_str).map(str::to_string) else {
                debug!(server = %server, "resource update without uri");
                return;
            };
            if let Some(handler) = handlers.resource_updated.clone() {
                tokio::spawn(async move { handler(uri) });
            }
        }
        methods::PROGRESS => match serde_json::from_value::<ProgressNotification>(params) {
            Ok(progress) => {
                if let Some(handler) = handlers.progress.clone() {
                    tokio::spawn(async move { handler(progress) });
                }
            }
            Err(e) => debug!(server = %server, error = %e, "Malformed progress notification"),
        },
        methods::MESSAGE => match serde_json::from_value::<LogMessage>(params) {
            Ok(log) => {
                debug!(server = %server, level = %log.level, data = %log.data, "Server log message");
                if let Some(handler) = handlers.log_message.clone() {
                    tokio::spawn(async move { handler(log) });
                }
            }
            Err(e) => debug!(server = %server, error = %e, "Malformed log notification"),
        },
        other => debug!(server = %server, method = %other, "Ignoring notification"),
    }
}

fn spawn_unit(handler: &Option<ListChangedHandler>) {
    if let Some(handler) = handler.clone() {
        tokio::spawn(async move { handler() });
    }
}

/// Build the reply to a server-initiated request.
fn answer_server_request(roots: &[Root], request: JsonRpcRequest) -> JsonRpcResponse {
    match request.method.as_str() {
        methods::PING => JsonRpcResponse::success(request.id, json!({})),
        methods::ROOTS_LIST => match serde_json::to_value(roots) {
            Ok(list) => JsonRpcResponse::success(request.id, json!({ "roots": list })),
            Err(e) => JsonRpcResponse::failure(request.id, INTERNAL_ERROR, e.to_string()),
        },
        other => JsonRpcResponse::failure(
            request.id,
            METHOD_NOT_FOUND,
            format!("Method not found: {}", other),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::config::TransportType;
    use crate::mcp::jsonrpc::RequestId;
    use crate::mcp::transport::InboundQueue;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;

    /// Answers from a fixed method table and records what was sent.
    struct TableTransport {
        sent: Mutex<Vec<String>>,
        responses: Mutex<Vec<JsonRpcResponse>>,
        inbound: InboundQueue,
        connected: AtomicBool,
    }

    impl TableTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
                responses: Mutex::new(Vec::new()),
                inbound: InboundQueue::new(),
                connected: AtomicBool::new(true),
            })
        }

        fn methods_sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for TableTransport {
        async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
            self.sent.lock().unwrap().push(request.method.clone());
            let result = match request.method.as_str() {
                "initialize" => json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {"listChanged": true}},
                    "serverInfo": {"name": "table", "version": "1.0"}
                }),
                "tools/list" => match request.params.as_ref().and_then(|p| p.get("cursor")) {
                    None => json!({"tools": [{"name": "a"}], "nextCursor": "p2"}),
                    Some(_) => json!({"tools": [{"name": "b"}]}),
                },
                "tools/call" => {
                    return Ok(JsonRpcResponse::failure(request.id, -32602, "bad arguments"))
                }
                _ => json!({}),
            };
            Ok(JsonRpcResponse::success(request.id, result))
        }

        async fn send_notification(&self, n: JsonRpcNotification) -> Result<(), McpError> {
            self.sent.lock().unwrap().push(n.method);
            Ok(())
        }

        async fn respond(&self, response: JsonRpcResponse) -> Result<(), McpError> {
            self.responses.lock().unwrap().push(response);
            Ok(())
        }

        async fn receive(&self) -> Option<InboundMessage> {
            self.inbound.recv().await
        }

        async fn close(&self) -> Result<(), McpError> {
            self.connected.store(false, Ordering::SeqCst);
            self.inbound.close();
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        fn kind(&self) -> TransportType {
            TransportType::Stdio
        }
    }

    #[tokio::test]
    async fn test_operations_require_initialize() {
        let client = McpClient::new("t", TableTransport::new());
        assert!(matches!(client.list_tools().await, Err(McpError::NotInitialized)));
        assert!(matches!(client.ping().await, Err(McpError::NotInitialized)));
    }

    #[tokio::test]
    async fn test_initialize_once() {
        let transport = TableTransport::new();
        let client = McpClient::new("t", transport.clone());

        let result = client
            .initialize(Implementation::default(), ClientCapabilities::default())
            .await
            .unwrap();
        assert_eq!(result.server_info.name, "table");
        assert!(result.capabilities.supports_tools());
        assert_eq!(
            transport.methods_sent(),
            vec!["initialize", "notifications/initialized"]
        );

        let again = client
            .initialize(Implementation::default(), ClientCapabilities::default())
            .await;
        assert!(matches!(again, Err(McpError::AlreadyInitialized)));
        assert!(client.is_ready().await);
    }

    #[tokio::test]
    async fn test_list_tools_follows_cursor() {
        let client = McpClient::new("t", TableTransport::new());
        client
            .initialize(Implementation::default(), ClientCapabilities::default())
            .await
            .unwrap();

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_protocol_error_carries_code() {
        let client = McpClient::new("t", TableTransport::new());
        client
            .initialize(Implementation::default(), ClientCapabilities::default())
            .await
            .unwrap();

        match client.call_tool("x", Value::Null).await {
            Err(McpError::Protocol { code, message, .. }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "bad arguments");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_then_operations_fail() {
        let client = McpClient::new("t", TableTransport::new());
        client
            .initialize(Implementation::default(), ClientCapabilities::default())
            .await
            .unwrap();
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(!client.is_ready().await);
        assert!(matches!(client.list_tools().await, Err(McpError::TransportClosed)));
    }

    #[tokio::test]
    async fn test_notifications_reach_handlers() {
        let transport = TableTransport::new();
        let client = McpClient::new("t", transport.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let tx2 = tx.clone();
        client.set_handlers(
            NotificationHandlers::new()
                .on_tools_changed(move || {
                    let _ = tx.send("tools".to_string());
                })
                .on_resource_updated(move |uri| {
                    let _ = tx2.send(uri);
                }),
        );
        client
            .initialize(Implementation::default(), ClientCapabilities::default())
            .await
            .unwrap();

        transport.inbound.push(InboundMessage::Notification(JsonRpcNotification::new(
            methods::TOOLS_LIST_CHANGED,
            None,
        )));
        transport.inbound.push(InboundMessage::Notification(JsonRpcNotification::new(
            methods::RESOURCE_UPDATED,
            Some(json!({"uri": "file:///a"})),
        )));

        let mut got = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        got.sort();
        assert_eq!(got, vec!["file:///a".to_string(), "tools".to_string()]);
    }

    #[test]
    fn test_answer_server_requests() {
        let roots = vec![Root {
            uri: "file:///work".to_string(),
            name: Some("work".to_string()),
        }];

        let ping = answer_server_request(&roots, JsonRpcRequest::new(1, "ping", None));
        assert_eq!(ping.result, Some(json!({})));

        let listed = answer_server_request(&roots, JsonRpcRequest::new(2, "roots/list", None));
        assert_eq!(
            listed.result,
            Some(json!({"roots": [{"uri": "file:///work", "name": "work"}]}))
        );

        let unknown = answer_server_request(
            &roots,
            JsonRpcRequest::new(RequestId::String("x".into()), "sampling/createMessage", None),
        );
        assert_eq!(unknown.error.map(|e| e.code), Some(METHOD_NOT_FOUND));
    }
}
