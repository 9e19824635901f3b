// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-process MCP servers and a scripted LLM shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use mcp_host::error::ProviderError;
use mcp_host::mcp::jsonrpc::InboundMessage;
use mcp_host::mcp::transport::{InboundQueue, ListenMonitor};
use mcp_host::mcp::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpError, ServerDescriptor, Transport,
    TransportFactory, TransportType, PROTOCOL_VERSION,
};
use mcp_host::types::{
    Message, Provider, ProviderResponse, StreamCallback, StreamEvent, ToolCall,
    ToolDefinition,
};

/// Computes a `tools/call` result from the tool name and arguments.
pub type ToolHandler = Arc<dyn Fn(&str, &Value) -> Value + Send + Sync>;

/// Behaviour of one fake server.
#[derive(Clone)]
pub struct MockServer {
    /// Shared by every connection, so a test can change the catalog.
    pub tools: Arc<Mutex<Vec<Value>>>,
    pub handler: ToolHandler,
    /// Delay before answering `initialize`.
    pub handshake_delay: Duration,
    /// Delay before answering `tools/list`.
    pub list_delay: Duration,
    /// Delay before answering `tools/call`.
    pub call_delay: Duration,
    /// Whether `start_listening` runs a listener that always fails.
    pub failing_listener: bool,
}

impl MockServer {
    pub fn new(tools: Vec<Value>) -> Self {
        Self {
            tools: Arc::new(Mutex::new(tools)),
            handler: Arc::new(|name, _| json!({"content": [{"type": "text", "text": format!("{} ok", name)}]})),
            handshake_delay: Duration::ZERO,
            list_delay: Duration::ZERO,
            call_delay: Duration::ZERO,
            failing_listener: false,
        }
    }

    pub fn set_tools(&self, tools: Vec<Value>) {
        *self.tools.lock().unwrap() = tools;
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn with_failing_listener(mut self) -> Self {
        self.failing_listener = true;
        self
    }

    pub fn with_handler(mut self, handler: impl Fn(&str, &Value) -> Value + Send + Sync + 'static) -> Self {
        self.handler = Arc::new(handler);
        self
    }

    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = delay;
        self
    }
}

/// A `tools/call` the fake servers received.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub server: String,
    pub tool: String,
    pub arguments: Value,
}

/// Everything the fake servers observed.
#[derive(Default)]
pub struct ServerLog {
    pub connects: Mutex<HashMap<String, usize>>,
    pub authorizations: Mutex<Vec<Option<String>>>,
    pub calls: Mutex<Vec<RecordedCall>>,
    pub closed: AtomicUsize,
    /// Inbound queue of every connection, in creation order.
    pub queues: Mutex<Vec<(String, Arc<InboundQueue>)>>,
}

impl ServerLog {
    pub fn connects(&self, server: &str) -> usize {
        self.connects.lock().unwrap().get(server).copied().unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Push a server notification onto the newest connection to `server`.
    pub fn notify(&self, server: &str, method: &str) {
        let queues = self.queues.lock().unwrap();
        let (_, queue) = queues
            .iter()
            .rev()
            .find(|(name, _)| name == server)
            .expect("no connection to server");
        queue.push(InboundMessage::Notification(JsonRpcNotification::new(method, None)));
    }
}

pub struct MockTransport {
    server: String,
    spec: MockServer,
    log: Arc<ServerLog>,
    inbound: Arc<InboundQueue>,
    connected: AtomicBool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        if !self.is_connected() {
            return Err(McpError::TransportClosed);
        }
        let result = match request.method.as_str() {
            "initialize" => {
                tokio::time::sleep(self.spec.handshake_delay).await;
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {"listChanged": true}},
                    "serverInfo": {"name": self.server, "version": "1.0"}
                })
            }
            "tools/list" => {
                tokio::time::sleep(self.spec.list_delay).await;
                let tools = self.spec.tools.lock().unwrap().clone();
                json!({"tools": tools})
            }
            "tools/call" => {
                tokio::time::sleep(self.spec.call_delay).await;
                let params = request.params.clone().unwrap_or(Value::Null);
                let tool = params["name"].as_str().unwrap_or_default().to_string();
                let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);
                self.log.calls.lock().unwrap().push(RecordedCall {
                    server: self.server.clone(),
                    tool: tool.clone(),
                    arguments: arguments.clone(),
                });
                (self.spec.handler)(&tool, &arguments)
            }
            "ping" => json!({}),
            other => {
                return Ok(JsonRpcResponse::failure(
                    request.id,
                    -32601,
                    format!("Method not found: {}", other),
                ))
            }
        };
        Ok(JsonRpcResponse::success(request.id, result))
    }

    async fn send_notification(&self, _notification: JsonRpcNotification) -> Result<(), McpError> {
        Ok(())
    }

    async fn respond(&self, _response: JsonRpcResponse) -> Result<(), McpError> {
        Ok(())
    }

    async fn receive(&self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    async fn close(&self) -> Result<(), McpError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.log.closed.fetch_add(1, Ordering::SeqCst);
        }
        self.inbound.close();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportType {
        TransportType::Http
    }

    fn start_listening(&self, monitor: Arc<dyn ListenMonitor>) -> bool {
        if !self.spec.failing_listener {
            return false;
        }
        let server = self.server.clone();
        tokio::spawn(async move {
            let error = McpError::Transport(format!("{} listener refused", server));
            while monitor.on_failure(&error).await {}
        });
        true
    }
}

/// Hands out [`MockTransport`]s for the servers it knows.
pub struct MockTransportFactory {
    servers: HashMap<String, MockServer>,
    pub log: Arc<ServerLog>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self {
            servers: HashMap::new(),
            log: Arc::new(ServerLog::default()),
        }
    }

    pub fn with_server(mut self, name: &str, server: MockServer) -> Self {
        self.servers.insert(name.to_string(), server);
        self
    }
}

#[async_trait]
impl TransportFactory for MockTransportFactory {
    async fn create(
        &self,
        descriptor: &ServerDescriptor,
        authorization: Option<String>,
    ) -> Result<Arc<dyn Transport>, McpError> {
        *self
            .log
            .connects
            .lock()
            .unwrap()
            .entry(descriptor.name.clone())
            .or_default() += 1;
        self.log.authorizations.lock().unwrap().push(authorization);

        let spec = self
            .servers
            .get(&descriptor.name)
            .cloned()
            .ok_or_else(|| McpError::Transport(format!("{} refused", descriptor.name)))?;

        let inbound = Arc::new(InboundQueue::new());
        self.log
            .queues
            .lock()
            .unwrap()
            .push((descriptor.name.clone(), inbound.clone()));

        Ok(Arc::new(MockTransport {
            server: descriptor.name.clone(),
            spec,
            log: self.log.clone(),
            inbound,
            connected: AtomicBool::new(true),
        }))
    }
}

/// A tool entry as a server lists it.
pub fn tool(name: &str, description: &str, schema: Value) -> Value {
    json!({"name": name, "description": description, "inputSchema": schema})
}

pub fn text_result(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

/// What the scripted model saw on one call.
#[derive(Debug, Clone)]
pub struct ProviderCall {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub model: Option<String>,
}

/// LLM stand-in answering from a queue of canned responses. Once the queue
/// is empty it keeps answering with `fallback`.
pub struct ScriptedProvider {
    responses: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    fallback: ProviderResponse,
    pub calls: Mutex<Vec<ProviderCall>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            fallback: ProviderResponse::text("done"),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Keep requesting the same tool forever.
    pub fn looping(call: ToolCall) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            fallback: ProviderResponse::with_tool_calls(vec![call]),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(error)])),
            fallback: ProviderResponse::text("done"),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next(&self, messages: &[Message], tools: Option<&[ToolDefinition]>, model: Option<&str>) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().unwrap().push(ProviderCall {
            messages: messages.to_vec(),
            tools: tools.map(<[ToolDefinition]>::to_vec).unwrap_or_default(),
            model: model.map(str::to_string),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        self.next(messages, tools, model)
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: Option<&str>,
        on_event: StreamCallback,
    ) -> Result<ProviderResponse, ProviderError> {
        let response = self.next(messages, tools, model)?;
        if !response.content.is_empty() {
            on_event(StreamEvent::TextDelta(response.content.clone()));
        }
        on_event(StreamEvent::Done(response.stop_reason));
        Ok(response)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }
}
