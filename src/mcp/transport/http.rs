// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Streamable HTTP transport.
//!
//! Every outgoing frame is a POST to the server endpoint. The server answers
//! either with a single JSON body or with an SSE stream that may interleave
//! notifications before the reply. A session id handed out by the server is
//! echoed on every later request, and an optional GET stream carries
//! server push notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::sse::{is_event_stream_content_type, SseDecoder};
use super::{InboundQueue, ListenMonitor, Transport};
use crate::mcp::config::{ServerDescriptor, TransportType};
use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{
    InboundMessage, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};

/// Header carrying the server-assigned session id.
pub const SESSION_ID_HEADER: &str = "mcp-session-id";

/// Header carrying the negotiated protocol revision.
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

const ACCEPT_POST: &str = "application/json, text/event-stream";
const ACCEPT_LISTEN: &str = "text/event-stream";

/// Deadline for the best-effort session teardown request.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport over HTTP POST with optional SSE responses.
pub struct HttpTransport {
    inner: Arc<HttpInner>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

struct HttpInner {
    server_name: String,
    client: Client,
    url: String,
    headers: HashMap<String, String>,
    authorization: Option<String>,
    session_id: Mutex<Option<String>>,
    protocol_version: Mutex<Option<String>>,
    connected: AtomicBool,
    closed: watch::Sender<bool>,
    inbound: InboundQueue,
}

impl HttpTransport {
    /// Build a transport for the descriptor's endpoint. No request is made
    /// until the first frame is sent.
    pub fn new(descriptor: &ServerDescriptor, authorization: Option<String>) -> Result<Self, McpError> {
        let url = descriptor
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| McpError::Config("HTTP transport requires 'url' field".to_string()))?;

        let client = Client::builder()
            .build()
            .map_err(|e| McpError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let (closed, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(HttpInner {
                server_name: descriptor.name.clone(),
                client,
                url,
                headers: descriptor.expanded_headers(),
                authorization,
                session_id: Mutex::new(None),
                protocol_version: Mutex::new(None),
                connected: AtomicBool::new(true),
                closed,
                inbound: InboundQueue::new(),
            }),
            listener: Mutex::new(None),
        })
    }

    /// Session id assigned by the server, once one has been received.
    pub fn session_id(&self) -> Option<String> {
        self.inner.session_id()
    }

    /// Run `fut` unless the transport closes first.
    async fn until_closed<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, McpError>>,
    ) -> Result<T, McpError> {
        let closed = self.inner.closed.subscribe();
        tokio::select! {
            result = fut => result,
            _ = closed_signal(closed) => Err(McpError::TransportClosed),
        }
    }

    fn ensure_open(&self) -> Result<(), McpError> {
        if self.inner.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(McpError::TransportClosed)
        }
    }

    /// POST a frame that expects no reply. Any body is drained for pushed
    /// messages and otherwise ignored.
    async fn post_without_reply(&self, body: Vec<u8>) -> Result<(), McpError> {
        let response = self.inner.post(body).await?;
        if response.status() == StatusCode::ACCEPTED || !self.inner.is_event_stream(&response) {
            return Ok(());
        }
        self.inner.read_event_stream(response, None).await?;
        Ok(())
    }
}

impl HttpInner {
    fn session_id(&self) -> Option<String> {
        self.session_id
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn apply_headers(&self, mut builder: RequestBuilder, accept: &str) -> RequestBuilder {
        builder = builder.header("accept", accept);
        for (name, value) in &self.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = &self.authorization {
            builder = builder.header("authorization", auth.as_str());
        }
        if let Some(session) = self.session_id() {
            builder = builder.header(SESSION_ID_HEADER, session);
        }
        let version = self
            .protocol_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(version) = version {
            builder = builder.header(PROTOCOL_VERSION_HEADER, version);
        }
        builder
    }

    /// POST a serialized frame and check the status.
    async fn post(&self, body: Vec<u8>) -> Result<Response, McpError> {
        let builder = self
            .apply_headers(self.client.post(&self.url), ACCEPT_POST)
            .header("content-type", "application/json")
            .body(body);

        let response = builder
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("POST {} failed: {}", self.url, e)))?;

        self.capture_session_id(&response);
        check_status(response).await
    }

    fn capture_session_id(&self, response: &Response) {
        let Some(value) = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
        else {
            return;
        };
        let mut slot = self.session_id.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_deref() != Some(value) {
            debug!(server = %self.server_name, session = %value, "MCP session id assigned");
            *slot = Some(value.to_string());
        }
    }

    fn is_event_stream(&self, response: &Response) -> bool {
        response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_event_stream_content_type)
    }

    /// Route one decoded payload. Returns the response when it answers
    /// `expected`; everything else is queued or dropped.
    fn route(&self, payload: &str, expected: Option<&RequestId>) -> Option<JsonRpcResponse> {
        match JsonRpcMessage::parse(payload) {
            Ok(JsonRpcMessage::Response(response)) => {
                if expected == Some(&response.id) {
                    return Some(response);
                }
                debug!(server = %self.server_name, id = %response.id, "Dropping unexpected response");
            }
            Ok(JsonRpcMessage::Notification(notification)) => {
                trace!(server = %self.server_name, method = %notification.method, "<- notification");
                self.inbound.push(InboundMessage::Notification(notification));
            }
            Ok(JsonRpcMessage::Request(request)) => {
                trace!(server = %self.server_name, method = %request.method, "<- server request");
                self.inbound.push(InboundMessage::Request(request));
            }
            Err(e) => {
                debug!(server = %self.server_name, error = %e, "Dropping unrecognized event");
            }
        }
        None
    }

    /// Consume an SSE body. Stops early once the reply to `expected` arrives.
    async fn read_event_stream(
        &self,
        response: Response,
        expected: Option<&RequestId>,
    ) -> Result<Option<JsonRpcResponse>, McpError> {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| McpError::Transport(format!("SSE stream error: {}", e)))?;
            for payload in decoder.push(&chunk) {
                if let Some(reply) = self.route(&payload, expected) {
                    return Ok(Some(reply));
                }
            }
        }

        for payload in decoder.finish() {
            if let Some(reply) = self.route(&payload, expected) {
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }

    /// Hold one GET listener stream open until it ends.
    async fn listen_once(&self, monitor: &dyn ListenMonitor) -> Result<(), McpError> {
        let response = self
            .apply_headers(self.client.get(&self.url), ACCEPT_LISTEN)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("GET {} failed: {}", self.url, e)))?;
        let response = check_status(response).await?;

        if !self.is_event_stream(&response) {
            return Err(McpError::InvalidResponse(
                "listener response is not an event stream".to_string(),
            ));
        }

        debug!(server = %self.server_name, "Notification listener connected");
        monitor.on_connected();
        self.read_event_stream(response, None).await?;
        Ok(())
    }

    async fn listen(self: Arc<Self>, monitor: Arc<dyn ListenMonitor>) {
        loop {
            if !self.is_connected() {
                break;
            }

            let result = tokio::select! {
                result = self.listen_once(monitor.as_ref()) => result,
                _ = closed_signal(self.closed.subscribe()) => break,
            };

            let error = match result {
                Ok(()) => McpError::Transport("listener stream ended".to_string()),
                Err(McpError::HttpStatus { status: 405, .. }) => {
                    debug!(server = %self.server_name, "Server does not offer a notification stream");
                    break;
                }
                Err(e) => e,
            };

            if !self.is_connected() {
                break;
            }
            warn!(server = %self.server_name, error = %error, "Notification listener disconnected");
            if !monitor.on_failure(&error).await {
                break;
            }
        }
        debug!(server = %self.server_name, "Notification listener stopped");
    }
}

/// Resolves once the transport is marked closed.
async fn closed_signal(mut rx: watch::Receiver<bool>) {
    loop {
        let closed = *rx.borrow_and_update();
        if closed {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn check_status(response: Response) -> Result<Response, McpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(McpError::HttpStatus {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        self.ensure_open()?;
        let body = serde_json::to_vec(&request)?;
        let inner = &self.inner;
        trace!(server = %inner.server_name, id = %request.id, method = %request.method, "-> request");

        self.until_closed(async {
            let response = inner.post(body).await?;

            if inner.is_event_stream(&response) {
                return inner
                    .read_event_stream(response, Some(&request.id))
                    .await?
                    .ok_or_else(|| {
                        McpError::InvalidResponse(format!(
                            "event stream ended without a reply to request {}",
                            request.id
                        ))
                    });
            }

            let text = response
                .text()
                .await
                .map_err(|e| McpError::Transport(format!("failed to read response body: {}", e)))?;
            if text.trim().is_empty() {
                return Err(McpError::InvalidResponse(format!(
                    "empty body in reply to request {}",
                    request.id
                )));
            }

            match JsonRpcMessage::parse(&text)? {
                JsonRpcMessage::Response(reply) if reply.id == request.id => Ok(reply),
                JsonRpcMessage::Response(reply) => Err(McpError::InvalidResponse(format!(
                    "reply id {} does not match request {}",
                    reply.id, request.id
                ))),
                _ => Err(McpError::InvalidResponse(
                    "expected a JSON-RPC response".to_string(),
                )),
            }
        })
        .await
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        self.ensure_open()?;
        trace!(server = %self.inner.server_name, method = %notification.method, "-> notification");
        let body = serde_json::to_vec(&notification)?;
        self.until_closed(self.post_without_reply(body)).await
    }

    async fn respond(&self, response: JsonRpcResponse) -> Result<(), McpError> {
        self.ensure_open()?;
        let body = serde_json::to_vec(&response)?;
        self.until_closed(self.post_without_reply(body)).await
    }

    async fn receive(&self) -> Option<InboundMessage> {
        self.inner.inbound.recv().await
    }

    async fn close(&self) -> Result<(), McpError> {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.closed.send_replace(true);

        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }

        if let Some(session) = self.inner.session_id() {
            let request = self
                .inner
                .client
                .delete(&self.inner.url)
                .header(SESSION_ID_HEADER, session)
                .timeout(CLOSE_TIMEOUT);
            let request = match &self.inner.authorization {
                Some(auth) => request.header("authorization", auth.as_str()),
                None => request,
            };
            if let Err(e) = request.send().await {
                debug!(server = %self.inner.server_name, error = %e, "Session teardown request failed");
            }
        }

        self.inner.inbound.close();
        debug!(server = %self.inner.server_name, "Closed HTTP transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn kind(&self) -> TransportType {
        TransportType::Http
    }

    fn start_listening(&self, monitor: Arc<dyn ListenMonitor>) -> bool {
        if !self.is_connected() {
            return false;
        }
        let mut slot = self.listener.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return true;
        }
        *slot = Some(tokio::spawn(self.inner.clone().listen(monitor)));
        true
    }

    fn set_protocol_version(&self, version: &str) {
        *self
            .inner
            .protocol_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(version.to_string());
    }
}

impl Drop for HttpTransport {
    fn drop(&mut self) {
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> HttpTransport {
        HttpTransport::new(&ServerDescriptor::http("remote", "http://127.0.0.1:1/mcp"), None).unwrap()
    }

    #[test]
    fn test_requires_url() {
        let mut desc = ServerDescriptor::http("remote", "");
        assert!(matches!(HttpTransport::new(&desc, None), Err(McpError::Config(_))));
        desc.url = None;
        assert!(HttpTransport::new(&desc, None).is_err());
    }

    #[test]
    fn test_route_matches_expected_id() {
        let t = transport();
        let expected = RequestId::Number(7);

        let reply = t
            .inner
            .route(r#"{"jsonrpc":"2.0","id":7,"result":{}}"#, Some(&expected));
        assert!(reply.is_some());

        let other = t
            .inner
            .route(r#"{"jsonrpc":"2.0","id":8,"result":{}}"#, Some(&expected));
        assert!(other.is_none());

        let note = t.inner.route(
            r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#,
            Some(&expected),
        );
        assert!(note.is_none());
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_fails_sends() {
        let t = transport();
        t.close().await.unwrap();
        t.close().await.unwrap();
        assert!(!t.is_connected());

        let err = t
            .send(JsonRpcRequest::new(RequestId::Number(1), "ping", None))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::TransportClosed));
        assert!(!t.start_listening(Arc::new(NoRetry)));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let t = transport();
        let err = t
            .send(JsonRpcRequest::new(RequestId::Number(1), "ping", None))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }

    struct NoRetry;

    #[async_trait]
    impl ListenMonitor for NoRetry {
        fn on_connected(&self) {}
        async fn on_failure(&self, _error: &McpError) -> bool {
            false
        }
    }
}
