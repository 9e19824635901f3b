// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Message transports for MCP.
//!
//! A [`Transport`] moves JSON-RPC frames between the host and one server.
//! Replies are matched to their request inside the transport; everything
//! else the server sends (notifications and server-initiated requests) is
//! queued for [`Transport::receive`].
//!
//! Concrete transports are picked by [`TransportFactory`] from the
//! descriptor's transport kind.

pub mod http;
pub mod sse;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use super::config::{ServerDescriptor, TransportType};
use super::error::McpError;
use super::jsonrpc::{InboundMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

/// Capability set shared by every transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and wait for the reply with the same id.
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification. No reply is expected.
    async fn send_notification(&self, notification: JsonRpcNotification) -> Result<(), McpError>;

    /// Answer a server-initiated request.
    async fn respond(&self, response: JsonRpcResponse) -> Result<(), McpError>;

    /// Next inbound notification or server request. `None` once closed.
    async fn receive(&self) -> Option<InboundMessage>;

    /// Release the connection. Pending requests fail with
    /// [`McpError::TransportClosed`].
    async fn close(&self) -> Result<(), McpError>;

    /// Whether the transport can still carry messages.
    fn is_connected(&self) -> bool;

    /// Transport kind.
    fn kind(&self) -> TransportType;

    /// Open a long-lived push-notification stream. Returns `false` when the
    /// transport has no such stream.
    fn start_listening(&self, _monitor: Arc<dyn ListenMonitor>) -> bool {
        false
    }

    /// Record the negotiated protocol revision after the handshake.
    fn set_protocol_version(&self, _version: &str) {}
}

/// Observer of a transport's push-notification listener.
///
/// The listener reports each failed connection attempt and asks whether to
/// try again; the session layer owns that policy.
#[async_trait]
pub trait ListenMonitor: Send + Sync {
    /// The listener connected and is receiving events.
    fn on_connected(&self);

    /// The listener failed or its stream ended. Return `true` to reconnect.
    async fn on_failure(&self, error: &McpError) -> bool;
}

/// Queue of inbound messages shared between a transport's reader and the
/// protocol client's dispatcher.
pub struct InboundQueue {
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<InboundMessage>>>,
    rx: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }

    /// A sender for background readers. `None` once the queue is closed.
    pub fn sender(&self) -> Option<mpsc::UnboundedSender<InboundMessage>> {
        self.tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Push a message; dropped silently after close.
    pub fn push(&self, message: InboundMessage) {
        if let Some(tx) = self.sender() {
            let _ = tx.send(message);
        }
    }

    pub async fn recv(&self) -> Option<InboundMessage> {
        self.rx.lock().await.recv().await
    }

    /// Stop accepting messages. `recv` drains what is queued, then yields
    /// `None` once every reader's sender is gone.
    pub fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates transports for server descriptors.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a transport. `authorization` is the complete `Authorization`
    /// header value to attach, already filtered by the descriptor's
    /// forwarding policy.
    async fn create(
        &self,
        descriptor: &ServerDescriptor,
        authorization: Option<String>,
    ) -> Result<Arc<dyn Transport>, McpError>;
}

/// Factory selecting stdio or HTTP from the descriptor.
#[derive(Debug, Default, Clone)]
pub struct DefaultTransportFactory;

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
    async fn create(
        &self,
        descriptor: &ServerDescriptor,
        authorization: Option<String>,
    ) -> Result<Arc<dyn Transport>, McpError> {
        descriptor.validate()?;
        match descriptor.transport {
            TransportType::Stdio => Ok(Arc::new(StdioTransport::spawn(descriptor)?)),
            TransportType::Http => Ok(Arc::new(HttpTransport::new(descriptor, authorization)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::jsonrpc::JsonRpcNotification;

    #[tokio::test]
    async fn test_inbound_queue_drains_then_ends() {
        let queue = InboundQueue::new();
        queue.push(InboundMessage::Notification(JsonRpcNotification::new("a", None)));
        queue.close();
        queue.push(InboundMessage::Notification(JsonRpcNotification::new("dropped", None)));

        match queue.recv().await {
            Some(InboundMessage::Notification(n)) => assert_eq!(n.method, "a"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_default_factory_rejects_invalid_descriptor() {
        let mut desc = ServerDescriptor::http("broken", "x");
        desc.url = None;
        let result = DefaultTransportFactory.create(&desc, None).await;
        assert!(matches!(result, Err(McpError::Config(_))));
    }
}
