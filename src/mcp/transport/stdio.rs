// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Child-process transport.
//!
//! Spawns the configured command and exchanges newline-delimited JSON-RPC
//! over its stdin/stdout. A writer task serializes outgoing lines, a reader
//! task routes replies to waiting callers by request id, and a third task
//! drains stderr into the log.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{InboundQueue, Transport};
use crate::mcp::config::{ServerDescriptor, TransportType};
use crate::mcp::error::McpError;
use crate::mcp::jsonrpc::{
    InboundMessage, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    RequestId,
};

type PendingMap = Arc<Mutex<HashMap<RequestId, oneshot::Sender<JsonRpcResponse>>>>;

/// Outgoing line buffer depth.
const WRITE_QUEUE_DEPTH: usize = 64;

/// Transport over a child process's standard streams.
pub struct StdioTransport {
    server_name: String,
    writer: Mutex<Option<mpsc::Sender<String>>>,
    pending: PendingMap,
    inbound: Arc<InboundQueue>,
    connected: Arc<AtomicBool>,
    child: tokio::sync::Mutex<Option<Child>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl StdioTransport {
    /// Spawn the descriptor's command and start the I/O tasks.
    pub fn spawn(descriptor: &ServerDescriptor) -> Result<Self, McpError> {
        let command = descriptor
            .command
            .as_deref()
            .ok_or_else(|| McpError::Config("Stdio transport requires 'command' field".to_string()))?;

        let mut cmd = Command::new(command);
        cmd.args(&descriptor.args)
            .envs(descriptor.expanded_env())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(cwd) = &descriptor.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|e| {
            McpError::Transport(format!("failed to spawn '{}': {}", command, e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("child stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("child stdout unavailable".to_string()))?;
        let stderr = child.stderr.take();

        let server_name = descriptor.name.clone();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let inbound = Arc::new(InboundQueue::new());
        let connected = Arc::new(AtomicBool::new(true));

        let (write_tx, mut write_rx) = mpsc::channel::<String>(WRITE_QUEUE_DEPTH);

        let mut tasks = Vec::with_capacity(3);

        // Writer task
        let writer_connected = connected.clone();
        let writer_server = server_name.clone();
        tasks.push(tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(line) = write_rx.recv().await {
                let written = async {
                    stdin.write_all(line.as_bytes()).await?;
                    stdin.write_all(b"\n").await?;
                    stdin.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!(server = %writer_server, error = %e, "Failed to write to MCP server stdin");
                    writer_connected.store(false, Ordering::SeqCst);
                    break;
                }
            }
        }));

        tasks.push(tokio::spawn(read_messages(
            server_name.clone(),
            stdout,
            pending.clone(),
            inbound.clone(),
            connected.clone(),
        )));

        if let Some(stderr) = stderr {
            tasks.push(tokio::spawn(drain_stderr(server_name.clone(), stderr)));
        }

        debug!(server = %server_name, command = %command, "Spawned MCP server process");

        Ok(Self {
            server_name,
            writer: Mutex::new(Some(write_tx)),
            pending,
            inbound,
            connected,
            child: tokio::sync::Mutex::new(Some(child)),
            tasks: Mutex::new(tasks),
        })
    }

    async fn write_line(&self, line: String) -> Result<(), McpError> {
        let sender = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(McpError::TransportClosed)?;
        sender.send(line).await.map_err(|_| McpError::TransportClosed)
    }

    /// Register a waiter for `id`. Checked under the pending lock so a
    /// concurrent close either sees the entry and drops it, or this call
    /// sees the closed flag.
    fn register(&self, id: &RequestId) -> Result<oneshot::Receiver<JsonRpcResponse>, McpError> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_connected() {
            return Err(McpError::TransportClosed);
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id.clone(), tx);
        Ok(rx)
    }

    fn fail_pending(&self) {
        // Dropping the senders wakes every waiter with a closed-channel error.
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// Removes a pending entry when the waiting caller goes away, whether it got
/// its reply, was cancelled, or timed out.
struct PendingGuard<'a> {
    pending: &'a PendingMap,
    id: RequestId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, McpError> {
        if !self.is_connected() {
            return Err(McpError::TransportClosed);
        }

        let line = serde_json::to_string(&request)?;
        let rx = self.register(&request.id)?;
        let _guard = PendingGuard {
            pending: &self.pending,
            id: request.id.clone(),
        };

        trace!(server = %self.server_name, id = %request.id, method = %request.method, "-> request");
        self.write_line(line).await?;

        rx.await.map_err(|_| McpError::TransportClosed)
    }

    async fn send_notification(&self, notification: JsonRpcNotification) -> Result<(), McpError> {
        if !self.is_connected() {
            return Err(McpError::TransportClosed);
        }
        trace!(server = %self.server_name, method = %notification.method, "-> notification");
        self.write_line(serde_json::to_string(&notification)?).await
    }

    async fn respond(&self, response: JsonRpcResponse) -> Result<(), McpError> {
        if !self.is_connected() {
            return Err(McpError::TransportClosed);
        }
        self.write_line(serde_json::to_string(&response)?).await
    }

    async fn receive(&self) -> Option<InboundMessage> {
        self.inbound.recv().await
    }

    async fn close(&self) -> Result<(), McpError> {
        self.connected.store(false, Ordering::SeqCst);
        self.writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                debug!(server = %self.server_name, error = %e, "MCP server process already exited");
            }
        }

        self.fail_pending();
        self.inbound.close();

        for task in self.tasks.lock().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }

        debug!(server = %self.server_name, "Closed stdio transport");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn kind(&self) -> TransportType {
        TransportType::Stdio
    }
}

/// Read newline-delimited frames until EOF or an I/O error. Lines that are
/// not UTF-8 are dropped like any other unrecognized line.
async fn read_messages<R: AsyncRead + Unpin>(
    server: String,
    stdout: R,
    pending: PendingMap,
    inbound: Arc<InboundQueue>,
    connected: Arc<AtomicBool>,
) {
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => match std::str::from_utf8(&buf) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        handle_line(&server, line, &pending, &inbound);
                    }
                }
                Err(e) => {
                    debug!(
                        server = %server,
                        error = %e,
                        line = %String::from_utf8_lossy(&buf).trim_end(),
                        "Dropping non-UTF-8 line"
                    );
                }
            },
            Err(e) => {
                warn!(server = %server, error = %e, "Error reading MCP server stdout");
                break;
            }
        }
    }

    debug!(server = %server, "MCP server stdout closed");
    connected.store(false, Ordering::SeqCst);
    pending.lock().unwrap_or_else(PoisonError::into_inner).clear();
    inbound.close();
}

fn handle_line(server: &str, line: &str, pending: &PendingMap, inbound: &InboundQueue) {
    match JsonRpcMessage::parse(line) {
        Ok(JsonRpcMessage::Response(response)) => {
            trace!(server = %server, id = %response.id, "<- response");
            let waiter = pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&response.id);
            match waiter {
                Some(tx) => {
                    let _ = tx.send(response);
                }
                None => debug!(server = %server, id = %response.id, "Dropping response with no waiter"),
            }
        }
        Ok(JsonRpcMessage::Notification(notification)) => {
            trace!(server = %server, method = %notification.method, "<- notification");
            inbound.push(InboundMessage::Notification(notification));
        }
        Ok(JsonRpcMessage::Request(request)) => {
            trace!(server = %server, method = %request.method, "<- server request");
            inbound.push(InboundMessage::Request(request));
        }
        Err(e) => {
            debug!(server = %server, error = %e, line = %line, "Dropping unrecognized line");
        }
    }
}

async fn drain_stderr(server: String, stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.trim().is_empty() {
            debug!(server = %server, "stderr: {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_line_routes_by_shape() {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let inbound = InboundQueue::new();
        let (tx, mut rx) = oneshot::channel();
        pending.lock().unwrap().insert(RequestId::Number(1), tx);

        handle_line("t", r#"{"jsonrpc":"2.0","id":1,"result":{"ok":true}}"#, &pending, &inbound);
        let response = rx.try_recv().unwrap();
        assert_eq!(response.result, Some(serde_json::json!({"ok": true})));
        assert!(pending.lock().unwrap().is_empty());

        handle_line("t", "garbage", &pending, &inbound);
        handle_line("t", r#"{"jsonrpc":"2.0","method":"notifications/tools/list_changed"}"#, &pending, &inbound);
        inbound.close();

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let first = rt.block_on(inbound.recv());
        assert!(matches!(first, Some(InboundMessage::Notification(_))));
        assert!(rt.block_on(inbound.recv()).is_none());
    }

    #[tokio::test]
    async fn test_reader_skips_non_utf8_lines() {
        let (mut server, client) = tokio::io::duplex(1024);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let inbound = Arc::new(InboundQueue::new());
        let connected = Arc::new(AtomicBool::new(true));
        let (tx, rx) = oneshot::channel();
        pending.lock().unwrap().insert(RequestId::Number(1), tx);

        let reader = tokio::spawn(read_messages(
            "t".to_string(),
            client,
            pending.clone(),
            inbound.clone(),
            connected.clone(),
        ));

        server.write_all(b"garbage \xff\xfe line\n").await.unwrap();
        server
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n")
            .await
            .unwrap();

        let response = rx.await.unwrap();
        assert_eq!(response.id, RequestId::Number(1));
        assert!(connected.load(Ordering::SeqCst));

        drop(server);
        reader.await.unwrap();
        assert!(!connected.load(Ordering::SeqCst));
        assert!(inbound.recv().await.is_none());
    }

    fn detached_transport() -> StdioTransport {
        StdioTransport {
            server_name: "t".to_string(),
            writer: Mutex::new(None),
            pending: Arc::new(Mutex::new(HashMap::new())),
            inbound: Arc::new(InboundQueue::new()),
            connected: Arc::new(AtomicBool::new(true)),
            child: tokio::sync::Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_register_after_close_is_rejected() {
        let transport = detached_transport();
        let waiter = transport.register(&RequestId::Number(1)).unwrap();

        transport.close().await.unwrap();
        assert!(waiter.await.is_err());

        let late = transport.register(&RequestId::Number(2));
        assert!(matches!(late, Err(McpError::TransportClosed)));
        assert!(transport.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_fails() {
        let desc = ServerDescriptor::stdio("missing", "/nonexistent/mcp-server-binary");
        let result = StdioTransport::spawn(&desc);
        assert!(matches!(result, Err(McpError::Transport(_))));
    }
}
