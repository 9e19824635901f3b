// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! HTTP transport against a minimal in-process HTTP/1.1 server.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use mcp_host::mcp::jsonrpc::InboundMessage;
use mcp_host::mcp::{
    ClientCapabilities, HttpTransport, Implementation, JsonRpcRequest, McpClient, McpError,
    ServerDescriptor, Transport, PROTOCOL_VERSION,
};

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    headers: HashMap<String, String>,
    body: Value,
}

impl Recorded {
    fn rpc_method(&self) -> &str {
        self.body["method"].as_str().unwrap_or("")
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

struct Reply {
    status: u16,
    content_type: &'static str,
    headers: Vec<(&'static str, String)>,
    body: String,
}

impl Reply {
    fn json(body: Value) -> Self {
        Self {
            status: 200,
            content_type: "application/json",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn sse(events: &[Value]) -> Self {
        let body = events
            .iter()
            .map(|e| format!("event: message\ndata: {}\n\n", e))
            .collect();
        Self {
            status: 200,
            content_type: "text/event-stream",
            headers: Vec::new(),
            body,
        }
    }

    fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    fn with_header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

type Responder = Arc<dyn Fn(&Recorded) -> Reply + Send + Sync>;

struct TestServer {
    url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl TestServer {
    async fn start(responder: impl Fn(&Recorded) -> Reply + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/mcp", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let responder: Responder = Arc::new(responder);

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                let log = log.clone();
                let responder = responder.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, log, responder).await;
                });
            }
        });

        Self { url, requests }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// Serve exactly one request, then close the connection.
async fn handle_connection(
    mut stream: TcpStream,
    log: Arc<Mutex<Vec<Recorded>>>,
    responder: Responder,
) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let head_end = loop {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let method = lines
        .next()
        .and_then(|l| l.split_whitespace().next())
        .unwrap_or("")
        .to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    while buf.len() < head_end + length {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = serde_json::from_slice(&buf[head_end..]).unwrap_or(Value::Null);

    let recorded = Recorded {
        method,
        headers,
        body,
    };
    let reply = responder(&recorded);
    log.lock().unwrap().push(recorded);

    let mut response = format!(
        "HTTP/1.1 {} X\r\ncontent-type: {}\r\ncontent-length: {}\r\nconnection: close\r\n",
        reply.status,
        reply.content_type,
        reply.body.len()
    );
    for (name, value) in &reply.headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(&reply.body);
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

/// Server that speaks enough MCP for a client to initialize and call tools.
fn mcp_responder(record: &Recorded) -> Reply {
    if record.method == "DELETE" {
        return Reply::status(200, "");
    }
    if record.method == "GET" {
        return Reply::status(405, "no stream");
    }
    let id = record.body["id"].clone();
    match record.rpc_method() {
        "initialize" => Reply::json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "http-test", "version": "1"}
            }
        }))
        .with_header("mcp-session-id", "sess-42"),
        "notifications/initialized" => Reply::status(202, ""),
        "tools/list" => Reply::json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": [{"name": "search", "inputSchema": {"type": "object"}}]}
        })),
        "tools/call" => Reply::sse(&[
            json!({"jsonrpc": "2.0", "method": "notifications/progress", "params": {"progress": 1}}),
            json!({"jsonrpc": "2.0", "id": id, "result": {"content": [{"type": "text", "text": "found it"}]}}),
        ]),
        _ => Reply::json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": "Method not found"}
        })),
    }
}

#[tokio::test]
async fn session_id_and_headers_follow_the_handshake() {
    let server = TestServer::start(mcp_responder).await;
    let desc = ServerDescriptor::http("web", &server.url).with_header("X-Team", "blue");
    let transport = Arc::new(HttpTransport::new(&desc, Some("Bearer tok".to_string())).unwrap());
    let client = McpClient::new("web", transport.clone());

    client
        .initialize(Implementation::default(), ClientCapabilities::default())
        .await
        .unwrap();
    assert_eq!(transport.session_id().as_deref(), Some("sess-42"));

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools[0].name, "search");

    let result = client.call_tool("search", json!({"q": "rust"})).await.unwrap();
    assert_eq!(result.as_text(), "found it");

    client.close().await.unwrap();

    let requests = server.requests();
    let init = &requests[0];
    assert_eq!(init.rpc_method(), "initialize");
    assert_eq!(init.header("mcp-session-id"), None);
    assert_eq!(init.header("authorization"), Some("Bearer tok"));
    assert_eq!(init.header("x-team"), Some("blue"));
    assert!(init.header("accept").unwrap().contains("text/event-stream"));

    let list = requests.iter().find(|r| r.rpc_method() == "tools/list").unwrap();
    assert_eq!(list.header("mcp-session-id"), Some("sess-42"));
    assert_eq!(list.header("mcp-protocol-version"), Some(PROTOCOL_VERSION));

    let delete = requests.iter().find(|r| r.method == "DELETE").unwrap();
    assert_eq!(delete.header("mcp-session-id"), Some("sess-42"));
}

#[tokio::test]
async fn sse_reply_queues_interleaved_notifications() {
    let server = TestServer::start(mcp_responder).await;
    let desc = ServerDescriptor::http("web", &server.url);
    let transport = HttpTransport::new(&desc, None).unwrap();

    let reply = transport
        .send(JsonRpcRequest::new(7, "tools/call", Some(json!({"name": "search"}))))
        .await
        .unwrap();
    assert_eq!(reply.result.unwrap()["content"][0]["text"], "found it");

    let pushed = tokio::time::timeout(Duration::from_secs(1), transport.receive())
        .await
        .unwrap();
    match pushed {
        Some(InboundMessage::Notification(n)) => assert_eq!(n.method, "notifications/progress"),
        other => panic!("unexpected {:?}", other),
    }
    transport.close().await.unwrap();
}

#[tokio::test]
async fn error_status_is_reported() {
    let server = TestServer::start(|_| Reply::status(500, "boom")).await;
    let desc = ServerDescriptor::http("web", &server.url);
    let transport = HttpTransport::new(&desc, None).unwrap();

    let err = transport
        .send(JsonRpcRequest::new(1, "ping", None))
        .await
        .unwrap_err();
    match err {
        McpError::HttpStatus { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn closed_transport_rejects_sends_without_teardown_request() {
    let server = TestServer::start(mcp_responder).await;
    let desc = ServerDescriptor::http("web", &server.url);
    let transport = HttpTransport::new(&desc, None).unwrap();

    transport.close().await.unwrap();
    assert!(!transport.is_connected());
    let err = transport
        .send(JsonRpcRequest::new(1, "ping", None))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::TransportClosed));
    // No session id was ever assigned, so no DELETE goes out.
    assert!(server.requests().is_empty());
}
