// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Stdio transport against a tiny shell-script MCP server.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use mcp_host::mcp::{
    ClientCapabilities, Implementation, McpClient, McpError, ServerDescriptor, StdioTransport,
    Transport,
};

/// Answers initialize, tools/list and tools/call; logs a notification
/// before each call result. Anything else gets -32601.
const SERVER_SCRIPT: &str = r#"
while IFS= read -r line; do
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\).*/\1/p')
  method=$(printf '%s\n' "$line" | sed -n 's/.*"method":"\([^"]*\)".*/\1/p')
  [ -z "$id" ] && continue
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"protocolVersion":"2025-03-26","capabilities":{"tools":{}},"serverInfo":{"name":"sh","version":"1"}}}\n' "$id" ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":%s,"result":{"tools":[{"name":"echo","inputSchema":{"type":"object"}}]}}\n' "$id" ;;
    tools/call)
      printf '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info","data":"calling"}}\n'
      printf '{"jsonrpc":"2.0","id":%s,"result":{"content":[{"type":"text","text":"pong"}]}}\n' "$id" ;;
    *)
      printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32601,"message":"Method not found"}}\n' "$id" ;;
  esac
done
"#;

fn descriptor() -> ServerDescriptor {
    ServerDescriptor::stdio("sh", "/bin/sh").with_args(["-c", SERVER_SCRIPT])
}

/// Same server, but it writes a line of invalid UTF-8 before anything else.
fn noisy_descriptor() -> ServerDescriptor {
    let script = format!("printf 'garbage \\377\\376 line\\n'\n{}", SERVER_SCRIPT);
    ServerDescriptor::stdio("noisy", "/bin/sh").with_args(["-c".to_string(), script])
}

#[tokio::test]
async fn handshake_list_and_call() {
    let transport = Arc::new(StdioTransport::spawn(&descriptor()).unwrap());
    let client = McpClient::new("sh", transport.clone());

    let init = tokio::time::timeout(
        Duration::from_secs(5),
        client.initialize(Implementation::default(), ClientCapabilities::default()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(init.server_info.name, "sh");

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");

    let result = client.call_tool("echo", json!({"text": "ping"})).await.unwrap();
    assert_eq!(result.as_text(), "pong");

    let err = client.list_prompts().await.unwrap_err();
    assert!(matches!(err, McpError::Protocol { code: -32601, .. }));

    client.close().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn concurrent_requests_are_matched_by_id() {
    let transport = Arc::new(StdioTransport::spawn(&descriptor()).unwrap());
    let client = Arc::new(McpClient::new("sh", transport));
    client
        .initialize(Implementation::default(), ClientCapabilities::default())
        .await
        .unwrap();

    let calls = (0..5).map(|i| {
        let client = client.clone();
        tokio::spawn(async move { client.call_tool("echo", json!({"n": i})).await })
    });
    for handle in calls {
        let result = handle.await.unwrap().unwrap();
        assert_eq!(result.as_text(), "pong");
    }
    client.close().await.unwrap();
}

#[tokio::test]
async fn exited_server_fails_pending_requests() {
    let desc = ServerDescriptor::stdio("gone", "/bin/sh").with_args(["-c", "read line; exit 0"]);
    let transport = Arc::new(StdioTransport::spawn(&desc).unwrap());
    let client = McpClient::new("gone", transport);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        client.initialize(Implementation::default(), ClientCapabilities::default()),
    )
    .await
    .unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn invalid_utf8_output_is_skipped() {
    let transport = Arc::new(StdioTransport::spawn(&noisy_descriptor()).unwrap());
    let client = McpClient::new("noisy", transport.clone());

    let init = tokio::time::timeout(
        Duration::from_secs(5),
        client.initialize(Implementation::default(), ClientCapabilities::default()),
    )
    .await
    .unwrap();
    assert!(init.is_ok());
    assert!(transport.is_connected());

    let result = client.call_tool("echo", json!({})).await.unwrap();
    assert_eq!(result.as_text(), "pong");
    client.close().await.unwrap();
}
