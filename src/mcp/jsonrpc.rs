// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JSON-RPC 2.0 envelope types.
//!
//! Inbound frames are classified from a dynamic [`Value`] rather than through
//! an untagged serde enum so that a request (`method` + `id`), a notification
//! (`method` only) and a response (`id` + `result`/`error`) are told apart by
//! the fields actually present.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::McpError;

/// JSON-RPC protocol version marker.
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error code for an unknown method.
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Standard JSON-RPC error code for an internal error.
pub const INTERNAL_ERROR: i64 = -32603;

/// Request identifier (number or string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

/// An outgoing or incoming request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A message without an id; no reply is expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Error object carried by a failed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A reply carrying `result` xor `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcErrorObject>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: RequestId, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(JsonRpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Unwrap the result, turning a JSON-RPC error object into
    /// [`McpError::Protocol`] with the server's code and message.
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(err) = self.error {
            return Err(McpError::Protocol {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

/// Any JSON-RPC frame.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Notification(JsonRpcNotification),
    Response(JsonRpcResponse),
}

impl JsonRpcMessage {
    /// Classify a decoded JSON value. Returns `None` for values that are not
    /// JSON-RPC frames.
    pub fn from_value(value: Value) -> Option<Self> {
        let obj = value.as_object()?;
        let has_id = obj.get("id").is_some_and(|id| !id.is_null());
        let has_method = obj.get("method").is_some_and(Value::is_string);

        if has_method && has_id {
            serde_json::from_value(value).ok().map(Self::Request)
        } else if has_method {
            serde_json::from_value(value).ok().map(Self::Notification)
        } else if has_id && (obj.contains_key("result") || obj.contains_key("error")) {
            serde_json::from_value(value).ok().map(Self::Response)
        } else {
            None
        }
    }

    /// Decode and classify a single frame of text.
    pub fn parse(text: &str) -> Result<Self, McpError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| McpError::InvalidResponse(format!("malformed JSON: {}", e)))?;
        Self::from_value(value)
            .ok_or_else(|| McpError::InvalidResponse("not a JSON-RPC message".to_string()))
    }
}

/// Messages a transport hands to the protocol client outside of a pending
/// request: notifications and server-initiated requests.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Notification(JsonRpcNotification),
    Request(JsonRpcRequest),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(7, "tools/list", None);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json, json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}));
    }

    #[test]
    fn test_classify_frames() {
        let msg = JsonRpcMessage::from_value(json!({"jsonrpc": "2.0", "id": 1, "result": {}}));
        assert!(matches!(msg, Some(JsonRpcMessage::Response(_))));

        let msg = JsonRpcMessage::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/tools/list_changed"}),
        );
        assert!(matches!(msg, Some(JsonRpcMessage::Notification(_))));

        let msg = JsonRpcMessage::from_value(json!({"jsonrpc": "2.0", "id": "a", "method": "roots/list"}));
        assert!(matches!(msg, Some(JsonRpcMessage::Request(_))));

        assert!(JsonRpcMessage::from_value(json!({"hello": "world"})).is_none());
        assert!(JsonRpcMessage::from_value(json!([1, 2])).is_none());
    }

    #[test]
    fn test_string_ids_round_trip() {
        let msg = JsonRpcMessage::parse(r#"{"jsonrpc":"2.0","id":"req-1","result":null}"#).unwrap();
        match msg {
            JsonRpcMessage::Response(resp) => assert_eq!(resp.id, RequestId::String("req-1".into())),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_error_response_becomes_protocol_error() {
        let resp: JsonRpcResponse = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32602, "message": "bad params", "data": {"field": "x"}}
        }))
        .unwrap();

        match resp.into_result() {
            Err(McpError::Protocol { code, message, data }) => {
                assert_eq!(code, -32602);
                assert_eq!(message, "bad params");
                assert_eq!(data, Some(json!({"field": "x"})));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            JsonRpcMessage::parse("not json"),
            Err(McpError::InvalidResponse(_))
        ));
    }
}
