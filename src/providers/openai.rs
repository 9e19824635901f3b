// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenAI-compatible chat completions provider.
//!
//! Works with OpenAI and any server exposing `/chat/completions` and
//! `/models` in the same shape (Ollama, vLLM, LiteLLM, Together, Groq, ...).
//!
//! Tool names like `weather:get_forecast` are not valid OpenAI function
//! names, so `:` is sent as `__` and mapped back on the way in.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[cfg(feature = "telemetry")]
use crate::telemetry::GLOBAL_METRICS;

use crate::error::ProviderError;
use crate::mcp::transport::sse::SseDecoder;
use crate::types::{
    Message, ModelInfo, Provider, ProviderConfig, ProviderResponse, Role, StopReason,
    StreamCallback, StreamEvent, TokenUsage, ToolCall, ToolDefinition,
};

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "gpt-4o";

const DEFAULT_MAX_TOKENS: u32 = 4096;

const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Separator used on the wire in place of `:`.
const WIRE_SEPARATOR: &str = "__";

/// OpenAI-compatible provider.
pub struct OpenAIProvider {
    client: Client,
    api_key: Option<String>,
    model: String,
    base_url: String,
    max_tokens: u32,
    temperature: Option<f32>,
    timeout: Duration,
    provider_name: String,
}

impl OpenAIProvider {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        config: &ProviderConfig,
    ) -> Result<Self, ProviderError> {
        let timeout = config
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let provider_name = Self::detect_provider_name(&base_url);

        Ok(Self {
            client,
            api_key: api_key.filter(|k| !k.is_empty()),
            model: model.into(),
            base_url,
            max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: config.temperature,
            timeout,
            provider_name,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn detect_provider_name(base_url: &str) -> String {
        if base_url.contains("openai.com") {
            "OpenAI".to_string()
        } else if base_url.contains("localhost:11434") || base_url.contains("ollama") {
            "Ollama".to_string()
        } else if base_url.contains("together") {
            "Together".to_string()
        } else if base_url.contains("groq") {
            "Groq".to_string()
        } else {
            "OpenAI-Compatible".to_string()
        }
    }

    fn build_request(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: Option<&str>,
        stream: bool,
    ) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: model.unwrap_or(&self.model).to_string(),
            messages: messages.iter().map(ChatMessage::from).collect(),
            tools: tools
                .filter(|t| !t.is_empty())
                .map(|t| t.iter().map(ChatTool::from).collect()),
            max_tokens: Some(self.max_tokens),
            temperature: self.temperature,
            stream: stream.then_some(true),
            stream_options: stream.then_some(StreamOptions { include_usage: true }),
        }
    }

    fn post(&self, body: &ChatCompletionRequest) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("content-type", "application/json")
            .json(body);
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key);
        }
        req
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout.as_millis() as u64)
        } else {
            ProviderError::NetworkError(err.to_string())
        }
    }

    async fn send(&self, body: &ChatCompletionRequest) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .post(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(handle_error_response(status.as_u16(), &error_text));
        }
        Ok(response)
    }

    fn operation_name(&self, op: &str) -> String {
        format!("{}.{}", self.provider_name.to_lowercase().replace(' ', "_"), op)
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: Option<&str>,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.build_request(messages, tools, model, false);
        let start = Instant::now();
        debug!(model = %request.model, messages = messages.len(), "Sending chat request");

        let result = async {
            let response = self.send(&request).await?;
            let api_response: ChatCompletionResponse = response
                .json()
                .await
                .map_err(|e| ProviderError::ParseError(e.to_string()))?;
            Ok::<_, ProviderError>(api_response.into_provider_response(tools))
        }
        .await;

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(&self.operation_name("chat"), start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        result
    }

    async fn stream_chat(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDefinition]>,
        model: Option<&str>,
        on_event: StreamCallback,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = self.build_request(messages, tools, model, true);
        let start = Instant::now();
        debug!(model = %request.model, messages = messages.len(), "Sending streaming chat request");

        let response = self.send(&request).await?;

        let mut state = StreamState::default();
        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();
        let mut done = false;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| ProviderError::StreamError(e.to_string()))?;
            for payload in decoder.push(&chunk) {
                if state.consume(&payload, tools, &on_event)? {
                    done = true;
                }
            }
            if done {
                break;
            }
        }
        if !done {
            for payload in decoder.finish() {
                state.consume(&payload, tools, &on_event)?;
            }
        }

        let response = state.into_response(tools);
        if let Some(usage) = &response.usage {
            on_event(StreamEvent::Usage(usage.clone()));
        }
        on_event(StreamEvent::Done(response.stop_reason));

        #[cfg(feature = "telemetry")]
        GLOBAL_METRICS.record_operation(&self.operation_name("stream_chat"), start.elapsed());
        #[cfg(not(feature = "telemetry"))]
        let _ = start;

        Ok(response)
    }

    fn name(&self) -> &str {
        &self.provider_name
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
        let mut req = self.client.get(format!("{}/models", self.base_url));
        if let Some(api_key) = &self.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(handle_error_response(status.as_u16(), &error_text));
        }

        let models: ModelsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ParseError(e.to_string()))?;

        let mut models: Vec<ModelInfo> = models
            .data
            .into_iter()
            .map(|m| ModelInfo {
                id: m.id,
                provider: self.provider_name.clone(),
                owned_by: m.owned_by,
            })
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }
}

/// Map an error body to a provider error.
fn handle_error_response(status_code: u16, body: &str) -> ProviderError {
    let Ok(error) = serde_json::from_str::<ApiError>(body) else {
        return match status_code {
            401 | 403 => ProviderError::AuthError(body.to_string()),
            429 => ProviderError::RateLimited(body.to_string()),
            _ => ProviderError::api(body.to_string(), status_code),
        };
    };

    let message = error.error.message;
    match (status_code, error.error.error_type.as_deref(), error.error.code.as_deref()) {
        (401, _, _) | (_, Some("authentication_error"), _) | (_, _, Some("invalid_api_key")) => {
            ProviderError::AuthError(message)
        }
        (429, _, _) | (_, Some("rate_limit_error"), _) => ProviderError::RateLimited(message),
        (_, _, Some("model_not_found")) => ProviderError::ModelNotFound(message),
        _ => ProviderError::api(message, status_code),
    }
}

fn to_wire_name(name: &str) -> String {
    name.replace(crate::mcp::types::TOOL_NAME_SEPARATOR, WIRE_SEPARATOR)
}

/// Restore a `server:tool` name from its wire form. Names not offered in
/// `tools` come back as sent.
fn from_wire_name(wire: &str, tools: Option<&[ToolDefinition]>) -> String {
    tools
        .into_iter()
        .flatten()
        .find(|t| to_wire_name(&t.name) == wire)
        .map(|t| t.name.clone())
        .unwrap_or_else(|| wire.to_string())
}

fn stop_reason(finish_reason: Option<&str>) -> StopReason {
    match finish_reason {
        Some("tool_calls") | Some("function_call") => StopReason::ToolUse,
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

// ============================================================================
// Stream State
// ============================================================================

#[derive(Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// State accumulated while streaming one completion.
#[derive(Default)]
struct StreamState {
    text: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    finish_reason: Option<String>,
    usage: Option<TokenUsage>,
}

impl StreamState {
    /// Apply one SSE payload. Returns true on the `[DONE]` sentinel.
    fn consume(
        &mut self,
        payload: &str,
        tools: Option<&[ToolDefinition]>,
        on_event: &StreamCallback,
    ) -> Result<bool, ProviderError> {
        if payload.trim() == "[DONE]" {
            return Ok(true);
        }

        let chunk: ChatStreamChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                debug!(error = %e, "Skipping unparseable stream chunk");
                return Ok(false);
            }
        };

        if let Some(usage) = chunk.usage {
            self.usage = Some(usage.into());
        }

        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }
            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                self.text.push_str(&content);
                on_event(StreamEvent::TextDelta(content));
            }
            for tc in choice.delta.tool_calls.unwrap_or_default() {
                let index = tc.index.unwrap_or(self.tool_calls.len());
                let entry = self.tool_calls.entry(index).or_default();
                if let Some(id) = tc.id {
                    entry.id = id;
                }
                if let Some(function) = tc.function {
                    if let Some(name) = function.name {
                        entry.name.push_str(&name);
                        on_event(StreamEvent::ToolUseStart {
                            id: entry.id.clone(),
                            name: from_wire_name(&entry.name, tools),
                        });
                    }
                    if let Some(args) = function.arguments {
                        entry.arguments.push_str(&args);
                        on_event(StreamEvent::ToolInputDelta(args));
                    }
                }
            }
        }
        Ok(false)
    }

    fn into_response(self, tools: Option<&[ToolDefinition]>) -> ProviderResponse {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_values()
            .filter(|tc| !tc.name.is_empty())
            .map(|tc| ToolCall::new(tc.id, from_wire_name(&tc.name, tools), tc.arguments))
            .collect();

        let stop_reason = if tool_calls.is_empty() {
            stop_reason(self.finish_reason.as_deref())
        } else {
            StopReason::ToolUse
        };

        ProviderResponse {
            content: self.text,
            tool_calls,
            stop_reason,
            usage: self.usage,
        }
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    call_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function: Option<ChatFunction>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: ChatToolFunction,
}

#[derive(Debug, Serialize)]
struct ChatToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<ChatUsage> for TokenUsage {
    fn from(usage: ChatUsage) -> Self {
        TokenUsage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatStreamChunk {
    #[serde(default)]
    choices: Vec<ChatStreamChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatStreamChoice {
    #[serde(default)]
    delta: ChatStreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatStreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelData>,
}

#[derive(Debug, Deserialize)]
struct ModelData {
    id: String,
    #[serde(default)]
    owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

// ============================================================================
// Type Conversions
// ============================================================================

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        let role = match msg.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        };

        let tool_calls = (!msg.tool_calls.is_empty()).then(|| {
            msg.tool_calls
                .iter()
                .map(|tc| ChatToolCall {
                    index: None,
                    id: Some(tc.id.clone()),
                    call_type: Some("function".to_string()),
                    function: Some(ChatFunction {
                        name: Some(to_wire_name(&tc.name)),
                        arguments: Some(if tc.arguments.is_empty() {
                            "{}".to_string()
                        } else {
                            tc.arguments.clone()
                        }),
                    }),
                })
                .collect()
        });

        // Assistant messages that only carry tool calls send null content.
        let content = if msg.content.is_empty() && tool_calls.is_some() {
            None
        } else {
            Some(msg.content.clone())
        };

        Self {
            role: role.to_string(),
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

impl From<&ToolDefinition> for ChatTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: ChatToolFunction {
                name: to_wire_name(&tool.name),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

impl ChatCompletionResponse {
    fn into_provider_response(self, tools: Option<&[ToolDefinition]>) -> ProviderResponse {
        let usage = self.usage.map(TokenUsage::from);
        let Some(choice) = self.choices.into_iter().next() else {
            return ProviderResponse {
                usage,
                ..ProviderResponse::text("")
            };
        };

        let tool_calls: Vec<ToolCall> = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| {
                let function = tc.function?;
                let name = function.name?;
                Some(ToolCall::new(
                    tc.id.unwrap_or_default(),
                    from_wire_name(&name, tools),
                    function.arguments.unwrap_or_default(),
                ))
            })
            .collect();

        let stop_reason = if tool_calls.is_empty() {
            stop_reason(choice.finish_reason.as_deref())
        } else {
            StopReason::ToolUse
        };

        ProviderResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            stop_reason,
            usage,
        }
    }
}
