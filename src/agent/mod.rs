// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent module - the LLM/tool orchestration loop.
//!
//! One turn: assemble messages, discover the user's tools across every
//! enabled server, then loop: call the model, run any requested tool calls
//! against their servers, feed the results back, until the model answers
//! or the iteration cap is hit.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mcp_host::agent::{Agent, AgentConfig, ChatRequest};
//!
//! let agent = Agent::new(provider, sessions, AgentConfig::default());
//! let response = agent
//!     .chat(ChatRequest::new("conv-1", "user-1", "What's the weather in Oslo?"))
//!     .await?;
//! println!("{} ({} tool calls)", response.content(), response.tool_executions.len());
//! ```

mod catalog;
pub mod coerce;
mod types;

pub use catalog::ToolCatalog;
pub use coerce::coerce_arguments;
pub use types::{
    AgentConfig, AgentEvent, ChatRequest, ChatResponse, ToolExecution, TurnError, TurnOutcome,
    MAX_ITERATIONS_MESSAGE,
};

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::AgentError;
use crate::mcp::types::split_qualified_name;
use crate::session::SessionManager;
use crate::telemetry::{CorrelationId, ToolSpan};
use crate::types::{Message, SharedProvider, StreamEvent, TokenUsage, ToolCall};

#[cfg(feature = "telemetry")]
use crate::telemetry::GLOBAL_METRICS;

/// Drives chat turns. Cheap to clone; clones share the provider and the
/// session manager.
#[derive(Clone)]
pub struct Agent {
    provider: SharedProvider,
    sessions: Arc<SessionManager>,
    config: Arc<AgentConfig>,
}

/// Per-turn context shared by the tool calls of one iteration.
struct Turn<'a> {
    request: &'a ChatRequest,
    catalog: &'a ToolCatalog,
    events: Option<&'a mpsc::UnboundedSender<AgentEvent>>,
}

impl<'a> Turn<'a> {
    fn emit(&self, event: AgentEvent) {
        if let Some(events) = self.events {
            // A dropped receiver just stops the stream.
            let _ = events.send(event);
        }
    }

    fn emit_start(&self, call: &ToolCall, execution: &ToolExecution) {
        self.emit(AgentEvent::ToolStart {
            call_id: call.id.clone(),
            server: execution.server.clone(),
            tool: execution.tool.clone(),
            arguments: execution.arguments.clone(),
        });
    }
}

impl Agent {
    pub fn new(provider: SharedProvider, sessions: Arc<SessionManager>, config: AgentConfig) -> Self {
        Self {
            provider,
            sessions,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn provider(&self) -> &SharedProvider {
        &self.provider
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Run one turn to completion.
    pub async fn chat(&self, request: ChatRequest) -> Result<ChatResponse, TurnError> {
        self.run_turn(&request, None, None).await
    }

    /// Run one turn; flipping `cancel` to `true` stops it at the next
    /// suspension point with [`AgentError::UserCancelled`].
    pub async fn chat_with_cancel(
        &self,
        request: ChatRequest,
        cancel: watch::Receiver<bool>,
    ) -> Result<ChatResponse, TurnError> {
        self.run_turn(&request, None, Some(cancel)).await
    }

    /// Run one turn on a background task, publishing events as they occur.
    /// The stream ends with exactly one `Done` or `Error`.
    pub fn chat_stream(&self, request: ChatRequest) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let agent = self.clone();
        tokio::spawn(async move {
            let event = match agent.run_turn(&request, Some(&tx), None).await {
                Ok(response) => AgentEvent::Done(Box::new(response)),
                Err(err) => AgentEvent::Error(err.to_string()),
            };
            let _ = tx.send(event);
        });
        rx
    }

    async fn run_turn(
        &self,
        request: &ChatRequest,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
        mut cancel: Option<watch::Receiver<bool>>,
    ) -> Result<ChatResponse, TurnError> {
        let turn_id = CorrelationId::new();
        let span = info_span!(
            "turn",
            turn = %turn_id.short(),
            conversation = %request.conversation_id,
            user = %request.user_id,
        );
        let start = Instant::now();
        let result = self
            .turn_loop(request, events, &mut cancel)
            .instrument(span)
            .await;

        #[cfg(feature = "telemetry")]
        {
            GLOBAL_METRICS.record_operation("agent.chat", start.elapsed());
            if let Ok(response) = &result {
                GLOBAL_METRICS.record_tokens(
                    response.usage.input_tokens as u64,
                    response.usage.output_tokens as u64,
                );
            }
        }

        match &result {
            Ok(response) => info!(
                conversation = %request.conversation_id,
                iterations = response.iterations,
                tool_calls = response.tool_executions.len(),
                outcome = ?response.outcome,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Turn complete"
            ),
            Err(err) => warn!(
                conversation = %request.conversation_id,
                iterations = err.iterations,
                error = %err.error,
                "Turn failed"
            ),
        }
        result
    }

    async fn turn_loop(
        &self,
        request: &ChatRequest,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
        cancel: &mut Option<watch::Receiver<bool>>,
    ) -> Result<ChatResponse, TurnError> {
        let deadline = tokio::time::Instant::now() + self.config.max_turn_duration;
        let mut messages = self.assemble_messages(request);
        let mut executions: Vec<ToolExecution> = Vec::new();
        let mut usage = TokenUsage::default();

        let discovery = self
            .sessions
            .list_tools_for_user(&request.user_id, request.bearer_token.as_deref());
        let tools = match guarded(discovery, cancel, deadline, &self.config).await {
            Ok(tools) => tools,
            Err(err) => {
                return Err(TurnError {
                    error: err,
                    tool_executions: executions,
                    iterations: 0,
                })
            }
        };
        let catalog = ToolCatalog::new(tools);
        let definitions = catalog.definitions();
        debug!(tools = catalog.len(), "Tools discovered for turn");

        let turn = Turn {
            request,
            catalog: &catalog,
            events,
        };
        let model = request.model.as_deref().or(self.config.model.as_deref());

        for iteration in 1..=self.config.max_iterations {
            let tool_defs = (!definitions.is_empty()).then_some(definitions.as_slice());
            let llm = self.call_model(&messages, tool_defs, model, events);
            let response = match guarded(llm, cancel, deadline, &self.config).await {
                Ok(Ok(response)) => response,
                Ok(Err(err)) => {
                    return Err(TurnError {
                        error: AgentError::from_provider(err),
                        tool_executions: executions,
                        iterations: iteration,
                    })
                }
                Err(err) => {
                    return Err(TurnError {
                        error: err,
                        tool_executions: executions,
                        iterations: iteration,
                    })
                }
            };

            if let Some(u) = &response.usage {
                usage.add(u);
            }

            if !response.has_tool_calls() {
                let message = response.to_message();
                return Ok(ChatResponse {
                    message,
                    tool_executions: executions,
                    iterations: iteration,
                    usage,
                    outcome: TurnOutcome::Answered,
                });
            }

            messages.push(response.to_message());
            debug!(
                iteration,
                calls = response.tool_calls.len(),
                "Model requested tool calls"
            );

            let batch = self.execute_calls(&turn, &response.tool_calls);
            let results = match guarded(batch, cancel, deadline, &self.config).await {
                Ok(results) => results,
                Err(err) => {
                    return Err(TurnError {
                        error: err,
                        tool_executions: executions,
                        iterations: iteration,
                    })
                }
            };
            for (message, execution) in results {
                messages.push(message);
                executions.push(execution);
            }
        }

        warn!(
            conversation = %request.conversation_id,
            max_iterations = self.config.max_iterations,
            "Iteration limit reached"
        );
        Ok(ChatResponse {
            message: Message::assistant(MAX_ITERATIONS_MESSAGE),
            tool_executions: executions,
            iterations: self.config.max_iterations,
            usage,
            outcome: TurnOutcome::MaxIterationsReached,
        })
    }

    fn assemble_messages(&self, request: &ChatRequest) -> Vec<Message> {
        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if let Some(prompt) = self.config.system_prompt.as_deref().filter(|p| !p.is_empty()) {
            messages.push(Message::system(prompt));
        }
        messages.extend(request.history.iter().cloned());
        messages.push(Message::user(&request.message));
        messages
    }

    async fn call_model(
        &self,
        messages: &[Message],
        tools: Option<&[crate::types::ToolDefinition]>,
        model: Option<&str>,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<crate::types::ProviderResponse, crate::error::ProviderError> {
        match events {
            None => self.provider.chat(messages, tools, model).await,
            Some(events) => {
                let events = events.clone();
                self.provider
                    .stream_chat(
                        messages,
                        tools,
                        model,
                        Box::new(move |event| {
                            if let StreamEvent::TextDelta(text) = event {
                                let _ = events.send(AgentEvent::ContentDelta(text));
                            }
                        }),
                    )
                    .await
            }
        }
    }

    /// Run one iteration's tool calls. Results come back in call order.
    async fn execute_calls(&self, turn: &Turn<'_>, calls: &[ToolCall]) -> Vec<(Message, ToolExecution)> {
        if self.config.parallel_tool_calls {
            join_all(calls.iter().map(|call| self.execute_call(turn, call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in calls {
                results.push(self.execute_call(turn, call).await);
            }
            results
        }
    }

    async fn execute_call(&self, turn: &Turn<'_>, call: &ToolCall) -> (Message, ToolExecution) {
        let started_at = Utc::now();
        let start = Instant::now();

        let Some((server, tool)) = turn.catalog.resolve(&call.name) else {
            let (server, tool) = split_qualified_name(&call.name).unwrap_or(("", call.name.as_str()));
            warn!(tool = %call.name, "Model called an unknown tool");
            let execution = ToolExecution {
                call_id: call.id.clone(),
                server: server.to_string(),
                tool: tool.to_string(),
                arguments: parse_arguments(&call.arguments).unwrap_or(Value::Null),
                result: String::new(),
                error: Some(AgentError::InvalidToolName(call.name.clone()).to_string()),
                started_at,
                duration_ms: 0,
            };
            turn.emit_start(call, &execution);
            turn.emit(AgentEvent::ToolComplete(execution.clone()));
            return (tool_message(call, &execution), execution);
        };

        let mut execution = ToolExecution {
            call_id: call.id.clone(),
            server: server.to_string(),
            tool: tool.name.clone(),
            arguments: Value::Null,
            result: String::new(),
            error: None,
            started_at,
            duration_ms: 0,
        };

        let arguments = match parse_arguments(&call.arguments) {
            Ok(raw) => coerce_arguments(&tool.input_schema, raw),
            Err(message) => {
                execution.arguments = Value::String(call.arguments.clone());
                execution.error = Some(
                    AgentError::InvalidArguments {
                        tool: call.name.clone(),
                        message,
                    }
                    .to_string(),
                );
                turn.emit_start(call, &execution);
                turn.emit(AgentEvent::ToolComplete(execution.clone()));
                return (tool_message(call, &execution), execution);
            }
        };
        execution.arguments = arguments.clone();

        turn.emit_start(call, &execution);

        let span = ToolSpan::start(&call.name);
        let outcome = tokio::time::timeout(
            self.config.tool_timeout,
            self.invoke(turn.request, server, &tool.name, arguments),
        )
        .instrument(span.span().clone())
        .await;

        match outcome {
            Ok(Ok((text, false))) => execution.result = text,
            Ok(Ok((text, true))) => {
                execution.error = Some(if text.is_empty() {
                    "Tool reported an error".to_string()
                } else {
                    text.clone()
                });
                execution.result = text;
            }
            Ok(Err(err)) => execution.error = Some(err.to_string()),
            Err(_) => {
                execution.error = Some(
                    AgentError::ToolTimeout {
                        tool: call.name.clone(),
                        timeout_secs: self.config.tool_timeout.as_secs(),
                    }
                    .to_string(),
                )
            }
        }

        span.record_output_size(execution.result.len());
        span.finish(!execution.is_error());
        execution.duration_ms = start.elapsed().as_millis() as u64;

        if let Some(error) = &execution.error {
            warn!(tool = %call.name, error = %error, "Tool call failed");
        }
        turn.emit(AgentEvent::ToolComplete(execution.clone()));
        (tool_message(call, &execution), execution)
    }

    /// Ensure a session exists for the server, then call the tool.
    /// Returns the result text and the server's error flag.
    async fn invoke(
        &self,
        request: &ChatRequest,
        server: &str,
        tool: &str,
        arguments: Value,
    ) -> Result<(String, bool), AgentError> {
        let failed = |message: String| AgentError::ToolExecutionFailed {
            tool: crate::mcp::types::qualified_tool_name(server, tool),
            message,
        };

        self.sessions
            .get_or_create_session(
                &request.conversation_id,
                server,
                request.bearer_token.as_deref(),
                &request.user_id,
            )
            .await
            .map_err(|e| failed(e.to_string()))?;

        let result = self
            .sessions
            .call_tool(&request.conversation_id, server, tool, arguments)
            .await
            .map_err(|e| failed(e.to_string()))?;

        Ok((result.as_text(), result.is_error))
    }
}

/// Await `fut` unless the turn is cancelled or runs past its deadline.
async fn guarded<F: Future>(
    fut: F,
    cancel: &mut Option<watch::Receiver<bool>>,
    deadline: tokio::time::Instant,
    config: &AgentConfig,
) -> Result<F::Output, AgentError> {
    tokio::select! {
        output = fut => Ok(output),
        _ = cancelled(cancel.as_mut()) => Err(AgentError::UserCancelled),
        _ = tokio::time::sleep_until(deadline) => {
            Err(AgentError::TurnTimeout(config.max_turn_duration.as_secs()))
        }
    }
}

/// Resolves once the flag reads `true`. Never resolves without a receiver
/// or after the sender is gone.
async fn cancelled(rx: Option<&mut watch::Receiver<bool>>) {
    let Some(rx) = rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Empty argument strings mean "no arguments".
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(serde_json::Map::new()));
    }
    serde_json::from_str(raw).map_err(|e| e.to_string())
}

fn tool_message(call: &ToolCall, execution: &ToolExecution) -> Message {
    let content = match &execution.error {
        Some(error) => format!("Error: {}", error),
        None => execution.result.clone(),
    };
    Message::tool(&call.id, content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agent_config_default() {
        let config = AgentConfig::default();
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.tool_timeout, std::time::Duration::from_secs(60));
        assert!(config.parallel_tool_calls);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("").unwrap(), json!({}));
        assert_eq!(parse_arguments("  ").unwrap(), json!({}));
        assert_eq!(parse_arguments(r#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(parse_arguments("{not json").is_err());
    }

    #[test]
    fn test_tool_message_carries_error() {
        let call = ToolCall::new("call_1", "weather:get_forecast", "{}");
        let execution = ToolExecution {
            call_id: "call_1".into(),
            server: "weather".into(),
            tool: "get_forecast".into(),
            arguments: json!({}),
            result: String::new(),
            error: Some("boom".into()),
            started_at: Utc::now(),
            duration_ms: 3,
        };
        let message = tool_message(&call, &execution);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.content, "Error: boom");
    }

    #[tokio::test]
    async fn test_cancelled_without_receiver_never_fires() {
        let fired = tokio::time::timeout(std::time::Duration::from_millis(20), cancelled(None)).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_cancelled_fires_on_flag() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { cancelled(Some(&mut rx)).await });
        tx.send(true).unwrap();
        waiter.await.unwrap();
    }
}
