// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent types and configuration.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::error::AgentError;
use crate::types::{Message, TokenUsage};

/// Final assistant message when a turn runs out of iterations.
pub const MAX_ITERATIONS_MESSAGE: &str = "I wasn't able to complete this request within the allowed number of steps. Please try rephrasing your question or breaking it into smaller parts.";

/// Configuration for the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Maximum LLM calls per turn.
    pub max_iterations: usize,
    /// Per tool call limit, covering session creation and the call itself.
    pub tool_timeout: Duration,
    /// Wall-clock limit for a whole turn.
    pub max_turn_duration: Duration,
    /// Prepended as a system message when set.
    pub system_prompt: Option<String>,
    /// Run the tool calls of one iteration concurrently.
    pub parallel_tool_calls: bool,
    /// Model override passed to the provider. `None` uses the provider default.
    pub model: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            tool_timeout: Duration::from_secs(60),
            max_turn_duration: Duration::from_secs(600),
            system_prompt: None,
            parallel_tool_calls: true,
            model: None,
        }
    }
}

impl AgentConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// One chat turn as supplied by the request layer.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub conversation_id: String,
    pub user_id: String,
    /// Forwarded to servers that ask for it; never logged.
    pub bearer_token: Option<String>,
    /// Prior messages, oldest first, without the system prompt.
    pub history: Vec<Message>,
    pub message: String,
    /// Per-request model override.
    pub model: Option<String>,
}

impl ChatRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            bearer_token: None,
            history: Vec::new(),
            message: message.into(),
            model: None,
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Record of a single tool invocation.
#[derive(Debug, Clone, Serialize)]
pub struct ToolExecution {
    /// Identifier of the model's tool call.
    pub call_id: String,
    pub server: String,
    pub tool: String,
    pub arguments: serde_json::Value,
    /// Text returned to the model.
    pub result: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ToolExecution {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// `server:tool`, or the raw name when the call never resolved.
    pub fn qualified_name(&self) -> String {
        if self.server.is_empty() {
            self.tool.clone()
        } else {
            crate::mcp::types::qualified_tool_name(&self.server, &self.tool)
        }
    }
}

/// How a successful turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model produced a final answer.
    Answered,
    /// The iteration cap was hit; the message asks the user to rephrase.
    MaxIterationsReached,
}

/// Result of a completed turn.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub message: Message,
    pub tool_executions: Vec<ToolExecution>,
    pub iterations: usize,
    pub usage: TokenUsage,
    pub outcome: TurnOutcome,
}

impl ChatResponse {
    pub fn content(&self) -> &str {
        &self.message.content
    }

    /// The max-iterations marker, if the turn ended on the cap.
    pub fn error(&self) -> Option<AgentError> {
        match self.outcome {
            TurnOutcome::Answered => None,
            TurnOutcome::MaxIterationsReached => {
                Some(AgentError::MaxIterationsReached(self.iterations))
            }
        }
    }
}

/// A turn that failed before producing an answer. Carries whatever tool
/// executions already ran.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct TurnError {
    #[source]
    pub error: AgentError,
    pub tool_executions: Vec<ToolExecution>,
    pub iterations: usize,
}

/// Events published by a streaming turn, in order.
///
/// Every tool call yields a `ToolStart` followed by its `ToolComplete`,
/// including calls rejected before reaching a server (unknown name,
/// malformed arguments).
#[derive(Debug, Clone)]
pub enum AgentEvent {
    ContentDelta(String),
    ToolStart {
        call_id: String,
        server: String,
        tool: String,
        arguments: serde_json::Value,
    },
    ToolComplete(ToolExecution),
    Done(Box<ChatResponse>),
    Error(String),
}

impl AgentEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done(_) | Self::Error(_))
    }
}
