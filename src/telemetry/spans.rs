// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Span helpers for tool calls and timed operations.

use std::time::{Duration, Instant};
use tracing::{info_span, Span};

use crate::mcp::types::split_qualified_name;

/// Extension trait for recording outcomes on a span.
pub trait SpanExt {
    fn record_result<T, E>(&self, result: &Result<T, E>);

    fn record_value(&self, name: &'static str, value: i64);
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>) {
        self.record("success", result.is_ok());
    }

    fn record_value(&self, name: &'static str, value: i64) {
        self.record(name, value);
    }
}

/// Timing guard for one orchestrated tool call.
///
/// The span carries the owning server and the bare tool name; metrics are
/// keyed by the qualified `server:tool` name.
pub struct ToolSpan {
    qualified_name: String,
    start: Instant,
    span: Span,
}

impl ToolSpan {
    pub fn start(qualified_name: &str) -> Self {
        let (server, tool) = split_qualified_name(qualified_name).unwrap_or(("", qualified_name));
        let span = info_span!(
            "tool_call",
            server = %server,
            tool = %tool,
            duration_ms = tracing::field::Empty,
            success = tracing::field::Empty,
            output_size = tracing::field::Empty,
        );

        Self {
            qualified_name: qualified_name.to_string(),
            start: Instant::now(),
            span,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_output_size(&self, size: usize) {
        self.span.record("output_size", size as i64);
    }

    /// Record duration and outcome, returning the elapsed time.
    pub fn finish(self, success: bool) -> Duration {
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_secs_f64() * 1000.0);
        self.span.record("success", success);

        super::metrics::GLOBAL_METRICS.record_tool(&self.qualified_name, duration, success);

        tracing::debug!(parent: &self.span, "Tool call complete");
        duration
    }
}

/// Timing guard for a named operation.
///
/// Recorded to metrics when finished. Dropping without finishing only
/// closes the span.
pub struct TimedOperation {
    name: String,
    start: Instant,
    span: Span,
}

impl TimedOperation {
    pub fn start(name: &str) -> Self {
        let span = info_span!(
            "operation",
            op = %name,
            duration_ms = tracing::field::Empty,
        );

        Self {
            name: name.to_string(),
            start: Instant::now(),
            span,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();
        self.span.record("duration_ms", duration.as_secs_f64() * 1000.0);
        super::metrics::GLOBAL_METRICS.record_operation(&self.name, duration);
        duration
    }
}
