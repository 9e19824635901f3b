// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing and metrics for the host.
//!
//! - **Tracing**: `tracing` spans around MCP requests, tool calls and turns,
//!   written to stderr by a `tracing-subscriber` fmt layer
//! - **Metrics**: per-tool and per-operation latency, token totals and
//!   session lifecycle counts in [`GLOBAL_METRICS`]
//! - **Correlation IDs**: tag sessions and turns across tasks
//!
//! Metrics recording is compiled in with the `telemetry` feature (on by
//! default). Log lines never contain bearer tokens or request bodies.
//!
//! ```rust,ignore
//! use mcp_host::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};
//!
//! let _guard = init_telemetry(&TelemetryConfig::default())?;
//! // ... run a chat turn ...
//! eprintln!("{}", GLOBAL_METRICS.snapshot().format_report());
//! ```

mod correlation;
mod init;
pub mod metrics;
mod spans;

pub use correlation::{CorrelationId, CorrelationIdExt};
pub use init::{init_telemetry, TelemetryConfig, TelemetryGuard};
pub use metrics::{
    Histogram, Metrics, MetricsSnapshot, OperationMetrics, SessionCounts, ToolMetrics,
    GLOBAL_METRICS,
};
pub use spans::{SpanExt, TimedOperation, ToolSpan};
