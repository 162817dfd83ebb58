//! Execution trace records.
//!
//! The runtime appends one [`NodeSpan`] per node invocation, in start order.
//! Spans are plain data so callers can ship them to whatever observability
//! sink they use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a node invocation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanOutcome {
    /// The node returned successfully.
    Completed,
    /// The node returned an error; the message is carried for diagnostics.
    Failed(String),
}

impl SpanOutcome {
    /// Whether this span ended in success.
    pub fn is_ok(&self) -> bool {
        matches!(self, SpanOutcome::Completed)
    }
}

/// One node invocation in the execution trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpan {
    /// Node name as registered in the graph.
    pub node: String,
    /// Wall-clock start of the invocation.
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of the invocation.
    pub ended_at: DateTime<Utc>,
    /// How the invocation ended.
    pub outcome: SpanOutcome,
}

impl NodeSpan {
    /// Invocation duration in whole milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        (self.ended_at - self.started_at).num_milliseconds()
    }
}
