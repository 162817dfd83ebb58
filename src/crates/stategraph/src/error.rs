//! Error types for graph construction and execution.

use thiserror::Error;

/// Convenience result type using [`GraphError`].
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors produced by graph construction or the run loop.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Graph structure validation failed at build time, or a routing
    /// function returned an unknown node at run time.
    #[error("graph validation failed: {0}")]
    Validation(String),

    /// A node failed and no fault node was configured to absorb it.
    #[error("node '{node}' execution failed: {error}")]
    NodeExecution {
        /// Name of the node that failed.
        node: String,
        /// Error message from the node.
        error: String,
    },

    /// The run exceeded the node-invocation bound, indicating a cycle.
    #[error("hop limit of {limit} node invocations exceeded")]
    HopLimit {
        /// Configured maximum number of node invocations.
        limit: usize,
    },
}

impl GraphError {
    /// Create a node execution error with context.
    pub fn node_execution(node: impl Into<String>, error: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            error: error.into(),
        }
    }
}
