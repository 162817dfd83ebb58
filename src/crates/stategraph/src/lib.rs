//! Typed-state graph runtime.
//!
//! A [`Graph`] drives a single mutable state record through a table of named
//! nodes. Control flow is defined by unconditional edges and by routing
//! functions that inspect the state after a node completes. One node may be
//! designated as the fault node: when a node fails, or leaves an unabsorbed
//! fault in the state, execution diverts there instead of following the
//! normal edges.
//!
//! The runtime owns the execution trace. It appends one [`NodeSpan`] per
//! node invocation through [`FlowState::record_span`]; nodes never write
//! trace entries themselves.
//!
//! # Example
//!
//! ```rust,ignore
//! let graph = GraphBuilder::new()
//!     .add_node("work", node_fn)
//!     .add_node("done", done_fn)
//!     .add_edge("work", "done")
//!     .entry("work")
//!     .terminal("done")
//!     .build()?;
//!
//! let final_state = graph.run(initial_state).await?;
//! ```

pub mod error;
pub mod graph;
pub mod runner;
pub mod trace;

pub use error::{GraphError, Result};
pub use graph::{BoxError, FlowState, Graph, GraphBuilder, NodeFn, NodeId, NodeOutput, RouterFn};
pub use trace::{NodeSpan, SpanOutcome};
