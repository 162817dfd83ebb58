//! Graph structure: node table, edges, routers, and the builder.
//!
//! A graph is built once with [`GraphBuilder`], validated, and then reused
//! across runs. Nodes are async functions that own the state record for the
//! duration of the call and hand it back; routers pick the next node from
//! the state after a node completes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{GraphError, Result};
use crate::trace::NodeSpan;

/// Node identifier, unique within a graph.
pub type NodeId = String;

/// Error type nodes are allowed to return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// What a node invocation yields: the state record handed back (the record
/// is single-owner, so the node owns it for the duration of the call) plus
/// the invocation result.
pub type NodeOutput<S> = (S, std::result::Result<(), BoxError>);

/// Async node function. The node takes ownership of the state record and
/// returns it together with the invocation result, so the record survives
/// the failure path.
pub type NodeFn<S> = Arc<dyn Fn(S) -> BoxFuture<'static, NodeOutput<S>> + Send + Sync>;

/// Routing function consulted after a node completes. Returns the name of
/// the next node to run. Takes precedence over the unconditional edge.
pub type RouterFn<S> = Arc<dyn Fn(&S) -> NodeId + Send + Sync>;

/// Contract between the runtime and the state record it carries.
///
/// The runtime is the only writer of trace spans and the only caller of
/// [`note_failure`](FlowState::note_failure); nodes record their own domain
/// faults directly in the state and return `Ok(())`.
pub trait FlowState: Send + 'static {
    /// Record that `node` returned an error. Called by the runtime before
    /// diverting to the fault node.
    fn note_failure(&mut self, node: &str, message: &str);

    /// Whether the state carries an unrecoverable fault that has not yet
    /// been absorbed. A `true` here diverts execution to the fault node.
    fn fault_pending(&self) -> bool;

    /// Append a span to the execution trace.
    fn record_span(&mut self, span: NodeSpan);
}

pub(crate) struct NodeEntry<S> {
    pub(crate) name: NodeId,
    pub(crate) run: NodeFn<S>,
}

/// An executable graph over state type `S`.
///
/// Construct with [`GraphBuilder`]; run with [`Graph::run`].
pub struct Graph<S> {
    pub(crate) nodes: HashMap<NodeId, NodeEntry<S>>,
    pub(crate) edges: HashMap<NodeId, NodeId>,
    pub(crate) routers: HashMap<NodeId, RouterFn<S>>,
    pub(crate) entry: NodeId,
    pub(crate) terminals: HashSet<NodeId>,
    pub(crate) fault_node: Option<NodeId>,
    pub(crate) max_hops: usize,
}

impl<S> Graph<S> {
    /// Entry node name.
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Configured node-invocation bound.
    pub fn max_hops(&self) -> usize {
        self.max_hops
    }

    /// Whether `name` is registered as a terminal node.
    pub fn is_terminal(&self, name: &str) -> bool {
        self.terminals.contains(name)
    }
}

/// Default node-invocation bound; catches accidental cycles.
pub const DEFAULT_MAX_HOPS: usize = 32;

/// Builder for [`Graph`].
pub struct GraphBuilder<S> {
    nodes: HashMap<NodeId, NodeEntry<S>>,
    edges: HashMap<NodeId, NodeId>,
    routers: HashMap<NodeId, RouterFn<S>>,
    entry: Option<NodeId>,
    terminals: HashSet<NodeId>,
    fault_node: Option<NodeId>,
    max_hops: usize,
}

impl<S> Default for GraphBuilder<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> GraphBuilder<S> {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            routers: HashMap::new(),
            entry: None,
            terminals: HashSet::new(),
            fault_node: None,
            max_hops: DEFAULT_MAX_HOPS,
        }
    }

    /// Register a node under `name`.
    pub fn add_node(mut self, name: impl Into<NodeId>, run: NodeFn<S>) -> Self {
        let name = name.into();
        self.nodes.insert(
            name.clone(),
            NodeEntry { name, run },
        );
        self
    }

    /// Add an unconditional edge `from -> to`.
    pub fn add_edge(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        self.edges.insert(from.into(), to.into());
        self
    }

    /// Attach a routing function to `from`. Consulted before the
    /// unconditional edge.
    pub fn add_router(mut self, from: impl Into<NodeId>, router: RouterFn<S>) -> Self {
        self.routers.insert(from.into(), router);
        self
    }

    /// Set the entry node.
    pub fn entry(mut self, name: impl Into<NodeId>) -> Self {
        self.entry = Some(name.into());
        self
    }

    /// Mark `name` as terminal: it executes, then the run halts.
    pub fn terminal(mut self, name: impl Into<NodeId>) -> Self {
        self.terminals.insert(name.into());
        self
    }

    /// Designate the node that absorbs failures and pending faults.
    pub fn fault_node(mut self, name: impl Into<NodeId>) -> Self {
        self.fault_node = Some(name.into());
        self
    }

    /// Override the node-invocation bound (default 32).
    pub fn max_hops(mut self, limit: usize) -> Self {
        self.max_hops = limit;
        self
    }

    /// Validate the structure and produce an executable [`Graph`].
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Validation`] when the entry is missing or
    /// unknown, an edge endpoint or router source is unknown, a terminal or
    /// the fault node is unknown, or no terminal is registered.
    pub fn build(self) -> Result<Graph<S>> {
        let entry = self
            .entry
            .ok_or_else(|| GraphError::Validation("no entry node set".to_string()))?;
        if !self.nodes.contains_key(&entry) {
            return Err(GraphError::Validation(format!(
                "entry node '{entry}' does not exist"
            )));
        }
        if self.terminals.is_empty() {
            return Err(GraphError::Validation("no terminal node set".to_string()));
        }
        for (from, to) in &self.edges {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "edge source '{from}' does not exist"
                )));
            }
            if !self.nodes.contains_key(to) {
                return Err(GraphError::Validation(format!(
                    "edge target '{to}' does not exist"
                )));
            }
        }
        for from in self.routers.keys() {
            if !self.nodes.contains_key(from) {
                return Err(GraphError::Validation(format!(
                    "router source '{from}' does not exist"
                )));
            }
        }
        for name in &self.terminals {
            if !self.nodes.contains_key(name) {
                return Err(GraphError::Validation(format!(
                    "terminal node '{name}' does not exist"
                )));
            }
        }
        if let Some(fault) = &self.fault_node {
            if !self.nodes.contains_key(fault) {
                return Err(GraphError::Validation(format!(
                    "fault node '{fault}' does not exist"
                )));
            }
        }

        Ok(Graph {
            nodes: self.nodes,
            edges: self.edges,
            routers: self.routers,
            entry,
            terminals: self.terminals,
            fault_node: self.fault_node,
            max_hops: self.max_hops,
        })
    }
}
