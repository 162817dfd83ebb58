//! The run loop: drive a state record through the graph.

use chrono::Utc;

use crate::error::{GraphError, Result};
use crate::graph::{FlowState, Graph};
use crate::trace::{NodeSpan, SpanOutcome};

impl<S: FlowState> Graph<S> {
    /// Drive `state` from the entry node to a terminal node.
    ///
    /// Each invocation runs the current node, appends a trace span, then
    /// picks the next node: failures and pending unrecoverable faults divert
    /// to the fault node; otherwise the router (if any) is consulted, then
    /// the unconditional edge. Terminal nodes execute and halt the run.
    ///
    /// # Errors
    ///
    /// - [`GraphError::NodeExecution`] when a node fails and no fault node
    ///   can absorb the failure.
    /// - [`GraphError::HopLimit`] when the invocation bound is exceeded.
    /// - [`GraphError::Validation`] when a router names an unknown node.
    pub async fn run(&self, mut state: S) -> Result<S> {
        let mut current = self.entry.clone();

        for hop in 0..self.max_hops {
            let entry = self.nodes.get(&current).ok_or_else(|| {
                GraphError::Validation(format!("routed to unknown node '{current}'"))
            })?;

            tracing::debug!(node = %entry.name, hop = hop, "node start");
            let started_at = Utc::now();
            let (returned, result) = (entry.run)(state).await;
            state = returned;
            let ended_at = Utc::now();

            let outcome = match &result {
                Ok(()) => SpanOutcome::Completed,
                Err(e) => SpanOutcome::Failed(e.to_string()),
            };
            state.record_span(NodeSpan {
                node: current.clone(),
                started_at,
                ended_at,
                outcome,
            });

            if let Err(e) = result {
                tracing::warn!(node = %current, error = %e, "node failed");
                state.note_failure(&current, &e.to_string());
                match &self.fault_node {
                    Some(fault) if *fault != current => {
                        current = fault.clone();
                        continue;
                    }
                    _ => {
                        return Err(GraphError::node_execution(current, e.to_string()));
                    }
                }
            }

            if self.terminals.contains(&current) {
                tracing::debug!(node = %current, hops = hop + 1, "run complete");
                return Ok(state);
            }

            // An unrecoverable fault left in the state diverts the same way
            // a raised error does, unless we are already on the fault path.
            if state.fault_pending() {
                if let Some(fault) = &self.fault_node {
                    if *fault != current {
                        tracing::debug!(node = %current, fault_node = %fault, "diverting on pending fault");
                        current = fault.clone();
                        continue;
                    }
                }
            }

            current = self.next_node(&current, &state)?;
        }

        Err(GraphError::HopLimit {
            limit: self.max_hops,
        })
    }

    fn next_node(&self, from: &str, state: &S) -> Result<String> {
        if let Some(router) = self.routers.get(from) {
            return Ok(router(state));
        }
        self.edges.get(from).cloned().ok_or_else(|| {
            GraphError::Validation(format!("node '{from}' has no outgoing edge"))
        })
    }
}
