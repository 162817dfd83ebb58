//! Engine: build the workflow graph once, run it per request.
//!
//! Control flow: `query_analyzer → service_planner → parallel_executor →
//! result_combiner → confidence_calculator → responder`, with a router
//! after the executor that jumps straight to the responder on a
//! short-circuit, and a fault path from any node through `error_handler`
//! to the responder.

use std::sync::Arc;

use stategraph::{Graph, GraphBuilder, NodeFn};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capability::Capabilities;
use crate::config::OrchestratorConfig;
use crate::context::Context;
use crate::error::{ErrorKind, Result};
use crate::responder::error_response;
use crate::state::{Request, RequestState, Response};
use crate::{analyzer, combiner, confidence, executor, handler, planner, responder};

/// Wrap a node module's `run` into the graph's owned-state node shape.
/// The module function borrows the state for the duration of the call and
/// hands it back through the returned tuple.
macro_rules! node_fn {
    ($context:expr, $module:ident) => {{
        let context = $context.clone();
        let f: NodeFn<RequestState> = Arc::new(move |mut state: RequestState| {
            let context = context.clone();
            Box::pin(async move {
                $module::run(&mut state, &context).await;
                (state, Ok(()))
            })
        });
        f
    }};
}

/// The orchestration engine. Construct once, call
/// [`orchestrate`](Engine::orchestrate) per request; the engine is safe to
/// share across concurrent requests.
pub struct Engine {
    context: Arc<Context>,
    graph: Graph<RequestState>,
}

impl Engine {
    /// Build and validate the workflow graph over the injected
    /// collaborators.
    pub fn new(caps: Capabilities, config: OrchestratorConfig) -> Result<Self> {
        let context = Arc::new(Context::new(caps, config));
        let graph = build_graph(&context)?;
        Ok(Self { context, graph })
    }

    /// Answer one request. Synchronous from the caller's viewpoint: the
    /// future resolves to the full response, inside the configured request
    /// ceiling.
    pub async fn orchestrate(&self, request: Request) -> Response {
        self.orchestrate_with_cancellation(request, CancellationToken::new())
            .await
    }

    /// Answer one request under an upstream cancellation token. Cancelling
    /// the token aborts in-flight agent work within one collaborator-call
    /// quantum and yields a cancelled error response.
    pub async fn orchestrate_with_cancellation(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> Response {
        let state = RequestState::new(request).with_cancellation(cancel.clone());
        let request_id = state.request_id;
        info!(%request_id, session_id = %state.session_id, "request accepted");

        let ceiling = self.context.config.request_timeout();
        match tokio::time::timeout(ceiling, self.graph.run(state)).await {
            Ok(Ok(state)) => {
                for span in &state.trace {
                    self.context.caps.tracer.emit(span);
                }
                state.response.unwrap_or_else(|| {
                    error!(%request_id, "run finished without a packed response");
                    error_response(ErrorKind::Internal)
                })
            }
            Ok(Err(e)) => {
                error!(%request_id, error = %e, "graph run failed");
                error_response(ErrorKind::Internal)
            }
            Err(_) => {
                // Ceiling hit: tear down whatever is still in flight.
                warn!(%request_id, ceiling_ms = ceiling.as_millis() as u64, "request ceiling hit");
                cancel.cancel();
                error_response(ErrorKind::Timeout)
            }
        }
    }
}

fn build_graph(context: &Arc<Context>) -> Result<Graph<RequestState>> {
    let graph = GraphBuilder::new()
        .add_node(analyzer::NODE, node_fn!(context, analyzer))
        .add_node(planner::NODE, node_fn!(context, planner))
        .add_node(executor::NODE, node_fn!(context, executor))
        .add_node(combiner::NODE, node_fn!(context, combiner))
        .add_node(confidence::NODE, node_fn!(context, confidence))
        .add_node(responder::NODE, node_fn!(context, responder))
        .add_node(handler::NODE, node_fn!(context, handler))
        .add_edge(analyzer::NODE, planner::NODE)
        .add_edge(planner::NODE, executor::NODE)
        .add_edge(combiner::NODE, confidence::NODE)
        .add_edge(confidence::NODE, responder::NODE)
        .add_edge(handler::NODE, responder::NODE)
        // The simple-data short-circuit jumps from the executor straight to
        // the responder.
        .add_router(
            executor::NODE,
            Arc::new(|state: &RequestState| {
                if state.short_circuited() {
                    responder::NODE.to_string()
                } else {
                    combiner::NODE.to_string()
                }
            }),
        )
        .entry(analyzer::NODE)
        .terminal(responder::NODE)
        .fault_node(handler::NODE)
        .max_hops(context.config.max_graph_hops)
        .build()?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::healthy_capabilities;

    #[tokio::test]
    async fn graph_builds_and_validates() {
        let engine = Engine::new(healthy_capabilities(), OrchestratorConfig::default());
        assert!(engine.is_ok());
    }
}
