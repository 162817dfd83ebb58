//! Parallel executor: run the plan's stages with bounded concurrency,
//! per-agent deadlines, cancellation, and partial-failure tolerance.
//!
//! Agents within a stage run truly in parallel, each on a worker permit
//! from the shared pool; saturated acquires queue FIFO. A stage completes
//! when its last task settles; per-agent deadlines bound that wait. An
//! agent failure never aborts the stage — only a failed *required* agent
//! fails the request.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{ErrorKind, Fault};
use crate::state::{AgentName, AgentOutcome, Intent, RequestState, Snapshot, Stage};

pub(crate) const NODE: &str = "parallel_executor";

/// Run the executor against the state record.
pub(crate) async fn run(state: &mut RequestState, ctx: &Arc<Context>) {
    let Some(plan) = state.plan.clone() else {
        debug!("no plan present, nothing to execute");
        return;
    };
    let required = required_agents(state.intent());

    for (index, stage) in plan.stages.iter().enumerate() {
        if state.cancel.is_cancelled() {
            state.record_fault(Fault::fatal(ErrorKind::Cancelled, NODE, "request cancelled"));
            return;
        }

        debug!(stage = index, agents = ?stage.agents, "stage start");
        run_stage(state, ctx, stage).await;

        if state.cancel.is_cancelled() {
            state.record_fault(Fault::fatal(ErrorKind::Cancelled, NODE, "request cancelled"));
            return;
        }

        // A failed required agent ends the request on the error path.
        for agent in &stage.agents {
            if !required.contains(agent) {
                continue;
            }
            let failed = state
                .agent_results
                .get(agent)
                .map(|o| !o.success)
                .unwrap_or(true);
            if failed {
                let detail = state
                    .agent_results
                    .get(agent)
                    .and_then(|o| o.error.as_ref())
                    .map(|f| format!("{}: {}", f.kind, f.message))
                    .unwrap_or_else(|| "no outcome recorded".to_string());
                warn!(agent = %agent, detail = %detail, "required agent failed");
                state.record_fault(Fault::fatal(
                    ErrorKind::RequiredAgentFailed,
                    NODE,
                    format!("required agent '{agent}' failed ({detail})"),
                ));
                return;
            }
        }

        // A short-circuit decided in this stage skips the remaining ones;
        // the graph router then jumps straight to the responder.
        if state.short_circuited() {
            info!(stage = index, "short-circuit active, skipping remaining stages");
            return;
        }
    }
}

/// Launch every agent of the stage and install their outcomes. Outcomes
/// are installed in stage declaration order, but the tasks themselves run
/// concurrently and finish in any order.
async fn run_stage(state: &mut RequestState, ctx: &Arc<Context>, stage: &Stage) {
    let snapshot = state.snapshot();
    let handles: Vec<(AgentName, JoinHandle<AgentOutcome>)> = stage
        .agents
        .iter()
        .map(|&agent| (agent, spawn_agent(agent, &snapshot, ctx, state)))
        .collect();

    for (agent, handle) in handles {
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) => AgentOutcome::failure(
                agent,
                Fault::recoverable(
                    ErrorKind::Internal,
                    agent.as_str(),
                    format!("agent task aborted: {e}"),
                ),
                0,
            ),
        };
        debug!(
            agent = %agent,
            success = outcome.success,
            elapsed_ms = outcome.elapsed_ms,
            "agent finished"
        );
        state.install_outcome(outcome);
    }
}

fn spawn_agent(
    agent: AgentName,
    snapshot: &Snapshot,
    ctx: &Arc<Context>,
    state: &RequestState,
) -> JoinHandle<AgentOutcome> {
    let snapshot = snapshot.clone();
    let ctx = ctx.clone();
    let cancel = state.cancel.clone();
    let deadline = ctx.config.agent_timeout(agent);

    tokio::spawn(async move {
        let started = Instant::now();

        let _permit = match ctx.pool.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return AgentOutcome::failure(
                    agent,
                    Fault::recoverable(ErrorKind::Internal, agent.as_str(), "worker pool closed"),
                    elapsed_ms(started),
                );
            }
        };

        let Some(worker) = ctx.agents.get(&agent).cloned() else {
            return AgentOutcome::failure(
                agent,
                Fault::recoverable(ErrorKind::Internal, agent.as_str(), "agent not registered"),
                elapsed_ms(started),
            );
        };

        // Cancellation wins over completion; dropping the agent future
        // cancels it at its next suspension point, which is at most one
        // collaborator call away.
        let result = tokio::select! {
            _ = cancel.cancelled() => Err(Fault::recoverable(
                ErrorKind::Cancelled,
                agent.as_str(),
                "request cancelled",
            )),
            outcome = tokio::time::timeout(
                deadline,
                worker.process(&snapshot, &ctx.caps, &ctx.config),
            ) => match outcome {
                Ok(result) => result,
                Err(_) => Err(Fault::recoverable(
                    ErrorKind::Timeout,
                    agent.as_str(),
                    format!("deadline of {}ms exceeded", deadline.as_millis()),
                )),
            },
        };

        match result {
            Ok(payload) => AgentOutcome::success(agent, payload, elapsed_ms(started)),
            Err(fault) => AgentOutcome::failure(agent, fault, elapsed_ms(started)),
        }
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Agents whose failure fails the request: the intent's own agent, plus the
/// data agent where the intent consumes market data.
pub(crate) fn required_agents(intent: Intent) -> Vec<AgentName> {
    match intent {
        Intent::Data => vec![AgentName::Data],
        Intent::Analysis => vec![AgentName::Data, AgentName::Analysis],
        Intent::Visualization => vec![AgentName::Data, AgentName::Visualization],
        Intent::News => vec![AgentName::News],
        Intent::Knowledge => vec![AgentName::Knowledge],
        Intent::General => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::OrchestratorConfig;
    use crate::state::{
        Complexity, ExecutionPlan, PlanMode, QueryAnalysis, Request, RequestState,
    };
    use crate::testing::{healthy_capabilities, FakeMarketData, FakeNewsFeed};

    fn staged_state(
        query: &str,
        intent: Intent,
        complexity: Complexity,
        agents: &[AgentName],
        stages: Vec<Stage>,
    ) -> RequestState {
        let mut state = RequestState::new(Request::new(query, "s", "u"));
        state.analysis = Some(QueryAnalysis {
            primary_intent: intent,
            complexity,
            required_agents: agents.to_vec(),
            confidence: 0.9,
            is_investment: false,
            next_agent: agents.first().copied(),
        });
        state.plan = Some(ExecutionPlan {
            mode: PlanMode::Hybrid,
            stages,
            estimated_ms: 0,
        });
        state
    }

    #[tokio::test]
    async fn optional_agent_timeout_is_absorbed() {
        let feed = Arc::new(FakeNewsFeed::stalling(Duration::from_secs(30)));
        let mut caps = healthy_capabilities();
        caps.news_feed = feed;
        let config = OrchestratorConfig::default()
            .with_agent_timeout(AgentName::News, Duration::from_millis(100));
        let ctx = Arc::new(Context::new(caps, config));

        let mut state = staged_state(
            "카카오 분석",
            Intent::Analysis,
            Complexity::Moderate,
            &[AgentName::Data, AgentName::Analysis, AgentName::News],
            vec![Stage::of([AgentName::News])],
        );
        run(&mut state, &ctx).await;

        let outcome = &state.agent_results[&AgentName::News];
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::Timeout);
        // The stage absorbed the failure: no request-level fault.
        assert!(state.fault.is_none());
    }

    #[tokio::test]
    async fn required_agent_failure_faults_the_request() {
        let mut caps = healthy_capabilities();
        caps.market_data = Arc::new(FakeMarketData::not_found());
        let ctx = Arc::new(Context::new(caps, OrchestratorConfig::default()));

        let mut state = staged_state(
            "삼성전자 주가",
            Intent::Data,
            Complexity::Simple,
            &[AgentName::Data],
            vec![Stage::of([AgentName::Data])],
        );
        run(&mut state, &ctx).await;

        let outcome = &state.agent_results[&AgentName::Data];
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_ref().unwrap().kind, ErrorKind::SymbolNotFound);

        let fault = state.fault.as_ref().unwrap();
        assert_eq!(fault.kind, ErrorKind::RequiredAgentFailed);
        assert!(!fault.recoverable);
    }

    #[tokio::test]
    async fn short_circuit_skips_remaining_stages() {
        let feed = Arc::new(FakeNewsFeed::default());
        let mut caps = healthy_capabilities();
        caps.news_feed = feed.clone();
        let ctx = Arc::new(Context::new(caps, OrchestratorConfig::default()));

        let mut state = staged_state(
            "삼성전자 주가",
            Intent::Data,
            Complexity::Simple,
            &[AgentName::Data],
            vec![Stage::of([AgentName::Data]), Stage::of([AgentName::News])],
        );
        run(&mut state, &ctx).await;

        assert!(state.short_circuited());
        assert!(!state.agent_results.contains_key(&AgentName::News));
        assert_eq!(feed.fetch_calls(), 0);
    }

    #[tokio::test]
    async fn cancellation_faults_before_launching_agents() {
        let market = Arc::new(FakeMarketData::default());
        let mut caps = healthy_capabilities();
        caps.market_data = market.clone();
        let ctx = Arc::new(Context::new(caps, OrchestratorConfig::default()));

        let mut state = staged_state(
            "삼성전자 주가",
            Intent::Data,
            Complexity::Simple,
            &[AgentName::Data],
            vec![Stage::of([AgentName::Data])],
        );
        state.cancel.cancel();
        run(&mut state, &ctx).await;

        let fault = state.fault.as_ref().unwrap();
        assert_eq!(fault.kind, ErrorKind::Cancelled);
        assert!(!fault.recoverable);
        assert_eq!(market.quote_calls(), 0);
    }

    #[tokio::test]
    async fn later_stages_observe_earlier_payloads() {
        let ctx = Arc::new(Context::new(
            healthy_capabilities(),
            OrchestratorConfig::default(),
        ));

        let mut state = staged_state(
            "네이버 투자 분석",
            Intent::Analysis,
            Complexity::Complex,
            &[AgentName::Data, AgentName::Analysis],
            vec![Stage::of([AgentName::Data]), Stage::of([AgentName::Analysis])],
        );
        run(&mut state, &ctx).await;

        assert!(state.agent_results[&AgentName::Data].success);
        // The analysis agent only succeeds when it saw the data stage's
        // payload in its snapshot.
        assert!(state.agent_results[&AgentName::Analysis].success);
        assert!(state.analysis_result.is_some());
        assert!(state.fault.is_none());
    }

    #[test]
    fn required_agent_table() {
        assert_eq!(required_agents(Intent::Data), vec![AgentName::Data]);
        assert_eq!(
            required_agents(Intent::Analysis),
            vec![AgentName::Data, AgentName::Analysis]
        );
        assert_eq!(
            required_agents(Intent::Visualization),
            vec![AgentName::Data, AgentName::Visualization]
        );
        assert_eq!(required_agents(Intent::News), vec![AgentName::News]);
        assert!(required_agents(Intent::General).is_empty());
    }
}
