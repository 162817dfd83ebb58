//! Service planner: turn the query analysis into a stage schedule.
//!
//! Stage-construction invariants: `analysis` and `visualization` never share
//! a stage with `data` (both consume it); `news` and `knowledge` are always
//! mutually independent and may share a stage; a general intent produces an
//! empty plan.

use tracing::{debug, info};

use crate::context::Context;
use crate::state::{
    AgentName, Complexity, ExecutionPlan, Intent, PlanMode, QueryAnalysis, RequestState, Stage,
};

pub(crate) const NODE: &str = "service_planner";

/// Static latency estimates per agent, informational only.
fn estimate_ms(agent: AgentName) -> u64 {
    match agent {
        AgentName::Data => 800,
        AgentName::News => 2_000,
        AgentName::Knowledge => 1_500,
        AgentName::Analysis => 2_500,
        AgentName::Visualization => 1_200,
    }
}

/// Run the planner against the state record.
pub(crate) async fn run(state: &mut RequestState, _ctx: &Context) {
    let Some(analysis) = state.analysis.clone() else {
        // The analyzer faults before reaching here; an absent analysis on
        // the normal path still degrades to an empty plan.
        state.plan = Some(empty_plan());
        return;
    };

    let plan = build_plan(&analysis);
    info!(
        request_id = %state.request_id,
        mode = ?plan.mode,
        stages = plan.stages.len(),
        estimated_ms = plan.estimated_ms,
        "plan built"
    );
    state.plan = Some(plan);
}

fn empty_plan() -> ExecutionPlan {
    ExecutionPlan {
        mode: PlanMode::Single,
        stages: Vec::new(),
        estimated_ms: 0,
    }
}

/// Apply the complexity policy table.
pub(crate) fn build_plan(analysis: &QueryAnalysis) -> ExecutionPlan {
    if analysis.primary_intent == Intent::General || analysis.required_agents.is_empty() {
        return empty_plan();
    }

    let required = &analysis.required_agents;
    let needs = |agent: AgentName| required.contains(&agent);

    let stages: Vec<Stage> = match analysis.complexity {
        Complexity::Simple => {
            // One agent; agents that consume market data still get a data
            // stage in front of them.
            let own = match analysis.primary_intent {
                Intent::Data => AgentName::Data,
                Intent::Analysis => AgentName::Analysis,
                Intent::News => AgentName::News,
                Intent::Knowledge => AgentName::Knowledge,
                Intent::Visualization => AgentName::Visualization,
                Intent::General => unreachable!("general handled above"),
            };
            if analysis.primary_intent.required_agent() == Some(AgentName::Data) {
                vec![Stage::of([AgentName::Data]), Stage::of([own])]
            } else {
                vec![Stage::of([own])]
            }
        }
        Complexity::Moderate => {
            let mut stages = Vec::new();
            if needs(AgentName::Data) {
                stages.push(Stage::of([AgentName::Data]));
            }
            let rest: Vec<AgentName> = required
                .iter()
                .copied()
                .filter(|a| *a != AgentName::Data)
                .collect();
            if !rest.is_empty() {
                stages.push(Stage { agents: rest });
            }
            stages
        }
        Complexity::Complex => {
            let mut stages = Vec::new();
            if needs(AgentName::Data) {
                stages.push(Stage::of([AgentName::Data]));
            }
            // Gathering stage: only the independent fetchers actually
            // required, plus visualization (it only consumes data).
            let mut gather = Vec::new();
            for agent in [AgentName::News, AgentName::Knowledge, AgentName::Visualization] {
                if needs(agent) {
                    gather.push(agent);
                }
            }
            if !gather.is_empty() {
                stages.push(Stage { agents: gather });
            }
            if needs(AgentName::Analysis) {
                stages.push(Stage::of([AgentName::Analysis]));
            }
            stages
        }
    };

    let total_agents: usize = stages.iter().map(|s| s.agents.len()).sum();
    let mode = if total_agents <= 1 {
        PlanMode::Single
    } else if stages.iter().any(|s| s.agents.len() > 1) {
        PlanMode::Hybrid
    } else {
        PlanMode::Sequential
    };

    // Sum of per-stage maxima.
    let estimated_ms = stages
        .iter()
        .map(|s| s.agents.iter().map(|a| estimate_ms(*a)).max().unwrap_or(0))
        .sum();

    let plan = ExecutionPlan {
        mode,
        stages,
        estimated_ms,
    };
    debug_assert!(plan_is_well_formed(&plan), "planner produced invalid stages");
    debug!(mode = ?plan.mode, "stage schedule assembled");
    plan
}

/// The stage invariants the planner must never violate.
fn plan_is_well_formed(plan: &ExecutionPlan) -> bool {
    for stage in &plan.stages {
        let with_data = stage.agents.contains(&AgentName::Data);
        if with_data && stage.agents.contains(&AgentName::Analysis) {
            return false;
        }
        if with_data && stage.agents.contains(&AgentName::Visualization) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Complexity;

    fn analysis(
        intent: Intent,
        complexity: Complexity,
        agents: &[AgentName],
    ) -> QueryAnalysis {
        QueryAnalysis {
            primary_intent: intent,
            complexity,
            required_agents: agents.to_vec(),
            confidence: 0.9,
            is_investment: false,
            next_agent: agents.first().copied(),
        }
    }

    #[test]
    fn simple_data_is_a_single_stage() {
        let plan = build_plan(&analysis(
            Intent::Data,
            Complexity::Simple,
            &[AgentName::Data],
        ));
        assert_eq!(plan.mode, PlanMode::Single);
        assert_eq!(plan.stages, vec![Stage::of([AgentName::Data])]);
        assert_eq!(plan.estimated_ms, 800);
    }

    #[test]
    fn simple_knowledge_is_a_single_stage() {
        let plan = build_plan(&analysis(
            Intent::Knowledge,
            Complexity::Simple,
            &[AgentName::Knowledge],
        ));
        assert_eq!(plan.stages, vec![Stage::of([AgentName::Knowledge])]);
        assert_eq!(plan.mode, PlanMode::Single);
    }

    #[test]
    fn moderate_splits_data_from_the_rest() {
        let plan = build_plan(&analysis(
            Intent::News,
            Complexity::Moderate,
            &[AgentName::Data, AgentName::News, AgentName::Knowledge],
        ));
        assert_eq!(
            plan.stages,
            vec![
                Stage::of([AgentName::Data]),
                Stage::of([AgentName::News, AgentName::Knowledge]),
            ]
        );
        assert_eq!(plan.mode, PlanMode::Hybrid);
        assert_eq!(plan.estimated_ms, 800 + 2_000);
    }

    #[test]
    fn complex_investment_plan_ends_with_analysis() {
        let plan = build_plan(&analysis(
            Intent::Analysis,
            Complexity::Complex,
            &[
                AgentName::Data,
                AgentName::Analysis,
                AgentName::News,
                AgentName::Knowledge,
            ],
        ));
        assert_eq!(
            plan.stages,
            vec![
                Stage::of([AgentName::Data]),
                Stage::of([AgentName::News, AgentName::Knowledge]),
                Stage::of([AgentName::Analysis]),
            ]
        );
        assert_eq!(plan.mode, PlanMode::Hybrid);
    }

    #[test]
    fn complex_plan_omits_unrequired_gatherers() {
        let plan = build_plan(&analysis(
            Intent::Analysis,
            Complexity::Complex,
            &[AgentName::Data, AgentName::Analysis, AgentName::News],
        ));
        assert_eq!(
            plan.stages,
            vec![
                Stage::of([AgentName::Data]),
                Stage::of([AgentName::News]),
                Stage::of([AgentName::Analysis]),
            ]
        );
    }

    #[test]
    fn general_intent_produces_an_empty_plan() {
        let plan = build_plan(&analysis(Intent::General, Complexity::Simple, &[]));
        assert!(plan.is_empty());
        assert_eq!(plan.estimated_ms, 0);
    }

    #[test]
    fn data_never_shares_a_stage_with_its_consumers() {
        let cases = [
            analysis(
                Intent::Visualization,
                Complexity::Moderate,
                &[AgentName::Data, AgentName::Visualization],
            ),
            analysis(
                Intent::Analysis,
                Complexity::Simple,
                &[AgentName::Data, AgentName::Analysis],
            ),
            analysis(
                Intent::Analysis,
                Complexity::Complex,
                &[
                    AgentName::Data,
                    AgentName::Analysis,
                    AgentName::Visualization,
                ],
            ),
        ];
        for case in &cases {
            let plan = build_plan(case);
            assert!(plan_is_well_formed(&plan));
            assert!(plan.contains(AgentName::Data));
        }
    }
}
