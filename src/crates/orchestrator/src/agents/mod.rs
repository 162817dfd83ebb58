//! Worker agents: the domain-work half of the graph.
//!
//! All agents share one contract: given a read-only snapshot of the state
//! they produce a typed payload or a fault. They never touch the state
//! record itself; the parallel executor installs whatever they return.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::capability::Capabilities;
use crate::config::OrchestratorConfig;
use crate::error::Fault;
use crate::state::{AgentName, AgentPayload, Snapshot};

mod analysis;
mod data;
mod knowledge;
mod news;
mod visualization;

pub(crate) use news::title_jaccard;

/// The uniform worker-agent contract.
#[async_trait]
pub(crate) trait WorkerAgent: Send + Sync {
    /// The role this agent fills.
    fn name(&self) -> AgentName;

    /// Do the work. Pure with respect to the state record: reads the
    /// snapshot, consults collaborators, returns a payload or a fault.
    async fn process(
        &self,
        snapshot: &Snapshot,
        caps: &Capabilities,
        config: &OrchestratorConfig,
    ) -> Result<AgentPayload, Fault>;
}

/// Build the full agent table.
pub(crate) fn registry() -> BTreeMap<AgentName, Arc<dyn WorkerAgent>> {
    let agents: [Arc<dyn WorkerAgent>; 5] = [
        Arc::new(data::DataAgent),
        Arc::new(analysis::AnalysisAgent),
        Arc::new(news::NewsAgent),
        Arc::new(knowledge::KnowledgeAgent),
        Arc::new(visualization::VisualizationAgent),
    ];
    agents.into_iter().map(|a| (a.name(), a)).collect()
}
