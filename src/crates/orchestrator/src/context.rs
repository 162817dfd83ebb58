//! Shared per-engine context handed to every graph node.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::agents::{registry, WorkerAgent};
use crate::capability::Capabilities;
use crate::config::OrchestratorConfig;
use crate::state::AgentName;

/// Everything a node needs besides the state record: the injected
/// collaborators, the configuration, the worker pool, and the agent table.
pub(crate) struct Context {
    pub caps: Capabilities,
    pub config: OrchestratorConfig,
    /// Fixed-size agent worker pool, process-wide. Saturated acquires
    /// queue FIFO.
    pub pool: Arc<Semaphore>,
    /// The registered worker agents.
    pub agents: BTreeMap<AgentName, Arc<dyn WorkerAgent>>,
}

impl Context {
    pub(crate) fn new(caps: Capabilities, config: OrchestratorConfig) -> Self {
        let pool = Arc::new(Semaphore::new(config.worker_pool_size));
        Self {
            caps,
            config,
            pool,
            agents: registry(),
        }
    }
}
