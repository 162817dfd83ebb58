//! Engine configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::state::{AgentName, ConfidenceThresholds};

fn default_worker_pool_size() -> usize {
    8
}

fn default_request_timeout_ms() -> u64 {
    120_000
}

fn default_max_graph_hops() -> usize {
    32
}

fn default_news_top_k() -> usize {
    10
}

fn default_knowledge_top_k() -> usize {
    3
}

fn default_similarity_dedup_threshold() -> f64 {
    0.9
}

fn default_agent_timeouts() -> HashMap<AgentName, u64> {
    HashMap::from([
        (AgentName::Data, 10_000),
        (AgentName::Visualization, 20_000),
    ])
}

/// Deadline applied to agents without an explicit override.
pub const DEFAULT_AGENT_TIMEOUT_MS: u64 = 30_000;

/// Recognized engine options. All fields have working defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Parallelism of the shared agent worker pool.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    /// Per-agent deadline overrides in milliseconds. Agents not listed use
    /// [`DEFAULT_AGENT_TIMEOUT_MS`].
    #[serde(default = "default_agent_timeouts")]
    pub agent_timeout_ms: HashMap<AgentName, u64>,

    /// Whole-request ceiling in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Node-invocation bound per request; catches accidental cycles.
    #[serde(default = "default_max_graph_hops")]
    pub max_graph_hops: usize,

    /// Maximum news items returned by the news agent.
    #[serde(default = "default_news_top_k")]
    pub news_top_k: usize,

    /// Minimum relevance for news-graph hits.
    #[serde(default)]
    pub news_min_score: f64,

    /// Top-k for knowledge retrieval.
    #[serde(default = "default_knowledge_top_k")]
    pub knowledge_top_k: usize,

    /// Title-Jaccard cutoff for news deduplication.
    #[serde(default = "default_similarity_dedup_threshold")]
    pub similarity_dedup_threshold: f64,

    /// Grade boundaries for the confidence report.
    #[serde(default)]
    pub confidence_thresholds: ConfidenceThresholds,

    /// Retry policy for transient collaborator failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: default_worker_pool_size(),
            agent_timeout_ms: default_agent_timeouts(),
            request_timeout_ms: default_request_timeout_ms(),
            max_graph_hops: default_max_graph_hops(),
            news_top_k: default_news_top_k(),
            news_min_score: 0.0,
            knowledge_top_k: default_knowledge_top_k(),
            similarity_dedup_threshold: default_similarity_dedup_threshold(),
            confidence_thresholds: ConfidenceThresholds::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the worker pool size.
    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    /// Override one agent's deadline.
    pub fn with_agent_timeout(mut self, agent: AgentName, timeout: Duration) -> Self {
        self.agent_timeout_ms
            .insert(agent, timeout.as_millis() as u64);
        self
    }

    /// Set the whole-request ceiling.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the news top-k.
    pub fn with_news_top_k(mut self, top_k: usize) -> Self {
        self.news_top_k = top_k;
        self
    }

    /// The deadline for one agent invocation.
    pub fn agent_timeout(&self, agent: AgentName) -> Duration {
        let ms = self
            .agent_timeout_ms
            .get(&agent)
            .copied()
            .unwrap_or(DEFAULT_AGENT_TIMEOUT_MS);
        Duration::from_millis(ms)
    }

    /// The whole-request ceiling.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
