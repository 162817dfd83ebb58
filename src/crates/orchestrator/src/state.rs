//! Request/response shapes and the per-request state record.
//!
//! The state record is the unit passed between graph nodes. It is
//! append-only in practice: each node adds fields keyed by its role and
//! never overwrites another node's fields. Agent results are installed
//! first-write-wins; the trace is runtime-owned.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stategraph::{FlowState, NodeSpan};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ErrorKind, Fault};

/// Maximum accepted query length in characters.
pub const MAX_QUERY_CHARS: usize = 4096;

/// Reply length below which the confidence scorer attaches a warning.
pub const MIN_REPLY_CHARS: usize = 80;

/// An incoming user request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Free-form user query.
    pub query: String,
    /// Conversation routing key.
    pub session_id: String,
    /// Observability key.
    pub user_id: String,
}

impl Request {
    /// Create a request.
    pub fn new(
        query: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
        }
    }
}

/// The action the response represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Data,
    Analysis,
    News,
    Knowledge,
    Visualization,
    General,
    Error,
}

/// The structured reply returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Final user-facing text.
    pub reply: String,
    /// What kind of answer this is.
    pub action_type: ActionType,
    /// Primary payload serialized for programmatic consumers.
    pub action_payload: Option<Value>,
    /// Rendered chart, PNG bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<Vec<u8>>,
    /// Knowledge-base hits that informed the reply.
    pub retrieved_documents: Vec<RetrievedDoc>,
    /// Normalized confidence in [0, 1].
    pub confidence: f64,
    /// Letter grade derived from the confidence thresholds.
    pub grade: Grade,
}

/// One retrieved knowledge-base document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDoc {
    /// Origin label (index name, collection, url).
    pub source: String,
    /// Similarity score from the index.
    pub score: f64,
    /// Matched text fragment.
    pub snippet: String,
}

/// The five worker-agent roles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Data,
    Analysis,
    News,
    Knowledge,
    Visualization,
}

impl AgentName {
    /// All agent roles, in canonical order.
    pub const ALL: [AgentName; 5] = [
        AgentName::Data,
        AgentName::Analysis,
        AgentName::News,
        AgentName::Knowledge,
        AgentName::Visualization,
    ];

    /// Stable wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Data => "data",
            AgentName::Analysis => "analysis",
            AgentName::News => "news",
            AgentName::Knowledge => "knowledge",
            AgentName::Visualization => "visualization",
        }
    }
}

impl std::fmt::Display for AgentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AgentName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" => Ok(AgentName::Data),
            "analysis" => Ok(AgentName::Analysis),
            "news" => Ok(AgentName::News),
            "knowledge" => Ok(AgentName::Knowledge),
            "visualization" => Ok(AgentName::Visualization),
            other => Err(format!("unknown agent name '{other}'")),
        }
    }
}

/// Classified intent of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Data,
    Analysis,
    News,
    Knowledge,
    Visualization,
    General,
}

impl Intent {
    /// The action type a successful answer of this intent carries.
    pub fn action_type(&self) -> ActionType {
        match self {
            Intent::Data => ActionType::Data,
            Intent::Analysis => ActionType::Analysis,
            Intent::News => ActionType::News,
            Intent::Knowledge => ActionType::Knowledge,
            Intent::Visualization => ActionType::Visualization,
            Intent::General => ActionType::General,
        }
    }

    /// The worker agent that must succeed for this intent, if any.
    pub fn required_agent(&self) -> Option<AgentName> {
        match self {
            Intent::Analysis | Intent::Visualization => Some(AgentName::Data),
            _ => None,
        }
    }
}

/// Classified complexity of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Simple,
    Moderate,
    Complex,
}

/// Output of the query analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Dominant intent.
    pub primary_intent: Intent,
    /// How much orchestration the query needs.
    pub complexity: Complexity,
    /// Worker agents that must be consulted. Non-empty except for
    /// general-intent queries.
    pub required_agents: Vec<AgentName>,
    /// Classifier confidence in [0, 1].
    pub confidence: f64,
    /// Whether the user asked for an investment judgement.
    pub is_investment: bool,
    /// First worker agent to dispatch.
    pub next_agent: Option<AgentName>,
}

/// Plan execution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    Single,
    Sequential,
    Hybrid,
}

/// One plan stage: agents that run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Agents launched together. Must be mutually independent.
    pub agents: Vec<AgentName>,
}

impl Stage {
    /// Stage over the given agents.
    pub fn of(agents: impl Into<Vec<AgentName>>) -> Self {
        Self {
            agents: agents.into(),
        }
    }
}

/// The stage schedule produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Overall shape of the schedule.
    pub mode: PlanMode,
    /// Stages in execution order.
    pub stages: Vec<Stage>,
    /// Informational latency estimate from static per-agent figures.
    pub estimated_ms: u64,
}

impl ExecutionPlan {
    /// Whether the plan schedules no agents at all.
    pub fn is_empty(&self) -> bool {
        self.stages.iter().all(|s| s.agents.is_empty())
    }

    /// Whether any stage contains `agent`.
    pub fn contains(&self, agent: AgentName) -> bool {
        self.stages.iter().any(|s| s.agents.contains(&agent))
    }
}

/// Market snapshot for one symbol, shared between agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialData {
    /// Exchange symbol, e.g. "005930".
    pub symbol: String,
    /// Company display name.
    pub name: String,
    /// Last trade price.
    pub price: f64,
    /// Day-over-day percent change.
    pub change_pct: f64,
    /// Traded volume.
    pub volume: u64,
    /// Price-to-earnings ratio.
    pub per: Option<f64>,
    /// Price-to-book ratio.
    pub pbr: Option<f64>,
    /// Return on equity, percent.
    pub roe: Option<f64>,
    /// Market capitalization.
    pub market_cap: Option<f64>,
    /// Sector label.
    pub sector: Option<String>,
}

/// A news item after merging, dedup, and scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    /// Headline, Korean where translation applied.
    pub title: String,
    /// Canonical article URL; dedup key.
    pub url: String,
    /// Which source produced the item.
    pub origin: NewsOrigin,
    /// Publication time when known.
    pub published_at: Option<DateTime<Utc>>,
    /// Short body or summary.
    pub summary: Option<String>,
    /// Source-reported relevance in [0, 1].
    pub relevance: f64,
    /// Combined relevance/recency score used for ordering.
    pub score: f64,
}

/// Where a news item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsOrigin {
    /// The news knowledge graph.
    Graph,
    /// The real-time feed.
    Feed,
}

/// Five-point investment rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    StrongBuy,
    Buy,
    Neutral,
    Sell,
    StrongSell,
}

impl Rating {
    /// Korean display label.
    pub fn label_ko(&self) -> &'static str {
        match self {
            Rating::StrongBuy => "적극 매수",
            Rating::Buy => "매수",
            Rating::Neutral => "중립",
            Rating::Sell => "매도",
            Rating::StrongSell => "적극 매도",
        }
    }
}

/// Payload of the data agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialPayload {
    /// Fetched market snapshot.
    pub data: FinancialData,
    /// Pre-formatted one-line reply when the request qualified as simple.
    pub short_circuit_reply: Option<String>,
}

/// Payload of the news agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsPayload {
    /// Deduplicated items, highest score first.
    pub items: Vec<NewsItem>,
}

/// Payload of the analysis agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisPayload {
    /// Five-point rating.
    pub rating: Rating,
    /// Short rationale.
    pub rationale: String,
    /// Sources the judgement drew on.
    pub sources: Vec<String>,
    /// Mandatory investment disclaimer.
    pub disclaimer: String,
}

/// Payload of the knowledge agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgePayload {
    /// Generated explanation with example and caveat.
    pub explanation: String,
    /// The documents the explanation was grounded on.
    pub documents: Vec<RetrievedDoc>,
}

/// Chart kind selected by the visualization agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Line,
    Bar,
    Candlestick,
}

/// Payload of the visualization agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartPayload {
    /// Rendered PNG bytes.
    pub png: Vec<u8>,
    /// Caption describing the chart.
    pub caption: String,
    /// Chart kind that was rendered.
    pub kind: ChartKind,
}

/// Typed agent payloads, discriminated by agent name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "agent", rename_all = "snake_case")]
pub enum AgentPayload {
    Data(FinancialPayload),
    News(NewsPayload),
    Analysis(AnalysisPayload),
    Knowledge(KnowledgePayload),
    Visualization(ChartPayload),
}

impl AgentPayload {
    /// The agent this payload belongs to.
    pub fn agent(&self) -> AgentName {
        match self {
            AgentPayload::Data(_) => AgentName::Data,
            AgentPayload::News(_) => AgentName::News,
            AgentPayload::Analysis(_) => AgentName::Analysis,
            AgentPayload::Knowledge(_) => AgentName::Knowledge,
            AgentPayload::Visualization(_) => AgentName::Visualization,
        }
    }
}

/// Uniform per-agent result record; the executor needs no agent-specific
/// knowledge to collect these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentOutcome {
    /// Which agent produced this.
    pub agent: AgentName,
    /// Whether the agent succeeded.
    pub success: bool,
    /// Typed payload on success.
    pub payload: Option<AgentPayload>,
    /// Failure record otherwise.
    pub error: Option<Fault>,
    /// Wall-clock duration of the invocation.
    pub elapsed_ms: u64,
}

impl AgentOutcome {
    /// A successful outcome.
    pub fn success(agent: AgentName, payload: AgentPayload, elapsed_ms: u64) -> Self {
        Self {
            agent,
            success: true,
            payload: Some(payload),
            error: None,
            elapsed_ms,
        }
    }

    /// A failed outcome.
    pub fn failure(agent: AgentName, error: Fault, elapsed_ms: u64) -> Self {
        Self {
            agent,
            success: false,
            payload: None,
            error: Some(error),
            elapsed_ms,
        }
    }
}

/// Short-circuit marker set by the data agent on simple requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCircuit {
    /// Whether the short-circuit route is taken.
    pub active: bool,
    /// Pre-formatted reply to return as-is.
    pub reply: String,
}

/// Fused reply produced by the result combiner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombinedReply {
    /// Final synthesized text.
    pub reply: String,
    /// Agents cited, in presentation order.
    pub sources: Vec<String>,
}

/// Confidence letter grade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

/// Grade thresholds; a score at or above a bound earns the grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            a: 0.90,
            b: 0.75,
            c: 0.60,
            d: 0.45,
        }
    }
}

impl Grade {
    /// Derive a grade from a normalized confidence score.
    pub fn from_score(score: f64, thresholds: &ConfidenceThresholds) -> Self {
        if score >= thresholds.a {
            Grade::A
        } else if score >= thresholds.b {
            Grade::B
        } else if score >= thresholds.c {
            Grade::C
        } else if score >= thresholds.d {
            Grade::D
        } else {
            Grade::F
        }
    }
}

/// Per-dimension confidence subscores, each in 0..=25.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubScores {
    pub completeness: f64,
    pub consistency: f64,
    pub accuracy: f64,
    pub usefulness: f64,
}

impl SubScores {
    /// Sum of the four dimensions.
    pub fn total(&self) -> f64 {
        self.completeness + self.consistency + self.accuracy + self.usefulness
    }
}

/// Output of the confidence calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    /// Normalized score in [0, 1].
    pub score: f64,
    /// Derived letter grade.
    pub grade: Grade,
    /// Per-dimension subscores.
    pub subscores: SubScores,
    /// Quality warnings attached during scoring.
    pub warnings: Vec<String>,
}

/// Read-only view of the state handed to worker agents.
///
/// Agents are pure with respect to the state record; they see this snapshot
/// and return a payload, which the executor installs.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Original user query.
    pub query: String,
    /// Analyzer output, present once the analyzer has run.
    pub analysis: Option<QueryAnalysis>,
    /// Market data from an earlier stage, if any.
    pub financial_data: Option<FinancialData>,
}

/// The per-request state record carried through the graph.
#[derive(Debug)]
pub struct RequestState {
    /// Request id for observability.
    pub request_id: Uuid,
    /// Original user query.
    pub query: String,
    /// Conversation routing key.
    pub session_id: String,
    /// Observability key.
    pub user_id: String,
    /// Written by the query analyzer.
    pub analysis: Option<QueryAnalysis>,
    /// Written by the service planner.
    pub plan: Option<ExecutionPlan>,
    /// Written by the parallel executor, one entry per launched agent.
    pub agent_results: BTreeMap<AgentName, AgentOutcome>,
    /// Typed payloads shared between agents.
    pub financial_data: Option<FinancialData>,
    pub news_data: Option<NewsPayload>,
    pub analysis_result: Option<AnalysisPayload>,
    pub knowledge_context: Option<KnowledgePayload>,
    pub chart: Option<ChartPayload>,
    /// Set by the data agent on simple requests.
    pub short_circuit: Option<ShortCircuit>,
    /// Written by the result combiner.
    pub combined: Option<CombinedReply>,
    /// Written by the confidence calculator.
    pub confidence_report: Option<ConfidenceReport>,
    /// First failure recorded against the request.
    pub fault: Option<Fault>,
    /// Written by the responder; what the engine hands back to the caller.
    pub response: Option<Response>,
    /// Execution trace, appended by the graph runtime only.
    pub trace: Vec<NodeSpan>,
    /// Upstream cancellation signal, observed by in-flight agent tasks.
    pub cancel: CancellationToken,
}

impl RequestState {
    /// Create the state record for an incoming request.
    pub fn new(request: Request) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            query: request.query,
            session_id: request.session_id,
            user_id: request.user_id,
            analysis: None,
            plan: None,
            agent_results: BTreeMap::new(),
            financial_data: None,
            news_data: None,
            analysis_result: None,
            knowledge_context: None,
            chart: None,
            short_circuit: None,
            combined: None,
            confidence_report: None,
            fault: None,
            response: None,
            trace: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Attach the request's cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Read-only view for worker agents.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            query: self.query.clone(),
            analysis: self.analysis.clone(),
            financial_data: self.financial_data.clone(),
        }
    }

    /// Record a fault. The first fault wins; later ones are logged and
    /// dropped so the original cause survives to the responder.
    pub fn record_fault(&mut self, fault: Fault) {
        if let Some(existing) = &self.fault {
            tracing::debug!(
                kept = %existing.kind,
                dropped = %fault.kind,
                node = %fault.node,
                "fault already recorded, keeping the first"
            );
            return;
        }
        self.fault = Some(fault);
    }

    /// Install an agent outcome, first-write-wins, and distribute its typed
    /// payload into the shared fields other agents read.
    pub fn install_outcome(&mut self, outcome: AgentOutcome) {
        if self.agent_results.contains_key(&outcome.agent) {
            tracing::warn!(agent = %outcome.agent, "agent result already installed, ignoring");
            return;
        }
        if let Some(payload) = &outcome.payload {
            debug_assert_eq!(payload.agent(), outcome.agent, "payload tagged for another agent");
            match payload {
                AgentPayload::Data(p) => {
                    self.financial_data = Some(p.data.clone());
                    if let Some(reply) = &p.short_circuit_reply {
                        self.short_circuit = Some(ShortCircuit {
                            active: true,
                            reply: reply.clone(),
                        });
                    }
                }
                AgentPayload::News(p) => self.news_data = Some(p.clone()),
                AgentPayload::Analysis(p) => self.analysis_result = Some(p.clone()),
                AgentPayload::Knowledge(p) => self.knowledge_context = Some(p.clone()),
                AgentPayload::Visualization(p) => self.chart = Some(p.clone()),
            }
        }
        self.agent_results.insert(outcome.agent, outcome);
    }

    /// Whether the short-circuit route was taken.
    pub fn short_circuited(&self) -> bool {
        self.short_circuit.as_ref().is_some_and(|s| s.active)
    }

    /// Agents that reported failure, in canonical order.
    pub fn failed_agents(&self) -> Vec<AgentName> {
        self.agent_results
            .values()
            .filter(|o| !o.success)
            .map(|o| o.agent)
            .collect()
    }

    /// The intent classified for this request, defaulting to general.
    pub fn intent(&self) -> Intent {
        self.analysis
            .as_ref()
            .map(|a| a.primary_intent)
            .unwrap_or(Intent::General)
    }
}

impl FlowState for RequestState {
    fn note_failure(&mut self, node: &str, message: &str) {
        self.record_fault(Fault::fatal(ErrorKind::Internal, node, message));
    }

    fn fault_pending(&self) -> bool {
        self.fault.as_ref().is_some_and(|f| !f.recoverable)
    }

    fn record_span(&mut self, span: NodeSpan) {
        self.trace.push(span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_financial() -> FinancialData {
        FinancialData {
            symbol: "005930".into(),
            name: "삼성전자".into(),
            price: 71_500.0,
            change_pct: 2.1,
            volume: 12_345_678,
            per: Some(13.2),
            pbr: Some(1.4),
            roe: Some(9.8),
            market_cap: Some(4.2e14),
            sector: Some("전기전자".into()),
        }
    }

    #[test]
    fn outcome_installation_is_first_write_wins() {
        let mut state = RequestState::new(Request::new("q", "s", "u"));
        let first = AgentOutcome::success(
            AgentName::Data,
            AgentPayload::Data(FinancialPayload {
                data: sample_financial(),
                short_circuit_reply: None,
            }),
            5,
        );
        let second = AgentOutcome::failure(
            AgentName::Data,
            Fault::recoverable(ErrorKind::Timeout, "data", "late"),
            9,
        );

        state.install_outcome(first);
        state.install_outcome(second);

        let kept = &state.agent_results[&AgentName::Data];
        assert!(kept.success);
        assert_eq!(kept.elapsed_ms, 5);
    }

    #[test]
    fn data_payload_distributes_short_circuit() {
        let mut state = RequestState::new(Request::new("q", "s", "u"));
        state.install_outcome(AgentOutcome::success(
            AgentName::Data,
            AgentPayload::Data(FinancialPayload {
                data: sample_financial(),
                short_circuit_reply: Some("삼성전자: 71,500원 (+2.1%)".into()),
            }),
            5,
        ));

        assert!(state.short_circuited());
        assert!(state.financial_data.is_some());
    }

    #[test]
    fn first_fault_survives() {
        let mut state = RequestState::new(Request::new("q", "s", "u"));
        state.record_fault(Fault::fatal(ErrorKind::SymbolNotFound, "data", "no symbol"));
        state.record_fault(Fault::fatal(ErrorKind::Internal, "combiner", "later"));

        assert_eq!(state.fault.as_ref().unwrap().kind, ErrorKind::SymbolNotFound);
        assert!(state.fault_pending());
    }

    #[test]
    fn grade_thresholds_match_the_table() {
        let t = ConfidenceThresholds::default();
        assert_eq!(Grade::from_score(0.95, &t), Grade::A);
        assert_eq!(Grade::from_score(0.90, &t), Grade::A);
        assert_eq!(Grade::from_score(0.89, &t), Grade::B);
        assert_eq!(Grade::from_score(0.75, &t), Grade::B);
        assert_eq!(Grade::from_score(0.60, &t), Grade::C);
        assert_eq!(Grade::from_score(0.45, &t), Grade::D);
        assert_eq!(Grade::from_score(0.44, &t), Grade::F);
    }

    #[test]
    fn agent_payload_tag_matches_agent_name() {
        let payload = AgentPayload::Knowledge(KnowledgePayload {
            explanation: "PER은 주가수익비율".into(),
            documents: vec![],
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["agent"], "knowledge");
    }
}
