//! Query analyzer: classify the query into intent, complexity, and the set
//! of agents to consult.
//!
//! The language model is the primary classifier; a deterministic keyword
//! classifier takes over when the model is unavailable or its output stays
//! malformed after the tolerant re-parse.

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::error::{ErrorKind, Fault};
use crate::parse::parse_llm_json;
use crate::state::{
    AgentName, Complexity, Intent, QueryAnalysis, RequestState, MAX_QUERY_CHARS,
};

pub(crate) const NODE: &str = "query_analyzer";

const CLASSIFIER_SYSTEM: &str = "당신은 금융 질의 분류기입니다. 사용자 질문을 분석해 JSON 객체 하나만 출력하세요. \
스키마: {\"primary_intent\": \"data|analysis|news|knowledge|visualization|general\", \
\"complexity\": \"simple|moderate|complex\", \
\"required_agents\": [\"data\"|\"analysis\"|\"news\"|\"knowledge\"|\"visualization\"], \
\"confidence\": 0.0-1.0, \"is_investment\": true|false}. \
JSON 외의 텍스트를 출력하지 마세요.";

/// Shape the model is asked to produce. Everything is optional so one
/// missing field does not discard an otherwise usable classification.
#[derive(Debug, Deserialize)]
struct RawClassification {
    primary_intent: Option<String>,
    complexity: Option<String>,
    required_agents: Option<Vec<String>>,
    confidence: Option<f64>,
    is_investment: Option<bool>,
}

/// Run the analyzer against the state record.
pub(crate) async fn run(state: &mut RequestState, ctx: &Context) {
    let query = state.query.trim().to_string();
    if query.is_empty() {
        state.record_fault(Fault::fatal(ErrorKind::InvalidInput, NODE, "empty query"));
        return;
    }
    if state.query.chars().count() > MAX_QUERY_CHARS {
        state.record_fault(Fault::fatal(
            ErrorKind::InvalidInput,
            NODE,
            format!("query exceeds {MAX_QUERY_CHARS} chars"),
        ));
        return;
    }

    let analysis = match classify_with_model(&query, ctx).await {
        Some(analysis) => analysis,
        None => {
            info!(request_id = %state.request_id, "model classification unavailable, using keyword fallback");
            classify_by_keywords(&query)
        }
    };

    debug!(
        request_id = %state.request_id,
        intent = ?analysis.primary_intent,
        complexity = ?analysis.complexity,
        agents = analysis.required_agents.len(),
        "query classified"
    );
    state.analysis = Some(analysis);
}

async fn classify_with_model(query: &str, ctx: &Context) -> Option<QueryAnalysis> {
    let response = match ctx
        .caps
        .language_model
        .complete(CLASSIFIER_SYSTEM, query, 0.0, 512)
        .await
    {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "classifier model call failed");
            return None;
        }
    };

    let raw: RawClassification = parse_llm_json(&response)?;
    Some(normalize(raw, query))
}

/// Coerce a raw model classification into a valid [`QueryAnalysis`]:
/// unknown intents become general, confidence clamps to [0, 1], the agent
/// set is forced consistent with the intent.
fn normalize(raw: RawClassification, query: &str) -> QueryAnalysis {
    let primary_intent = raw
        .primary_intent
        .as_deref()
        .map(parse_intent)
        .unwrap_or(Intent::General);

    let complexity = match raw.complexity.as_deref() {
        Some("simple") => Complexity::Simple,
        Some("complex") => Complexity::Complex,
        Some("moderate") => Complexity::Moderate,
        Some(other) => {
            debug!(value = other, "unknown complexity, coercing to moderate");
            Complexity::Moderate
        }
        None => Complexity::Moderate,
    };

    let mut required_agents: Vec<AgentName> = Vec::new();
    for name in raw.required_agents.unwrap_or_default() {
        if let Ok(agent) = name.parse::<AgentName>() {
            if !required_agents.contains(&agent) {
                required_agents.push(agent);
            }
        }
    }

    let confidence = raw.confidence.unwrap_or(0.5).clamp(0.0, 1.0);
    let is_investment = raw.is_investment.unwrap_or(false) || mentions_investment(query);

    finish(primary_intent, complexity, required_agents, confidence, is_investment)
}

fn parse_intent(s: &str) -> Intent {
    match s {
        "data" => Intent::Data,
        "analysis" => Intent::Analysis,
        "news" => Intent::News,
        "knowledge" => Intent::Knowledge,
        "visualization" => Intent::Visualization,
        "general" => Intent::General,
        other => {
            debug!(value = other, "unknown intent, coercing to general");
            Intent::General
        }
    }
}

/// Deterministic keyword classification over Korean and English terms.
pub(crate) fn classify_by_keywords(query: &str) -> QueryAnalysis {
    let lower = query.to_lowercase();
    let has = |terms: &[&str]| terms.iter().any(|t| lower.contains(t));

    let wants_price = has(&["주가", "가격", "시세", "얼마", "price", "quote"]);
    let wants_analysis = has(&["분석", "전망", "평가", "analysis", "analyze", "outlook"]);
    let wants_news = has(&["뉴스", "소식", "기사", "news"]);
    let wants_knowledge = has(&[
        "뭐야", "무엇", "이란", "란?", "의미", "설명", "what is", "meaning", "explain",
    ]);
    let wants_chart = has(&["차트", "그래프", "chart", "graph"]);
    let is_investment = mentions_investment(query);

    let primary_intent = if wants_analysis || is_investment {
        Intent::Analysis
    } else if wants_chart {
        Intent::Visualization
    } else if wants_price {
        Intent::Data
    } else if wants_news {
        Intent::News
    } else if wants_knowledge {
        Intent::Knowledge
    } else {
        Intent::General
    };

    let mut required_agents = Vec::new();
    if wants_price || wants_analysis || wants_chart || is_investment {
        required_agents.push(AgentName::Data);
    }
    if wants_analysis || is_investment {
        required_agents.push(AgentName::Analysis);
    }
    if wants_news {
        required_agents.push(AgentName::News);
    }
    if wants_knowledge {
        required_agents.push(AgentName::Knowledge);
    }
    if wants_chart {
        required_agents.push(AgentName::Visualization);
    }

    let complexity = match required_agents.len() {
        0 | 1 => Complexity::Simple,
        2 => Complexity::Moderate,
        _ => Complexity::Complex,
    };

    finish(primary_intent, complexity, required_agents, 0.6, is_investment)
}

fn mentions_investment(query: &str) -> bool {
    let lower = query.to_lowercase();
    ["투자", "매수", "매도", "살까", "팔까", "invest", "buy", "sell"]
        .iter()
        .any(|t| lower.contains(t))
}

/// Apply the cross-field consistency rules shared by both classifiers.
fn finish(
    primary_intent: Intent,
    complexity: Complexity,
    mut required_agents: Vec<AgentName>,
    confidence: f64,
    is_investment: bool,
) -> QueryAnalysis {
    // Non-general intents always involve at least their own agent.
    let own_agent = match primary_intent {
        Intent::Data => Some(AgentName::Data),
        Intent::Analysis => Some(AgentName::Analysis),
        Intent::News => Some(AgentName::News),
        Intent::Knowledge => Some(AgentName::Knowledge),
        Intent::Visualization => Some(AgentName::Visualization),
        Intent::General => None,
    };
    if let Some(agent) = own_agent {
        if !required_agents.contains(&agent) {
            required_agents.push(agent);
        }
    }
    // Agents that consume market data pull the data agent in.
    if let Some(dep) = primary_intent.required_agent() {
        if !required_agents.contains(&dep) {
            required_agents.insert(0, dep);
        }
    }

    // The first dispatch follows plan ordering: data leads when present.
    let next_agent = if required_agents.contains(&AgentName::Data) {
        Some(AgentName::Data)
    } else {
        required_agents.first().copied()
    };

    QueryAnalysis {
        primary_intent,
        complexity,
        required_agents,
        confidence,
        is_investment,
        next_agent,
    }
}
