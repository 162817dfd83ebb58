//! End-to-end scenarios against scripted collaborators.
//!
//! These tests drive the whole graph through the public engine surface:
//! classification, planning, staged execution, combination, scoring, and
//! response packing, with every collaborator faked.

use std::sync::Arc;
use std::time::{Duration, Instant};

use orchestrator::testing::{
    healthy_capabilities, CollectingTracer, EmptySymbolTable, FakeMarketData, FakeNewsFeed,
    ScriptedLanguageModel,
};
use orchestrator::{
    ActionType, Capabilities, Engine, Grade, OrchestratorConfig, Request,
};
use tokio_util::sync::CancellationToken;

const SIMPLE_DATA_CLASSIFICATION: &str = r#"{"primary_intent": "data", "complexity": "simple",
    "required_agents": ["data"], "confidence": 0.92, "is_investment": false}"#;

const COMPLEX_ANALYSIS_CLASSIFICATION: &str = r#"{"primary_intent": "analysis", "complexity": "complex",
    "required_agents": ["data", "analysis", "news"], "confidence": 0.88, "is_investment": true}"#;

const KNOWLEDGE_CLASSIFICATION: &str = r#"{"primary_intent": "knowledge", "complexity": "simple",
    "required_agents": ["knowledge"], "confidence": 0.9, "is_investment": false}"#;

fn engine_with(caps: Capabilities, config: OrchestratorConfig) -> Engine {
    Engine::new(caps, config).expect("graph must build")
}

fn request(query: &str) -> Request {
    Request::new(query, "session-1", "user-1")
}

#[tokio::test]
async fn s1_simple_data_short_circuit() {
    let tracer = Arc::new(CollectingTracer::default());
    let mut caps = healthy_capabilities();
    caps.language_model =
        Arc::new(ScriptedLanguageModel::new().with_classification(SIMPLE_DATA_CLASSIFICATION));
    caps.tracer = tracer.clone();
    let engine = engine_with(caps, OrchestratorConfig::default());

    let response = engine.orchestrate(request("삼성전자 주가 알려줘")).await;

    assert_eq!(response.action_type, ActionType::Data);
    assert!(response.reply.contains("71,500"), "reply: {}", response.reply);
    assert!(response.reply.contains("+2.1%"), "reply: {}", response.reply);
    assert!(response.confidence >= 0.75);

    // Only the four short-circuit nodes appear in the trace.
    assert_eq!(
        tracer.nodes(),
        vec![
            "query_analyzer",
            "service_planner",
            "parallel_executor",
            "responder",
        ]
    );
}

#[tokio::test]
async fn s2_parallel_analysis_cites_all_sources() {
    let mut caps = healthy_capabilities();
    caps.language_model = Arc::new(
        ScriptedLanguageModel::new()
            .with_classification(COMPLEX_ANALYSIS_CLASSIFICATION)
            .with_judgement(r#"{"rating": "buy", "rationale": "커머스 회복과 실적 개선."}"#),
    );
    let engine = engine_with(caps, OrchestratorConfig::default());

    let response = engine
        .orchestrate(request("네이버 투자 분석하고 최근 뉴스도 알려줘"))
        .await;

    assert_eq!(response.action_type, ActionType::Analysis);
    assert!(response.confidence >= 0.75);
    // The default synthesis echoes the tagged sections, so the reply must
    // carry the data, analysis, and news contributions.
    assert!(response.reply.contains("[data]"));
    assert!(response.reply.contains("[analysis]"));
    assert!(response.reply.contains("[news]"));
    assert!(response.reply.contains("매수"));
    assert!(
        response.reply.contains("투자 판단의 최종 책임"),
        "disclaimer must survive synthesis"
    );
}

#[tokio::test]
async fn s3_knowledge_only_runs_a_single_worker() {
    let market = Arc::new(FakeMarketData::default());
    let feed = Arc::new(FakeNewsFeed::default());
    let mut caps = healthy_capabilities();
    caps.language_model =
        Arc::new(ScriptedLanguageModel::new().with_classification(KNOWLEDGE_CLASSIFICATION));
    caps.market_data = market.clone();
    caps.news_feed = feed.clone();
    let engine = engine_with(caps, OrchestratorConfig::default());

    let response = engine.orchestrate(request("PER이 뭐야?")).await;

    assert_eq!(response.action_type, ActionType::Knowledge);
    assert!(response.reply.contains("주가수익비율"), "reply: {}", response.reply);
    assert_eq!(response.retrieved_documents.len(), 1);
    assert!(response.retrieved_documents[0].score >= 0.8);
    // No other worker agent was consulted.
    assert_eq!(market.quote_calls(), 0);
    assert_eq!(feed.fetch_calls(), 0);
}

#[tokio::test]
async fn s4_required_agent_failure_is_an_error() {
    let tracer = Arc::new(CollectingTracer::default());
    let mut caps = healthy_capabilities();
    caps.language_model =
        Arc::new(ScriptedLanguageModel::new().with_classification(SIMPLE_DATA_CLASSIFICATION));
    caps.market_data = Arc::new(FakeMarketData::not_found());
    caps.tracer = tracer.clone();
    let engine = engine_with(caps, OrchestratorConfig::default());

    let response = engine.orchestrate(request("삼성전자 주가 알려줘")).await;

    assert_eq!(response.action_type, ActionType::Error);
    assert_eq!(response.grade, Grade::F);
    assert_eq!(response.confidence, 0.0);
    assert!(response.reply.contains("죄송"), "reply: {}", response.reply);
    // Internal failure details never leak.
    assert!(!response.reply.contains("unknown symbol"));

    let nodes = tracer.nodes();
    let handler_pos = nodes.iter().position(|n| n == "error_handler").unwrap();
    let responder_pos = nodes.iter().position(|n| n == "responder").unwrap();
    assert!(handler_pos < responder_pos);
}

#[tokio::test]
async fn s5_optional_agent_timeout_is_absorbed() {
    let mut caps = healthy_capabilities();
    caps.language_model = Arc::new(
        ScriptedLanguageModel::new()
            .with_classification(COMPLEX_ANALYSIS_CLASSIFICATION)
            .with_scores(r#"{"completeness": 18, "consistency": 18, "accuracy": 17, "usefulness": 18}"#),
    );
    caps.news_feed = Arc::new(FakeNewsFeed::stalling(Duration::from_secs(30)));
    let config = OrchestratorConfig::default()
        .with_agent_timeout(orchestrator::AgentName::News, Duration::from_millis(150));
    let engine = engine_with(caps, config);

    let started = Instant::now();
    let response = engine.orchestrate(request("카카오 분석")).await;

    // The stalled feed never blocks the request beyond the news deadline.
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(response.action_type, ActionType::Analysis);
    assert!(response.grade != Grade::F);
    assert!(response.confidence >= 0.60, "confidence: {}", response.confidence);
}

#[tokio::test]
async fn s6_empty_query_fails_fast() {
    let market = Arc::new(FakeMarketData::default());
    let mut caps = healthy_capabilities();
    caps.market_data = market.clone();
    let engine = engine_with(caps, OrchestratorConfig::default());

    let response = engine.orchestrate(request("   ")).await;

    assert_eq!(response.action_type, ActionType::Error);
    assert_eq!(response.grade, Grade::F);
    assert!(response.reply.chars().count() < 200);
    assert_eq!(market.quote_calls(), 0, "no worker agent may run");
}

#[tokio::test]
async fn symbol_miss_without_table_is_an_error() {
    let mut caps = healthy_capabilities();
    caps.language_model =
        Arc::new(ScriptedLanguageModel::new().with_classification(SIMPLE_DATA_CLASSIFICATION));
    caps.symbols = Arc::new(EmptySymbolTable);
    let engine = engine_with(caps, OrchestratorConfig::default());

    let response = engine.orchestrate(request("모르는종목 주가")).await;
    assert_eq!(response.action_type, ActionType::Error);
    assert_eq!(response.grade, Grade::F);
}

#[tokio::test]
async fn classifier_outage_still_answers_via_keyword_fallback() {
    let tracer = Arc::new(CollectingTracer::default());
    let mut caps = healthy_capabilities();
    // Every model call fails: classification falls back to keywords, the
    // combiner falls back to the template, the scorer to 0.5/C.
    caps.language_model = Arc::new(ScriptedLanguageModel::failing());
    caps.tracer = tracer.clone();
    let engine = engine_with(caps, OrchestratorConfig::default());

    let response = engine.orchestrate(request("삼성전자 주가 알려줘")).await;

    // Keyword fallback classifies this as simple data, so the
    // short-circuit still applies with no model at all.
    assert_eq!(response.action_type, ActionType::Data);
    assert!(response.reply.contains("71,500"));
    assert!(response.confidence >= 0.75);
}

#[tokio::test]
async fn cancellation_mid_request_yields_an_error_promptly() {
    let mut caps = healthy_capabilities();
    caps.language_model =
        Arc::new(ScriptedLanguageModel::new().with_classification(SIMPLE_DATA_CLASSIFICATION));
    caps.market_data = Arc::new(FakeMarketData::default().with_delay(Duration::from_secs(30)));
    let engine = Arc::new(engine_with(caps, OrchestratorConfig::default()));

    let cancel = CancellationToken::new();
    let run = {
        let engine = engine.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            engine
                .orchestrate_with_cancellation(request("삼성전자 주가 알려줘"), cancel)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    cancel.cancel();
    let response = run.await.expect("task join");

    assert!(started.elapsed() < Duration::from_secs(5), "cancellation must be prompt");
    assert_eq!(response.action_type, ActionType::Error);
    assert_eq!(response.grade, Grade::F);
}

#[tokio::test]
async fn concurrent_requests_share_the_engine() {
    let mut caps = healthy_capabilities();
    caps.language_model =
        Arc::new(ScriptedLanguageModel::new().with_classification(SIMPLE_DATA_CLASSIFICATION));
    let engine = Arc::new(engine_with(caps, OrchestratorConfig::default()));

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            engine
                .orchestrate(Request::new("삼성전자 주가 알려줘", format!("s-{i}"), "u"))
                .await
        }));
    }
    for handle in handles {
        let response = handle.await.expect("task join");
        assert_eq!(response.action_type, ActionType::Data);
        assert!((0.0..=1.0).contains(&response.confidence));
    }
}
