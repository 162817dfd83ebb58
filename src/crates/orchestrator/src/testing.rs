//! Test support: in-memory fakes for every capability.
//!
//! The fakes make the engine fully deterministic: scripted model output,
//! static symbol tables, canned market data. They are used by this crate's
//! own tests and are public so embedders can drive the engine hermetically
//! in theirs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use stategraph::NodeSpan;

use crate::capability::{
    Article, Capabilities, ChartRenderer, FeedItem, LanguageModel, MarketData, NewsFeed,
    NewsGraph, NoopTracer, PricePoint, Quote, SemanticIndex, Series, Symbol, SymbolLookup,
    Tracer, Translator,
};
use crate::error::{CapabilityError, CapabilityResult};
use crate::state::{ChartKind, RetrievedDoc};

/// Language model that routes on the system prompt's role keywords and
/// replies with scripted text.
#[derive(Default)]
pub struct ScriptedLanguageModel {
    /// Reply for the query-classifier role.
    pub classification: Option<String>,
    /// Reply for the analyst-judgement role.
    pub judgement: Option<String>,
    /// Reply for the synthesis role.
    pub synthesis: Option<String>,
    /// Reply for the knowledge-explainer role.
    pub explanation: Option<String>,
    /// Reply for the scoring role.
    pub scores: Option<String>,
    /// When set, every call fails with a transient error.
    pub fail: bool,
    calls: AtomicUsize,
}

impl ScriptedLanguageModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn with_classification(mut self, json: impl Into<String>) -> Self {
        self.classification = Some(json.into());
        self
    }

    pub fn with_judgement(mut self, json: impl Into<String>) -> Self {
        self.judgement = Some(json.into());
        self
    }

    pub fn with_synthesis(mut self, text: impl Into<String>) -> Self {
        self.synthesis = Some(text.into());
        self
    }

    pub fn with_explanation(mut self, text: impl Into<String>) -> Self {
        self.explanation = Some(text.into());
        self
    }

    pub fn with_scores(mut self, json: impl Into<String>) -> Self {
        self.scores = Some(json.into());
        self
    }

    /// Number of completions served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedLanguageModel {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        _temperature: f64,
        _max_tokens: u32,
    ) -> CapabilityResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CapabilityError::Transient("model unavailable".into()));
        }

        let reply = if system.contains("분류기") {
            self.classification.clone().unwrap_or_else(|| {
                r#"{"primary_intent": "general", "complexity": "simple", "required_agents": [], "confidence": 0.5, "is_investment": false}"#.to_string()
            })
        } else if system.contains("애널리스트") {
            self.judgement.clone().unwrap_or_else(|| {
                r#"{"rating": "neutral", "rationale": "시세와 자료를 종합하면 중립 의견입니다."}"#.to_string()
            })
        } else if system.contains("평가자") {
            self.scores.clone().unwrap_or_else(|| {
                r#"{"completeness": 22, "consistency": 21, "accuracy": 20, "usefulness": 22}"#.to_string()
            })
        } else if system.contains("지식 도우미") {
            self.explanation
                .clone()
                .unwrap_or_else(|| format!("요청하신 내용 설명: {user}"))
        } else {
            self.synthesis
                .clone()
                .unwrap_or_else(|| format!("종합 답변입니다.\n{user}"))
        };
        Ok(reply)
    }
}

/// Static symbol table over well-known Korean tickers.
pub struct StaticSymbolTable {
    entries: Vec<Symbol>,
}

impl Default for StaticSymbolTable {
    fn default() -> Self {
        Self {
            entries: vec![
                Symbol { code: "005930".into(), name: "삼성전자".into() },
                Symbol { code: "035420".into(), name: "네이버".into() },
                Symbol { code: "035720".into(), name: "카카오".into() },
            ],
        }
    }
}

impl SymbolLookup for StaticSymbolTable {
    fn resolve(&self, text: &str) -> Option<Symbol> {
        self.entries
            .iter()
            .find(|s| text.contains(s.name.as_str()) || text.contains(s.code.as_str()))
            .cloned()
    }
}

/// Symbol table that never resolves anything.
pub struct EmptySymbolTable;

impl SymbolLookup for EmptySymbolTable {
    fn resolve(&self, _text: &str) -> Option<Symbol> {
        None
    }
}

/// Market data with a canned quote and generated daily bars.
pub struct FakeMarketData {
    pub quote: Quote,
    /// When set, `quote` fails with this error instead.
    pub quote_error: Option<CapabilityError>,
    /// Artificial latency before answering.
    pub delay: Option<Duration>,
    quote_calls: AtomicUsize,
}

impl Default for FakeMarketData {
    fn default() -> Self {
        Self {
            quote: Quote {
                price: 71_500.0,
                change_pct: 2.1,
                volume: 12_345_678,
                per: Some(13.2),
                pbr: Some(1.4),
                roe: Some(9.8),
                market_cap: Some(4.2e14),
                sector: Some("전기전자".into()),
            },
            quote_error: None,
            delay: None,
            quote_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeMarketData {
    pub fn not_found() -> Self {
        Self {
            quote_error: Some(CapabilityError::NotFound("unknown symbol".into())),
            ..Self::default()
        }
    }

    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of quote fetches served so far.
    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketData for FakeMarketData {
    async fn quote(&self, _symbol: &str) -> CapabilityResult<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.quote_error {
            Some(e) => Err(e.clone()),
            None => Ok(self.quote.clone()),
        }
    }

    async fn history(&self, _symbol: &str, days: u32) -> CapabilityResult<Vec<PricePoint>> {
        let now = Utc::now();
        Ok((0..days)
            .rev()
            .map(|d| {
                let base = self.quote.price * (1.0 - 0.001 * d as f64);
                PricePoint {
                    at: now - ChronoDuration::days(d as i64),
                    open: base * 0.995,
                    high: base * 1.01,
                    low: base * 0.99,
                    close: base,
                    volume: self.quote.volume,
                }
            })
            .collect())
    }
}

/// Semantic index over a fixed document list.
#[derive(Default)]
pub struct FakeSemanticIndex {
    pub documents: Vec<RetrievedDoc>,
}

impl FakeSemanticIndex {
    pub fn with_documents(documents: Vec<RetrievedDoc>) -> Self {
        Self { documents }
    }
}

#[async_trait]
impl SemanticIndex for FakeSemanticIndex {
    async fn search(
        &self,
        _text: &str,
        top_k: usize,
        min_score: f64,
    ) -> CapabilityResult<Vec<RetrievedDoc>> {
        Ok(self
            .documents
            .iter()
            .filter(|d| d.score >= min_score)
            .take(top_k)
            .cloned()
            .collect())
    }
}

/// News graph over a fixed article list.
#[derive(Default)]
pub struct FakeNewsGraph {
    pub articles: Vec<Article>,
}

#[async_trait]
impl NewsGraph for FakeNewsGraph {
    async fn embed(&self, _text: &str) -> CapabilityResult<Vec<f32>> {
        Ok(vec![0.1; 8])
    }

    async fn similar(
        &self,
        _embedding: &[f32],
        top_k: usize,
        min_score: f64,
    ) -> CapabilityResult<Vec<Article>> {
        Ok(self
            .articles
            .iter()
            .filter(|a| a.score >= min_score)
            .take(top_k)
            .cloned()
            .collect())
    }
}

/// Feed over a fixed item list, with an optional stall for timeout tests.
#[derive(Default)]
pub struct FakeNewsFeed {
    pub items: Vec<FeedItem>,
    /// Sleep this long before answering.
    pub stall: Option<Duration>,
    fetch_calls: AtomicUsize,
}

impl FakeNewsFeed {
    pub fn stalling(stall: Duration) -> Self {
        Self {
            stall: Some(stall),
            ..Self::default()
        }
    }

    /// Number of fetches started so far.
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NewsFeed for FakeNewsFeed {
    async fn fetch(&self, _keywords: &[String], limit: usize) -> CapabilityResult<Vec<FeedItem>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}

/// Translator that marks output instead of translating.
pub struct FakeTranslator;

#[async_trait]
impl Translator for FakeTranslator {
    async fn translate(&self, text: &str, _target_lang: &str) -> CapabilityResult<String> {
        Ok(format!("[번역] {text}"))
    }
}

/// Renderer producing a minimal PNG header, or failing on demand.
#[derive(Default)]
pub struct FakeChartRenderer {
    pub fail: bool,
}

#[async_trait]
impl ChartRenderer for FakeChartRenderer {
    async fn render(&self, _series: &Series, _kind: ChartKind) -> CapabilityResult<Vec<u8>> {
        if self.fail {
            return Err(CapabilityError::Permanent("render backend down".into()));
        }
        Ok(vec![0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'])
    }
}

/// Tracer that collects spans for assertions.
#[derive(Default)]
pub struct CollectingTracer {
    spans: Mutex<Vec<NodeSpan>>,
}

impl CollectingTracer {
    pub fn nodes(&self) -> Vec<String> {
        self.spans
            .lock()
            .expect("tracer lock poisoned")
            .iter()
            .map(|s| s.node.clone())
            .collect()
    }
}

impl Tracer for CollectingTracer {
    fn emit(&self, span: &NodeSpan) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.push(span.clone());
        }
    }
}

/// A capability set where every collaborator answers successfully.
pub fn healthy_capabilities() -> Capabilities {
    Capabilities {
        language_model: Arc::new(ScriptedLanguageModel::new()),
        symbols: Arc::new(StaticSymbolTable::default()),
        market_data: Arc::new(FakeMarketData::default()),
        semantic_index: Arc::new(FakeSemanticIndex::with_documents(vec![RetrievedDoc {
            source: "glossary".into(),
            score: 0.83,
            snippet: "PER(주가수익비율)은 주가를 주당순이익으로 나눈 값입니다.".into(),
        }])),
        news_graph: Arc::new(FakeNewsGraph {
            articles: vec![Article {
                title: "반도체 업황 회복 조짐".into(),
                url: "https://news.example/1".into(),
                published_at: Some(Utc::now() - ChronoDuration::hours(3)),
                summary: Some("업황 개선 기대".into()),
                score: 0.8,
            }],
        }),
        news_feed: Arc::new(FakeNewsFeed {
            items: vec![FeedItem {
                title: "Chip exports rebound".into(),
                url: "https://feed.example/1".into(),
                published_at: Some(Utc::now() - ChronoDuration::hours(30)),
                language: "en".into(),
                body: "Exports grew for the second month.".into(),
            }],
            ..FakeNewsFeed::default()
        }),
        translator: Arc::new(FakeTranslator),
        chart_renderer: Arc::new(FakeChartRenderer::default()),
        tracer: Arc::new(NoopTracer),
    }
}
