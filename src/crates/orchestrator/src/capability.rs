//! Collaborator capability traits.
//!
//! The orchestrator performs no external I/O itself; every collaborator is
//! a narrow trait object injected through [`Capabilities`] at engine
//! construction. Any implementation satisfying a trait is acceptable, which
//! is what makes the engine deterministic under test fakes.
//!
//! All clients behind these traits are shared across concurrent requests
//! and must be safe for concurrent use; the orchestrator adds no locking
//! around them.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stategraph::NodeSpan;

use crate::error::CapabilityResult;
use crate::state::{ChartKind, RetrievedDoc};

/// A resolved ticker symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    /// Exchange code, e.g. "005930".
    pub code: String,
    /// Company display name, e.g. "삼성전자".
    pub name: String,
}

/// Market snapshot returned by [`MarketData::quote`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub change_pct: f64,
    pub volume: u64,
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub roe: Option<f64>,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
}

/// One OHLCV bar from [`MarketData::history`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub at: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Price series handed to the chart renderer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Series {
    /// Symbol the series belongs to.
    pub symbol: String,
    /// Display label for the chart title.
    pub label: String,
    /// Bars in ascending time order.
    pub points: Vec<PricePoint>,
}

/// An article returned by the news knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    /// Embedding-similarity score in [0, 1].
    pub score: f64,
}

/// An item returned by the real-time news feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
    /// ISO 639-1 language code of the item.
    pub language: String,
    pub body: String,
}

/// Chat-completion language model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete a system/user prompt pair into text.
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> CapabilityResult<String>;
}

/// Ticker symbol lookup table.
pub trait SymbolLookup: Send + Sync {
    /// Find a symbol mentioned in free-form text.
    fn resolve(&self, text: &str) -> Option<Symbol>;
}

/// Real-time market data client.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Current quote for a symbol.
    async fn quote(&self, symbol: &str) -> CapabilityResult<Quote>;

    /// Daily OHLCV history for the trailing `days`.
    async fn history(&self, symbol: &str, days: u32) -> CapabilityResult<Vec<PricePoint>>;
}

/// Vector-database semantic search.
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Top-k search with a minimum similarity score.
    async fn search(
        &self,
        text: &str,
        top_k: usize,
        min_score: f64,
    ) -> CapabilityResult<Vec<RetrievedDoc>>;
}

/// News knowledge graph queried by embedding similarity.
#[async_trait]
pub trait NewsGraph: Send + Sync {
    /// Embed text into the graph's vector space.
    async fn embed(&self, text: &str) -> CapabilityResult<Vec<f32>>;

    /// Articles similar to the embedding.
    async fn similar(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_score: f64,
    ) -> CapabilityResult<Vec<Article>>;
}

/// Real-time RSS/news fetcher.
#[async_trait]
pub trait NewsFeed: Send + Sync {
    /// Fetch up to `limit` items matching the keywords.
    async fn fetch(&self, keywords: &[String], limit: usize) -> CapabilityResult<Vec<FeedItem>>;
}

/// Text translator.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate text into the target language (ISO 639-1).
    async fn translate(&self, text: &str, target_lang: &str) -> CapabilityResult<String>;
}

/// Chart renderer.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    /// Render a series as a PNG.
    async fn render(&self, series: &Series, kind: ChartKind) -> CapabilityResult<Vec<u8>>;
}

/// Observability sink for execution spans. Must be non-blocking and must
/// never fail; implementations swallow their own errors.
pub trait Tracer: Send + Sync {
    /// Emit one span.
    fn emit(&self, span: &NodeSpan);
}

/// Tracer that drops every span.
#[derive(Debug, Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn emit(&self, _span: &NodeSpan) {}
}

/// The injected collaborator set, shared by all requests of an engine.
#[derive(Clone)]
pub struct Capabilities {
    pub language_model: Arc<dyn LanguageModel>,
    pub symbols: Arc<dyn SymbolLookup>,
    pub market_data: Arc<dyn MarketData>,
    pub semantic_index: Arc<dyn SemanticIndex>,
    pub news_graph: Arc<dyn NewsGraph>,
    pub news_feed: Arc<dyn NewsFeed>,
    pub translator: Arc<dyn Translator>,
    pub chart_renderer: Arc<dyn ChartRenderer>,
    pub tracer: Arc<dyn Tracer>,
}

impl Capabilities {
    /// Swap in a tracer.
    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
