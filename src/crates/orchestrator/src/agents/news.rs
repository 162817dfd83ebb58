//! News agent: merge the knowledge-graph store and the real-time feed,
//! deduplicate, score, and rank.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::capability::Capabilities;
use crate::config::OrchestratorConfig;
use crate::error::{CapabilityError, Fault};
use crate::state::{AgentName, AgentPayload, NewsItem, NewsOrigin, NewsPayload, Snapshot};

use super::WorkerAgent;

/// Relevance assumed for feed items, which carry no similarity score.
const FEED_RELEVANCE: f64 = 0.5;

pub(crate) struct NewsAgent;

#[async_trait]
impl WorkerAgent for NewsAgent {
    fn name(&self) -> AgentName {
        AgentName::News
    }

    async fn process(
        &self,
        snapshot: &Snapshot,
        caps: &Capabilities,
        config: &OrchestratorConfig,
    ) -> Result<AgentPayload, Fault> {
        let agent = self.name().as_str();
        let now = Utc::now();

        let mut items = Vec::new();
        let mut last_error: Option<CapabilityError> = None;

        match fetch_from_graph(snapshot, caps, config, now).await {
            Ok(mut graph_items) => items.append(&mut graph_items),
            Err(e) => {
                warn!(error = %e, "news graph source failed");
                last_error = Some(e);
            }
        }
        match fetch_from_feed(snapshot, caps, config, now).await {
            Ok(mut feed_items) => items.append(&mut feed_items),
            Err(e) => {
                warn!(error = %e, "news feed source failed");
                last_error = Some(e);
            }
        }

        if items.is_empty() {
            if let Some(e) = last_error {
                // Both sources failed; surface the failure instead of an
                // empty success.
                return Err(Fault::from_capability(agent, &e));
            }
        }

        items.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        let deduped = dedup(items, config.similarity_dedup_threshold);
        let truncated: Vec<NewsItem> = deduped.into_iter().take(config.news_top_k).collect();

        debug!(count = truncated.len(), "news merged and ranked");
        Ok(AgentPayload::News(NewsPayload { items: truncated }))
    }
}

async fn fetch_from_graph(
    snapshot: &Snapshot,
    caps: &Capabilities,
    config: &OrchestratorConfig,
    now: DateTime<Utc>,
) -> Result<Vec<NewsItem>, CapabilityError> {
    let embedding = caps.news_graph.embed(&snapshot.query).await?;
    let articles = caps
        .news_graph
        .similar(&embedding, config.news_top_k, config.news_min_score)
        .await?;
    Ok(articles
        .into_iter()
        .map(|a| {
            let relevance = a.score.clamp(0.0, 1.0);
            NewsItem {
                score: item_score(relevance, a.published_at, now),
                title: a.title,
                url: a.url,
                origin: NewsOrigin::Graph,
                published_at: a.published_at,
                summary: a.summary,
                relevance,
            }
        })
        .collect())
}

async fn fetch_from_feed(
    snapshot: &Snapshot,
    caps: &Capabilities,
    config: &OrchestratorConfig,
    now: DateTime<Utc>,
) -> Result<Vec<NewsItem>, CapabilityError> {
    let keywords = vec![snapshot.query.clone()];
    let raw = caps.news_feed.fetch(&keywords, config.news_top_k).await?;

    let mut items = Vec::with_capacity(raw.len());
    for entry in raw {
        // Non-Korean items are translated; a failed translation keeps the
        // original text rather than dropping the item.
        let title = if entry.language != "ko" {
            match caps.translator.translate(&entry.title, "ko").await {
                Ok(translated) => translated,
                Err(e) => {
                    warn!(error = %e, url = %entry.url, "title translation failed");
                    entry.title.clone()
                }
            }
        } else {
            entry.title.clone()
        };

        let summary = if entry.body.is_empty() {
            None
        } else {
            Some(truncate_chars(&entry.body, 200))
        };

        items.push(NewsItem {
            score: item_score(FEED_RELEVANCE, entry.published_at, now),
            title,
            url: entry.url,
            origin: NewsOrigin::Feed,
            published_at: entry.published_at,
            summary,
            relevance: FEED_RELEVANCE,
        });
    }
    Ok(items)
}

/// Combined ordering score: 0.7 × relevance + 0.3 × recency, where recency
/// is 1.0 within 24 h, 2/3 within 48 h, and 1/3 beyond (equivalently a
/// +0.3 / +0.2 / +0.1 bonus).
fn item_score(relevance: f64, published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let recency = match published_at {
        Some(at) if now - at <= Duration::hours(24) => 1.0,
        Some(at) if now - at <= Duration::hours(48) => 2.0 / 3.0,
        _ => 1.0 / 3.0,
    };
    0.7 * relevance + 0.3 * recency
}

/// Drop items with a URL already seen or a title too similar to a kept one.
/// The input must already be sorted best-first so the better item survives.
fn dedup(items: Vec<NewsItem>, jaccard_threshold: f64) -> Vec<NewsItem> {
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut kept: Vec<NewsItem> = Vec::with_capacity(items.len());

    for item in items {
        if !seen_urls.insert(item.url.clone()) {
            debug!(url = %item.url, "dropping duplicate url");
            continue;
        }
        if kept
            .iter()
            .any(|k| title_jaccard(&k.title, &item.title) >= jaccard_threshold)
        {
            debug!(title = %item.title, "dropping near-duplicate title");
            continue;
        }
        kept.push(item);
    }
    kept
}

/// Jaccard similarity over lowercase whitespace tokens of two titles.
pub(crate) fn title_jaccard(a: &str, b: &str) -> f64 {
    let set_a: HashSet<String> = a.split_whitespace().map(|t| t.to_lowercase()).collect();
    let set_b: HashSet<String> = b.split_whitespace().map(|t| t.to_lowercase()).collect();
    if set_a.is_empty() && set_b.is_empty() {
        return 1.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str, score: f64) -> NewsItem {
        NewsItem {
            title: title.into(),
            url: url.into(),
            origin: NewsOrigin::Feed,
            published_at: None,
            summary: None,
            relevance: 0.5,
            score,
        }
    }

    #[test]
    fn jaccard_of_identical_titles_is_one() {
        assert_eq!(title_jaccard("삼성전자 실적 발표", "삼성전자 실적 발표"), 1.0);
    }

    #[test]
    fn jaccard_is_case_insensitive() {
        assert_eq!(title_jaccard("Samsung Earnings Beat", "samsung earnings beat"), 1.0);
    }

    #[test]
    fn jaccard_of_disjoint_titles_is_zero() {
        assert_eq!(title_jaccard("금리 인상", "반도체 수출"), 0.0);
    }

    #[test]
    fn dedup_drops_same_url() {
        let out = dedup(
            vec![item("a b c", "http://x/1", 0.9), item("d e f", "http://x/1", 0.8)],
            0.9,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title, "a b c");
    }

    #[test]
    fn dedup_drops_similar_titles_keeping_the_better_scored() {
        let out = dedup(
            vec![
                item("삼성전자 2분기 실적 발표", "http://x/1", 0.9),
                item("삼성전자 2분기 실적 발표", "http://y/2", 0.7),
                item("전혀 다른 기사", "http://z/3", 0.6),
            ],
            0.9,
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "http://x/1");
        assert_eq!(out[1].url, "http://z/3");
    }

    #[test]
    fn recency_bonus_tiers() {
        let now = Utc::now();
        let fresh = item_score(1.0, Some(now - Duration::hours(1)), now);
        let day_old = item_score(1.0, Some(now - Duration::hours(36)), now);
        let stale = item_score(1.0, Some(now - Duration::hours(100)), now);
        let unknown = item_score(1.0, None, now);

        assert!(fresh > day_old && day_old > stale);
        assert!((fresh - 1.0).abs() < 1e-9);
        assert!((day_old - 0.9).abs() < 1e-9);
        assert!((stale - 0.8).abs() < 1e-9);
        assert_eq!(stale, unknown);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let text = "가나다라마".repeat(100);
        let out = truncate_chars(&text, 200);
        assert_eq!(out.chars().count(), 201);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn jaccard_is_symmetric_and_bounded(
                a in "[가-힣a-z ]{0,40}",
                b in "[가-힣a-z ]{0,40}",
            ) {
                let ab = title_jaccard(&a, &b);
                prop_assert!((ab - title_jaccard(&b, &a)).abs() < 1e-12);
                prop_assert!((0.0..=1.0).contains(&ab));
            }

            #[test]
            fn dedup_output_has_no_near_duplicates(
                entries in proptest::collection::vec(("[a-c]{1,2}( [a-c]{1,2}){0,2}", "[ab]"), 0..12),
            ) {
                let items: Vec<NewsItem> = entries
                    .iter()
                    .map(|(title, url)| item(title, url, 0.5))
                    .collect();
                let out = dedup(items, 0.9);
                for i in 0..out.len() {
                    for j in (i + 1)..out.len() {
                        prop_assert!(out[i].url != out[j].url);
                        prop_assert!(title_jaccard(&out[i].title, &out[j].title) < 0.9);
                    }
                }
            }
        }
    }
}
