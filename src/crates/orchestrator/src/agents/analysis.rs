//! Analysis agent: investment judgement over market data, index context,
//! and similar news.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::capability::Capabilities;
use crate::config::OrchestratorConfig;
use crate::error::{ErrorKind, Fault};
use crate::parse::parse_llm_json;
use crate::retry::retry_capability;
use crate::state::{
    AgentName, AgentPayload, AnalysisPayload, FinancialData, Rating, Snapshot,
};

use super::WorkerAgent;

/// Mandatory disclaimer attached to every judgement.
pub(crate) const DISCLAIMER: &str =
    "본 분석은 정보 제공 목적이며, 투자 판단의 최종 책임은 투자자 본인에게 있습니다.";

const JUDGEMENT_SYSTEM: &str = "당신은 증권 애널리스트입니다. 제공된 시세, 참고 자료, 관련 뉴스만 근거로 \
투자 판단을 JSON 객체 하나로 출력하세요. \
스키마: {\"rating\": \"strong_buy|buy|neutral|sell|strong_sell\", \"rationale\": \"두세 문장의 근거\"}. \
JSON 외의 텍스트를 출력하지 마세요.";

#[derive(Debug, Deserialize)]
struct RawJudgement {
    rating: Option<Rating>,
    rationale: Option<String>,
}

pub(crate) struct AnalysisAgent;

#[async_trait]
impl WorkerAgent for AnalysisAgent {
    fn name(&self) -> AgentName {
        AgentName::Analysis
    }

    async fn process(
        &self,
        snapshot: &Snapshot,
        caps: &Capabilities,
        config: &OrchestratorConfig,
    ) -> Result<AgentPayload, Fault> {
        let agent = self.name().as_str();

        let data = snapshot.financial_data.as_ref().ok_or_else(|| {
            Fault::recoverable(
                ErrorKind::NoContext,
                agent,
                "financial data missing from earlier stage",
            )
        })?;

        let mut sources = vec!["market_data".to_string()];

        // Analytical context from the semantic index; absence is tolerated.
        let context = match caps
            .semantic_index
            .search(&snapshot.query, config.knowledge_top_k, config.news_min_score)
            .await
        {
            Ok(docs) => {
                sources.extend(docs.iter().map(|d| d.source.clone()));
                docs
            }
            Err(e) => {
                warn!(error = %e, "semantic context lookup failed");
                Vec::new()
            }
        };

        // Similar articles from the news knowledge graph, also tolerated.
        let similar_titles = match similar_news(snapshot, caps, config).await {
            Ok(titles) => {
                if !titles.is_empty() {
                    sources.push("news_graph".to_string());
                }
                titles
            }
            Err(e) => {
                warn!(error = %e, "news graph similarity lookup failed");
                Vec::new()
            }
        };

        let user_prompt = build_prompt(&snapshot.query, data, &context, &similar_titles);
        let response = retry_capability(&config.retry, "language_model.judgement", || {
            caps.language_model
                .complete(JUDGEMENT_SYSTEM, &user_prompt, 0.3, 1_024)
        })
        .await
        .map_err(|e| Fault::from_capability(agent, &e))?;

        let (rating, rationale) = match parse_llm_json::<RawJudgement>(&response) {
            Some(raw) => (
                raw.rating.unwrap_or(Rating::Neutral),
                raw.rationale
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| response.trim().to_string()),
            ),
            None => {
                debug!("judgement output not structured, keeping text with neutral rating");
                (Rating::Neutral, response.trim().to_string())
            }
        };

        Ok(AgentPayload::Analysis(AnalysisPayload {
            rating,
            rationale,
            sources,
            disclaimer: DISCLAIMER.to_string(),
        }))
    }
}

async fn similar_news(
    snapshot: &Snapshot,
    caps: &Capabilities,
    config: &OrchestratorConfig,
) -> Result<Vec<String>, crate::error::CapabilityError> {
    let embedding = caps.news_graph.embed(&snapshot.query).await?;
    let articles = caps
        .news_graph
        .similar(&embedding, config.knowledge_top_k, config.news_min_score)
        .await?;
    Ok(articles.into_iter().map(|a| a.title).collect())
}

fn build_prompt(
    query: &str,
    data: &FinancialData,
    context: &[crate::state::RetrievedDoc],
    similar_titles: &[String],
) -> String {
    let mut prompt = format!(
        "질문: {query}\n\n[시세]\n종목: {} ({})\n현재가: {}원, 등락률: {:+.1}%\n",
        data.name, data.symbol, data.price, data.change_pct
    );
    if let (Some(per), Some(pbr)) = (data.per, data.pbr) {
        prompt.push_str(&format!("PER {per:.1}, PBR {pbr:.1}\n"));
    }
    if let Some(roe) = data.roe {
        prompt.push_str(&format!("ROE {roe:.1}%\n"));
    }
    if !context.is_empty() {
        prompt.push_str("\n[참고 자료]\n");
        for doc in context {
            prompt.push_str(&format!("- ({:.2}) {}\n", doc.score, doc.snippet));
        }
    }
    if !similar_titles.is_empty() {
        prompt.push_str("\n[관련 뉴스]\n");
        for title in similar_titles {
            prompt.push_str(&format!("- {title}\n"));
        }
    }
    prompt
}
