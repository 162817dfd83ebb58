//! Knowledge agent: semantic retrieval plus an explanation generated from
//! the retrieved snippets.

use async_trait::async_trait;
use tracing::warn;

use crate::capability::Capabilities;
use crate::config::OrchestratorConfig;
use crate::error::{ErrorKind, Fault};
use crate::retry::retry_capability;
use crate::state::{AgentName, AgentPayload, KnowledgePayload, RetrievedDoc, Snapshot};

use super::WorkerAgent;

/// Minimum index score a hit must reach to count as usable context.
const MIN_CONTEXT_SCORE: f64 = 0.3;

const EXPLAIN_SYSTEM: &str = "당신은 금융 지식 도우미입니다. 제공된 참고 자료만 근거로 용어를 설명하세요. \
쉬운 한국어로, 구체적인 예시 하나와 주의할 점 하나를 포함해 답하세요.";

pub(crate) struct KnowledgeAgent;

#[async_trait]
impl WorkerAgent for KnowledgeAgent {
    fn name(&self) -> AgentName {
        AgentName::Knowledge
    }

    async fn process(
        &self,
        snapshot: &Snapshot,
        caps: &Capabilities,
        config: &OrchestratorConfig,
    ) -> Result<AgentPayload, Fault> {
        let agent = self.name().as_str();

        let documents = caps
            .semantic_index
            .search(&snapshot.query, config.knowledge_top_k, MIN_CONTEXT_SCORE)
            .await
            .map_err(|e| Fault::from_capability(agent, &e))?;

        if documents.is_empty() {
            return Err(Fault::recoverable(
                ErrorKind::NoContext,
                agent,
                "no document above the minimum score",
            ));
        }

        let explanation = explain(snapshot, &documents, caps, config).await;
        Ok(AgentPayload::Knowledge(KnowledgePayload {
            explanation,
            documents,
        }))
    }
}

/// Turn the snippets into an explanation. A model failure degrades to the
/// best snippet instead of failing the agent.
async fn explain(
    snapshot: &Snapshot,
    documents: &[RetrievedDoc],
    caps: &Capabilities,
    config: &OrchestratorConfig,
) -> String {
    let mut prompt = format!("질문: {}\n\n[참고 자료]\n", snapshot.query);
    for doc in documents {
        prompt.push_str(&format!("- ({:.2}) {}\n", doc.score, doc.snippet));
    }

    let result = retry_capability(&config.retry, "language_model.explain", || {
        caps.language_model
            .complete(EXPLAIN_SYSTEM, &prompt, 0.3, 1_024)
    })
    .await;

    match result {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!("explanation model returned empty text, degrading to top snippet");
            documents[0].snippet.clone()
        }
        Err(e) => {
            warn!(error = %e, "explanation model failed, degrading to top snippet");
            documents[0].snippet.clone()
        }
    }
}
