//! Result combiner: fuse the surviving agent results into one reply.
//!
//! Only successful agents contribute. The model synthesizes when it can; a
//! model failure degrades to a deterministic fixed-order template. Either
//! way the combiner records which sources fed the reply.

use tracing::{debug, warn};

use crate::agents::title_jaccard;
use crate::context::Context;
use crate::state::{CombinedReply, RequestState};

pub(crate) const NODE: &str = "result_combiner";

const SYNTHESIS_SYSTEM: &str = "당신은 금융 상담 답변 작성자입니다. 아래 출처별 자료만 사용해 하나의 \
자연스러운 한국어 답변을 작성하세요. 순서는 시세 → 분석 → 뉴스 → 용어 설명을 지키고, 중복된 내용은 한 번만 \
언급하며, 투자 판단 자료가 있으면 면책 문구를 끝에 그대로 포함하세요. 자료에 없는 내용은 추가하지 마세요.";

/// One source's contribution, tagged for the prompt and the citations.
struct Section {
    tag: &'static str,
    heading: &'static str,
    body: String,
}

/// Run the combiner against the state record.
pub(crate) async fn run(state: &mut RequestState, ctx: &Context) {
    if state.short_circuited() {
        debug!("short-circuit active, skipping combination");
        return;
    }

    let sections = collect_sections(state);
    if sections.is_empty() {
        debug!("no successful agent output to combine");
        return;
    }
    let sources: Vec<String> = sections.iter().map(|s| s.tag.to_string()).collect();

    let prompt = build_prompt(&state.query, &sections);
    let reply = match ctx
        .caps
        .language_model
        .complete(SYNTHESIS_SYSTEM, &prompt, 0.3, 2_048)
        .await
    {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => {
            warn!("synthesis model returned empty text, using template");
            render_template(&sections)
        }
        Err(e) => {
            // Degraded success, never an error.
            warn!(error = %e, "synthesis model failed, using template");
            render_template(&sections)
        }
    };

    state.combined = Some(CombinedReply { reply, sources });
}

/// Gather successful payloads in the fixed presentation order:
/// data → analysis → news → knowledge.
fn collect_sections(state: &RequestState) -> Vec<Section> {
    let mut sections = Vec::new();

    if let Some(data) = &state.financial_data {
        let mut body = format!(
            "{}({}) 현재가 {:.0}원, 등락률 {:+.1}%, 거래량 {}주",
            data.name, data.symbol, data.price, data.change_pct, data.volume
        );
        if let Some(per) = data.per {
            body.push_str(&format!(", PER {per:.1}"));
        }
        if let Some(sector) = &data.sector {
            body.push_str(&format!(" ({sector})"));
        }
        sections.push(Section {
            tag: "data",
            heading: "시세 정보",
            body,
        });
    }

    if let Some(analysis) = &state.analysis_result {
        let body = format!(
            "투자 의견: {}\n{}\n{}",
            analysis.rating.label_ko(),
            analysis.rationale,
            analysis.disclaimer
        );
        sections.push(Section {
            tag: "analysis",
            heading: "투자 분석",
            body,
        });
    }

    if let Some(news) = &state.news_data {
        if !news.items.is_empty() {
            let mut body = String::new();
            for item in news.items.iter().take(5) {
                body.push_str(&format!("- {} ({})\n", item.title, item.url));
            }
            sections.push(Section {
                tag: "news",
                heading: "관련 뉴스",
                body: body.trim_end().to_string(),
            });
        }
    }

    if let Some(knowledge) = &state.knowledge_context {
        sections.push(Section {
            tag: "knowledge",
            heading: "용어 설명",
            body: knowledge.explanation.clone(),
        });
    }

    dedup_sections(sections)
}

/// Drop a later section whose body near-duplicates an earlier one.
fn dedup_sections(sections: Vec<Section>) -> Vec<Section> {
    let mut kept: Vec<Section> = Vec::with_capacity(sections.len());
    for section in sections {
        if kept
            .iter()
            .any(|k| title_jaccard(&k.body, &section.body) >= 0.9)
        {
            debug!(tag = section.tag, "dropping near-duplicate section");
            continue;
        }
        kept.push(section);
    }
    kept
}

fn build_prompt(query: &str, sections: &[Section]) -> String {
    let mut prompt = format!("질문: {query}\n");
    for section in sections {
        prompt.push_str(&format!("\n[{}]\n{}\n", section.tag, section.body));
    }
    prompt
}

/// Deterministic fallback: per-source blocks in fixed order under headers.
/// A single contributing source is returned as-is — there is nothing to
/// combine, and re-combining an already-combined reply must reproduce it.
fn render_template(sections: &[Section]) -> String {
    if let [only] = sections {
        return only.body.clone();
    }
    let mut out = String::new();
    for section in sections {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&format!("## {}\n{}", section.heading, section.body));
    }
    out
}
