//! Confidence calculator: score the combined reply and grade it.
//!
//! The model produces four subscores (0..=25 each); they are clamped on
//! ingest and summed into a normalized score. Malformed output coerces to
//! 0.5 / C with a parse-fallback warning, so scoring can never fail the
//! request.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::context::Context;
use crate::state::{
    AgentName, ConfidenceReport, ConfidenceThresholds, Grade, RequestState, SubScores,
    MIN_REPLY_CHARS,
};

pub(crate) const NODE: &str = "confidence_calculator";

/// Upper bound of each rubric dimension.
const SUBSCORE_MAX: f64 = 25.0;

const RUBRIC_SYSTEM: &str = "당신은 답변 품질 평가자입니다. 질문과 답변, 실행 요약을 보고 네 항목을 \
각각 0에서 25 사이 숫자로 채점해 JSON 객체 하나만 출력하세요. \
스키마: {\"completeness\": 0-25, \"consistency\": 0-25, \"accuracy\": 0-25, \"usefulness\": 0-25}. \
JSON 외의 텍스트를 출력하지 마세요.";

#[derive(Debug, Deserialize)]
struct RawScores {
    completeness: Option<f64>,
    consistency: Option<f64>,
    accuracy: Option<f64>,
    usefulness: Option<f64>,
}

/// Run the scorer against the state record.
pub(crate) async fn run(state: &mut RequestState, ctx: &Context) {
    if state.short_circuited() {
        debug!("short-circuit active, responder assigns the default confidence");
        return;
    }
    let Some(combined) = state.combined.clone() else {
        debug!("nothing to score");
        return;
    };

    let warnings = collect_warnings(state, &combined.reply);
    let prompt = build_prompt(state, &combined.reply);

    let report = match ctx
        .caps
        .language_model
        .complete(RUBRIC_SYSTEM, &prompt, 0.0, 256)
        .await
    {
        Ok(response) => match crate::parse::parse_llm_json::<RawScores>(&response) {
            Some(raw) => ingest(raw, warnings, &ctx.config.confidence_thresholds),
            None => parse_fallback(warnings),
        },
        Err(e) => {
            warn!(error = %e, "scoring model failed");
            parse_fallback(warnings)
        }
    };

    debug!(score = report.score, grade = ?report.grade, "reply scored");
    state.confidence_report = Some(report);
}

/// Clamp each dimension into range and derive the grade.
fn ingest(
    raw: RawScores,
    warnings: Vec<String>,
    thresholds: &ConfidenceThresholds,
) -> ConfidenceReport {
    let clamp = |v: Option<f64>| v.unwrap_or(0.0).clamp(0.0, SUBSCORE_MAX);
    let subscores = SubScores {
        completeness: clamp(raw.completeness),
        consistency: clamp(raw.consistency),
        accuracy: clamp(raw.accuracy),
        usefulness: clamp(raw.usefulness),
    };
    let score = (subscores.total() / (SUBSCORE_MAX * 4.0)).clamp(0.0, 1.0);
    ConfidenceReport {
        score,
        grade: Grade::from_score(score, thresholds),
        subscores,
        warnings,
    }
}

/// Coercion for malformed scorer output: 0.5 and a flat C, regardless of
/// the configured thresholds.
fn parse_fallback(mut warnings: Vec<String>) -> ConfidenceReport {
    warnings.push("score_parse_fallback".to_string());
    ConfidenceReport {
        score: 0.5,
        grade: Grade::C,
        subscores: SubScores::default(),
        warnings,
    }
}

/// Quality warnings: failed agents, empty news, a missing disclaimer on an
/// investment answer, and replies too short to be useful.
fn collect_warnings(state: &RequestState, reply: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    for agent in state.failed_agents() {
        warnings.push(format!("agent_failed:{agent}"));
    }

    let planned_news = state
        .plan
        .as_ref()
        .is_some_and(|p| p.contains(AgentName::News));
    let news_count = state.news_data.as_ref().map(|n| n.items.len()).unwrap_or(0);
    if planned_news && news_count == 0 {
        warnings.push("no_news_items".to_string());
    }

    if let Some(analysis) = &state.analysis_result {
        if !reply.contains(&analysis.disclaimer) {
            warnings.push("disclaimer_missing".to_string());
        }
    }

    if reply.chars().count() < MIN_REPLY_CHARS {
        warnings.push("short_reply".to_string());
    }

    warnings
}

fn build_prompt(state: &RequestState, reply: &str) -> String {
    let mut prompt = format!("질문: {}\n\n답변:\n{}\n\n실행 요약:\n", state.query, reply);
    for outcome in state.agent_results.values() {
        prompt.push_str(&format!(
            "- {}: {} ({}ms)\n",
            outcome.agent,
            if outcome.success { "성공" } else { "실패" },
            outcome.elapsed_ms
        ));
    }
    prompt
}
