//! Responder: pack the state into the response shape. Formatting only —
//! no network or model calls happen here.

use serde_json::{json, Value};
use tracing::{debug, error};

use crate::context::Context;
use crate::error::ErrorKind;
use crate::state::{ActionType, Grade, Intent, RequestState, Response};

pub(crate) const NODE: &str = "responder";

/// Confidence assigned to short-circuit replies, which skip the scorer.
const SHORT_CIRCUIT_CONFIDENCE: f64 = 0.85;

/// Confidence assigned to general-intent replies, which have no scorable
/// agent output.
const GENERAL_CONFIDENCE: f64 = 0.5;

const GENERAL_REPLY: &str = "안녕하세요! 종목 시세, 투자 분석, 금융 뉴스, 용어 설명, 차트를 도와드릴 수 \
있습니다. 예: \"삼성전자 주가 알려줘\", \"PER이 뭐야?\"";

/// Run the responder against the state record.
pub(crate) async fn run(state: &mut RequestState, _ctx: &Context) {
    let response = build_response(state);
    debug!(
        request_id = %state.request_id,
        action = ?response.action_type,
        confidence = response.confidence,
        "response packed"
    );
    state.response = Some(response);
}

fn build_response(state: &RequestState) -> Response {
    if let Some(fault) = state.fault.as_ref().filter(|f| !f.recoverable) {
        return error_response(fault.kind);
    }

    if let Some(sc) = state.short_circuit.as_ref().filter(|s| s.active) {
        return Response {
            reply: sc.reply.clone(),
            action_type: ActionType::Data,
            action_payload: to_payload_value(&state.financial_data),
            chart: None,
            retrieved_documents: Vec::new(),
            confidence: SHORT_CIRCUIT_CONFIDENCE,
            grade: Grade::B,
        };
    }

    if let Some(combined) = &state.combined {
        let (confidence, grade) = match &state.confidence_report {
            Some(report) => (report.score, report.grade),
            None => (GENERAL_CONFIDENCE, Grade::C),
        };
        let intent = state.intent();
        return Response {
            reply: combined.reply.clone(),
            action_type: intent.action_type(),
            action_payload: primary_payload(state, intent),
            chart: state.chart.as_ref().map(|c| c.png.clone()),
            retrieved_documents: state
                .knowledge_context
                .as_ref()
                .map(|k| k.documents.clone())
                .unwrap_or_default(),
            confidence,
            grade,
        };
    }

    // Nothing planned and nothing combined: a general guidance reply.
    Response {
        reply: GENERAL_REPLY.to_string(),
        action_type: ActionType::General,
        action_payload: None,
        chart: None,
        retrieved_documents: Vec::new(),
        confidence: GENERAL_CONFIDENCE,
        grade: Grade::C,
    }
}

/// The structured payload matching the intent, for programmatic consumers.
fn primary_payload(state: &RequestState, intent: Intent) -> Option<Value> {
    match intent {
        Intent::Data => to_payload_value(&state.financial_data),
        Intent::Analysis => to_payload_value(&state.analysis_result),
        Intent::News => state
            .news_data
            .as_ref()
            .and_then(|n| serde_json::to_value(&n.items).ok()),
        Intent::Knowledge => to_payload_value(&state.knowledge_context),
        Intent::Visualization => state.chart.as_ref().map(|c| {
            json!({"kind": c.kind, "caption": c.caption})
        }),
        Intent::General => None,
    }
}

fn to_payload_value<T: serde::Serialize>(value: &Option<T>) -> Option<Value> {
    value.as_ref().and_then(|v| match serde_json::to_value(v) {
        Ok(json) => Some(json),
        Err(e) => {
            error!(error = %e, "payload serialization failed");
            None
        }
    })
}

/// Error response with a user-safe reply. Internal messages never leak;
/// only the error kind picks the wording.
pub(crate) fn error_response(kind: ErrorKind) -> Response {
    Response {
        reply: user_safe_message(kind).to_string(),
        action_type: ActionType::Error,
        action_payload: Some(json!({ "error_kind": kind.as_str() })),
        chart: None,
        retrieved_documents: Vec::new(),
        confidence: 0.0,
        grade: Grade::F,
    }
}

fn user_safe_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidInput => "질문을 이해하지 못했습니다. 질문을 입력해 주세요.",
        ErrorKind::SymbolNotFound => "말씀하신 종목을 찾지 못했습니다. 종목명을 확인해 주세요.",
        ErrorKind::NoContext => "관련 자료를 찾지 못했습니다. 다른 질문으로 다시 시도해 주세요.",
        ErrorKind::TransientExternal | ErrorKind::PermanentExternal => {
            "외부 서비스 연결에 문제가 발생했습니다. 잠시 후 다시 시도해 주세요."
        }
        ErrorKind::RenderFailed => "차트 생성에 실패했습니다. 잠시 후 다시 시도해 주세요.",
        ErrorKind::Timeout => "요청 처리 시간이 초과되었습니다. 잠시 후 다시 시도해 주세요.",
        ErrorKind::Cancelled => "요청이 취소되었습니다.",
        ErrorKind::RequiredAgentFailed => {
            "죄송합니다. 필요한 정보를 가져오지 못해 답변을 드리기 어렵습니다. 잠시 후 다시 시도해 주세요."
        }
        ErrorKind::Internal => "죄송합니다. 처리 중 오류가 발생했습니다. 잠시 후 다시 시도해 주세요.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Fault;
    use crate::state::{Request, ShortCircuit};

    #[test]
    fn unrecoverable_fault_yields_safe_error_reply() {
        let mut state = RequestState::new(Request::new("삼성전자 주가", "s", "u"));
        state.record_fault(Fault::fatal(
            ErrorKind::RequiredAgentFailed,
            "parallel_executor",
            "required agent 'data' failed (symbol_not_found: internal detail)",
        ));

        let response = build_response(&state);
        assert_eq!(response.action_type, ActionType::Error);
        assert_eq!(response.confidence, 0.0);
        assert_eq!(response.grade, Grade::F);
        assert!(!response.reply.contains("internal detail"));
        assert!(response.reply.len() < 600);
    }

    #[test]
    fn short_circuit_reply_is_returned_verbatim_with_default_confidence() {
        let mut state = RequestState::new(Request::new("삼성전자 주가", "s", "u"));
        state.short_circuit = Some(ShortCircuit {
            active: true,
            reply: "삼성전자(005930) 현재가 71,500원 (+2.1%)".into(),
        });

        let response = build_response(&state);
        assert_eq!(response.reply, "삼성전자(005930) 현재가 71,500원 (+2.1%)");
        assert_eq!(response.action_type, ActionType::Data);
        assert!(response.confidence >= 0.75);
        assert_eq!(response.grade, Grade::B);
    }

    #[test]
    fn empty_state_yields_the_general_reply() {
        let state = RequestState::new(Request::new("안녕", "s", "u"));
        let response = build_response(&state);
        assert_eq!(response.action_type, ActionType::General);
        assert!(response.reply.contains("도와드릴 수"));
    }

    #[test]
    fn every_error_kind_has_a_nonempty_message() {
        for kind in [
            ErrorKind::InvalidInput,
            ErrorKind::SymbolNotFound,
            ErrorKind::NoContext,
            ErrorKind::TransientExternal,
            ErrorKind::PermanentExternal,
            ErrorKind::RenderFailed,
            ErrorKind::Timeout,
            ErrorKind::Cancelled,
            ErrorKind::RequiredAgentFailed,
            ErrorKind::Internal,
        ] {
            assert!(!user_safe_message(kind).is_empty());
            assert!(user_safe_message(kind).chars().count() < 200);
        }
    }
}
