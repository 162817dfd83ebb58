//! Data agent: symbol resolution, quote fetch, and the simple-request
//! short-circuit decision.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::capability::Capabilities;
use crate::config::OrchestratorConfig;
use crate::error::{CapabilityError, ErrorKind, Fault};
use crate::retry::retry_capability;
use crate::state::{
    AgentName, AgentPayload, Complexity, FinancialData, FinancialPayload, Intent, Snapshot,
};

use super::WorkerAgent;

pub(crate) struct DataAgent;

#[async_trait]
impl WorkerAgent for DataAgent {
    fn name(&self) -> AgentName {
        AgentName::Data
    }

    async fn process(
        &self,
        snapshot: &Snapshot,
        caps: &Capabilities,
        config: &OrchestratorConfig,
    ) -> Result<AgentPayload, Fault> {
        let agent = self.name().as_str();

        let symbol = caps.symbols.resolve(&snapshot.query).ok_or_else(|| {
            Fault::recoverable(
                ErrorKind::SymbolNotFound,
                agent,
                "no ticker symbol recognized in query",
            )
        })?;
        debug!(code = %symbol.code, name = %symbol.name, "symbol resolved");

        let quote = retry_capability(&config.retry, "market_data.quote", || {
            caps.market_data.quote(&symbol.code)
        })
        .await
        .map_err(|e| match e {
            CapabilityError::NotFound(msg) => {
                Fault::recoverable(ErrorKind::SymbolNotFound, agent, msg)
            }
            other => Fault::from_capability(agent, &other),
        })?;

        let data = FinancialData {
            symbol: symbol.code,
            name: symbol.name,
            price: quote.price,
            change_pct: quote.change_pct,
            volume: quote.volume,
            per: quote.per,
            pbr: quote.pbr,
            roe: quote.roe,
            market_cap: quote.market_cap,
            sector: quote.sector,
        };

        let short_circuit_reply = if is_simple_request(snapshot) {
            info!(symbol = %data.symbol, "simple data request, short-circuiting");
            Some(format_summary(&data))
        } else {
            None
        };

        Ok(AgentPayload::Data(FinancialPayload {
            data,
            short_circuit_reply,
        }))
    }
}

/// A request is simple when the analyzer saw a plain data intent with no
/// other agents involved.
fn is_simple_request(snapshot: &Snapshot) -> bool {
    snapshot.analysis.as_ref().is_some_and(|a| {
        a.primary_intent == Intent::Data
            && a.complexity == Complexity::Simple
            && a.required_agents == [AgentName::Data]
    })
}

fn format_summary(data: &FinancialData) -> String {
    let mut line = format!(
        "{}({}) 현재가 {}원 ({:+.1}%) · 거래량 {}주",
        data.name,
        data.symbol,
        group_thousands(data.price),
        data.change_pct,
        group_thousands(data.volume as f64),
    );
    if let Some(per) = data.per {
        line.push_str(&format!(" · PER {per:.1}"));
    }
    line
}

/// Group an amount with thousands separators, dropping a zero fraction.
pub(crate) fn group_thousands(value: f64) -> String {
    let negative = value < 0.0;
    let whole = value.abs().trunc() as u64;
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    let fraction = value.abs().fract();
    if fraction > f64::EPSILON {
        grouped.push_str(&format!("{:.1}", fraction)[1..]);
    }
    if negative {
        format!("-{grouped}")
    } else {
        grouped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::QueryAnalysis;

    fn snapshot_with(intent: Intent, complexity: Complexity, agents: &[AgentName]) -> Snapshot {
        Snapshot {
            query: "삼성전자 주가".into(),
            analysis: Some(QueryAnalysis {
                primary_intent: intent,
                complexity,
                required_agents: agents.to_vec(),
                confidence: 0.9,
                is_investment: false,
                next_agent: agents.first().copied(),
            }),
            financial_data: None,
        }
    }

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(71_500.0), "71,500");
        assert_eq!(group_thousands(1_234_567.0), "1,234,567");
        assert_eq!(group_thousands(950.0), "950");
        assert_eq!(group_thousands(-12_000.0), "-12,000");
    }

    #[test]
    fn simple_heuristic_requires_lone_data_intent() {
        assert!(is_simple_request(&snapshot_with(
            Intent::Data,
            Complexity::Simple,
            &[AgentName::Data]
        )));
        assert!(!is_simple_request(&snapshot_with(
            Intent::Data,
            Complexity::Moderate,
            &[AgentName::Data]
        )));
        assert!(!is_simple_request(&snapshot_with(
            Intent::Data,
            Complexity::Simple,
            &[AgentName::Data, AgentName::News]
        )));
        assert!(!is_simple_request(&snapshot_with(
            Intent::Analysis,
            Complexity::Simple,
            &[AgentName::Data]
        )));
    }

    #[test]
    fn summary_carries_price_and_change() {
        let data = FinancialData {
            symbol: "005930".into(),
            name: "삼성전자".into(),
            price: 71_500.0,
            change_pct: 2.1,
            volume: 12_345_678,
            per: Some(13.2),
            pbr: None,
            roe: None,
            market_cap: None,
            sector: None,
        };
        let summary = format_summary(&data);
        assert!(summary.contains("71,500"));
        assert!(summary.contains("+2.1%"));
        assert!(summary.contains("삼성전자"));
    }
}
