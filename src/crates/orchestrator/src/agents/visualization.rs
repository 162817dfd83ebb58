//! Visualization agent: chart-kind selection and PNG rendering.

use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use crate::capability::{Capabilities, PricePoint, Series};
use crate::config::OrchestratorConfig;
use crate::error::{ErrorKind, Fault};
use crate::state::{AgentName, AgentPayload, ChartKind, ChartPayload, FinancialData, Snapshot};

use super::WorkerAgent;

/// Trailing window of daily bars requested for charts.
const HISTORY_DAYS: u32 = 30;

pub(crate) struct VisualizationAgent;

#[async_trait]
impl WorkerAgent for VisualizationAgent {
    fn name(&self) -> AgentName {
        AgentName::Visualization
    }

    async fn process(
        &self,
        snapshot: &Snapshot,
        caps: &Capabilities,
        _config: &OrchestratorConfig,
    ) -> Result<AgentPayload, Fault> {
        let agent = self.name().as_str();

        let data = snapshot.financial_data.as_ref().ok_or_else(|| {
            Fault::recoverable(
                ErrorKind::NoContext,
                agent,
                "financial data missing from earlier stage",
            )
        })?;

        let points = match caps.market_data.history(&data.symbol, HISTORY_DAYS).await {
            Ok(points) if !points.is_empty() => points,
            Ok(_) | Err(_) => {
                // Degrade to a single bar built from the quote so a chart
                // can still be drawn.
                warn!(symbol = %data.symbol, "price history unavailable, charting the quote alone");
                vec![quote_point(data)]
            }
        };

        let kind = select_kind(&snapshot.query, &points);
        let series = Series {
            symbol: data.symbol.clone(),
            label: data.name.clone(),
            points,
        };

        // Rendering failures never raise; they become a failed outcome.
        let png = caps
            .chart_renderer
            .render(&series, kind)
            .await
            .map_err(|e| {
                Fault::recoverable(ErrorKind::RenderFailed, agent, e.to_string())
            })?;

        let caption = format!(
            "{} 최근 {}일 {} 차트",
            data.name,
            HISTORY_DAYS,
            kind_label(kind)
        );
        Ok(AgentPayload::Visualization(ChartPayload { png, caption, kind }))
    }
}

/// Pick the chart kind from query hints, then from the data shape.
fn select_kind(query: &str, points: &[PricePoint]) -> ChartKind {
    let lower = query.to_lowercase();
    if ["캔들", "봉차트", "candle"].iter().any(|t| lower.contains(t)) {
        return ChartKind::Candlestick;
    }
    if ["막대", "bar"].iter().any(|t| lower.contains(t)) {
        return ChartKind::Bar;
    }
    if points.len() == 1 {
        // A single bar has nothing to draw a line through.
        return ChartKind::Bar;
    }
    ChartKind::Line
}

fn kind_label(kind: ChartKind) -> &'static str {
    match kind {
        ChartKind::Line => "라인",
        ChartKind::Bar => "막대",
        ChartKind::Candlestick => "캔들",
    }
}

fn quote_point(data: &FinancialData) -> PricePoint {
    PricePoint {
        at: Utc::now(),
        open: data.price,
        high: data.price,
        low: data.price,
        close: data.price,
        volume: data.volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn points(n: usize) -> Vec<PricePoint> {
        (0..n)
            .map(|i| PricePoint {
                at: Utc::now(),
                open: 100.0 + i as f64,
                high: 101.0 + i as f64,
                low: 99.0 + i as f64,
                close: 100.5 + i as f64,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn query_hints_win_over_data_shape() {
        assert_eq!(select_kind("삼성전자 캔들 차트", &points(30)), ChartKind::Candlestick);
        assert_eq!(select_kind("거래량 막대 그래프", &points(30)), ChartKind::Bar);
        assert_eq!(select_kind("카카오 차트 보여줘", &points(30)), ChartKind::Line);
    }

    #[test]
    fn single_point_series_falls_back_to_bar() {
        assert_eq!(select_kind("카카오 차트", &points(1)), ChartKind::Bar);
    }
}
