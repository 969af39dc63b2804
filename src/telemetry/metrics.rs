//! Prometheus metrics

use crate::broker::{Account, RetCode};
use crate::ledger::CloseReason;
use metrics::{counter, gauge, histogram};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// One settlement pass
    Settlement,
    /// Time a round spent waiting on the barrier
    BarrierWait,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    Balance,
    Equity,
    /// Floating profit
    Profit,
    Margin,
    MarginLevel,
    OpenPositions,
    /// Tasks registered with the barrier
    RegisteredTasks,
    /// Clock index of the current round
    RoundIndex,
}

impl GaugeMetric {
    fn name(&self) -> &'static str {
        match self {
            GaugeMetric::Balance => "lockstep_balance",
            GaugeMetric::Equity => "lockstep_equity",
            GaugeMetric::Profit => "lockstep_floating_profit",
            GaugeMetric::Margin => "lockstep_margin",
            GaugeMetric::MarginLevel => "lockstep_margin_level",
            GaugeMetric::OpenPositions => "lockstep_open_positions",
            GaugeMetric::RegisteredTasks => "lockstep_registered_tasks",
            GaugeMetric::RoundIndex => "lockstep_round_index",
        }
    }
}

/// Record a latency measurement
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let metric_name = match metric {
        LatencyMetric::Settlement => "lockstep_settlement_latency_ms",
        LatencyMetric::BarrierWait => "lockstep_barrier_wait_ms",
    };

    histogram!(metric_name).record(duration.as_secs_f64() * 1000.0);
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    gauge!(metric.name()).set(value);
}

/// Publish the account figures as gauges
pub fn record_account(account: &Account, open_positions: usize) {
    let as_f64 = |d: Decimal| d.to_f64().unwrap_or(f64::MAX);

    set_gauge(GaugeMetric::Balance, as_f64(account.balance));
    set_gauge(GaugeMetric::Equity, as_f64(account.equity));
    set_gauge(GaugeMetric::Profit, as_f64(account.profit));
    set_gauge(GaugeMetric::Margin, as_f64(account.margin));
    set_gauge(GaugeMetric::MarginLevel, as_f64(account.margin_level));
    set_gauge(GaugeMetric::OpenPositions, open_positions as f64);
}

/// Count a broker response by result code
pub fn record_request(code: RetCode) {
    counter!("lockstep_trade_requests_total", "code" => code.code().to_string()).increment(1);
}

/// Count a position close by reason
pub fn record_close(reason: CloseReason) {
    counter!("lockstep_positions_closed_total", "reason" => reason.as_str()).increment(1);
}

/// Count a completed barrier round
pub fn record_round() {
    counter!("lockstep_rounds_total").increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::StopOutMode;
    use rust_decimal_macros::dec;

    // Without an installed recorder every call is a no-op; these only
    // exercise the label and conversion paths.
    #[test]
    fn test_record_without_recorder() {
        let account = Account::new(dec!(1000), dec!(100), 2, StopOutMode::Percent, dec!(50));
        record_account(&account, 0);
        record_request(RetCode::Done);
        record_close(CloseReason::StopOut);
        record_round();
        record_latency(LatencyMetric::Settlement, Duration::from_millis(3));
    }
}
