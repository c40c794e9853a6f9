use chrono::NaiveDate;
use perf_metrics::PerformanceMetrics;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strategy_core::{BarQualityReport, EquityPoint, Granularity, Trade};
use trade_simulator::AccountConfig;

/// Parameters for one single-symbol backtest run. Immutable once built; the
/// optimizer substitutes parameter values into fresh copies of this struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: Decimal,
    /// Signals below this confidence are ignored.
    pub confidence_threshold: f64,
    /// Trailing window (in days) handed to the signal provider, always
    /// ending at the previous bar.
    pub lookback_days: u32,
    /// Maximum fraction of equity committed per entry, in (0, 1].
    pub max_position_size: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub granularity: Granularity,
}

impl BacktestConfig {
    pub fn new(
        symbol: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        initial_capital: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
            initial_capital,
            confidence_threshold: 0.6,
            lookback_days: 30,
            max_position_size: 0.2,
            stop_loss_pct: None,
            take_profit_pct: None,
            granularity: Granularity::Day,
        }
    }

    pub(crate) fn account_config(&self) -> AccountConfig {
        AccountConfig {
            symbol: self.symbol.clone(),
            initial_capital: self.initial_capital,
            confidence_threshold: self.confidence_threshold,
            max_position_size: self.max_position_size,
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            order_expiry_bars: 5,
            fractional_shares: false,
        }
    }
}

/// Everything a completed run produced. Either fully present or replaced by
/// a typed error — never partial.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: Decimal,
    pub final_equity: Decimal,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub metrics: PerformanceMetrics,
    pub data_quality: BarQualityReport,
}
