use chrono::NaiveDate;
use perf_metrics::PerformanceMetrics;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strategy_core::{EquityPoint, Granularity, RebalanceFrequency, Trade};
use trade_simulator::AccountConfig;

use crate::allocation::AllocationStrategy;

/// Parameters for one multi-symbol run. Symbol count must be in `[2, 10]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: Decimal,
    pub allocation: AllocationStrategy,
    pub rebalance: RebalanceFrequency,
    pub confidence_threshold: f64,
    pub lookback_days: u32,
    /// Per-symbol cap on the fraction of that symbol's equity committed to
    /// a single signal-driven entry.
    pub max_position_size: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    pub granularity: Granularity,
    /// Trailing-return window for volatility-aware allocation strategies.
    pub volatility_window: usize,
}

impl PortfolioConfig {
    pub fn new(
        symbols: Vec<String>,
        start: NaiveDate,
        end: NaiveDate,
        initial_capital: Decimal,
        allocation: AllocationStrategy,
        rebalance: RebalanceFrequency,
    ) -> Self {
        Self {
            symbols,
            start,
            end,
            initial_capital,
            allocation,
            rebalance,
            confidence_threshold: 0.6,
            lookback_days: 30,
            max_position_size: 1.0,
            stop_loss_pct: None,
            take_profit_pct: None,
            granularity: Granularity::Day,
            volatility_window: 30,
        }
    }

    pub(crate) fn account_config(&self, symbol: &str, sleeve_capital: Decimal) -> AccountConfig {
        AccountConfig {
            symbol: symbol.to_string(),
            initial_capital: sleeve_capital,
            confidence_threshold: self.confidence_threshold,
            max_position_size: self.max_position_size,
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            order_expiry_bars: 5,
            fractional_shares: false,
        }
    }
}

/// One symbol's slice of the finished portfolio run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolPerformance {
    pub symbol: String,
    pub final_equity: Decimal,
    pub trades: Vec<Trade>,
    pub metrics: PerformanceMetrics,
}

/// A completed portfolio run: the aggregated curve and metrics, the
/// per-symbol breakdown, and the cross-symbol correlation matrix (row/column
/// order matches `symbols`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioResult {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: Decimal,
    pub final_equity: Decimal,
    pub equity_curve: Vec<EquityPoint>,
    pub per_symbol: Vec<SymbolPerformance>,
    pub correlation_matrix: Vec<Vec<f64>>,
    pub metrics: PerformanceMetrics,
}
