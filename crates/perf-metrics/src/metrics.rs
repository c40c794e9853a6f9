use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strategy_core::{EquityPoint, Trade};

use crate::stats::{equity_returns, stdev_sample};

/// Trading days per year used for annualization.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Reported profit factor when there are gains and zero losses. A capped
/// large number instead of infinity so downstream JSON stays finite.
pub const PROFIT_FACTOR_CAP: f64 = 9999.0;

/// Which metric an optimization run ranks configurations by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    ReturnPct,
    SharpeRatio,
    CalmarRatio,
    WinRate,
    ProfitFactor,
}

/// Aggregate performance figures for one completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub calmar_ratio: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
}

impl PerformanceMetrics {
    /// Compute all metrics from an equity curve and its trade list.
    pub fn compute(equity_curve: &[EquityPoint], trades: &[Trade], initial_equity: Decimal) -> Self {
        let initial = initial_equity.to_f64().unwrap_or(0.0);
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity.to_f64().unwrap_or(0.0))
            .unwrap_or(initial);

        let total_return_pct = total_return_pct(initial, final_equity);
        let annualized_return_pct =
            annualized_return_pct(initial, final_equity, equity_curve.len());
        let sharpe_ratio = sharpe_ratio(equity_curve);
        let max_drawdown_pct = max_drawdown_pct(equity_curve);
        let calmar_ratio = calmar_ratio(annualized_return_pct, max_drawdown_pct);

        let winning_trades = trades
            .iter()
            .filter(|t| t.realized_pnl > Decimal::ZERO)
            .count();
        let losing_trades = trades
            .iter()
            .filter(|t| t.realized_pnl < Decimal::ZERO)
            .count();

        PerformanceMetrics {
            total_return_pct,
            annualized_return_pct,
            sharpe_ratio,
            max_drawdown_pct,
            calmar_ratio,
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            total_trades: trades.len(),
            winning_trades,
            losing_trades,
        }
    }

    /// Look up the metric a ranking objective refers to.
    pub fn value_for(&self, objective: Objective) -> f64 {
        match objective {
            Objective::ReturnPct => self.total_return_pct,
            Objective::SharpeRatio => self.sharpe_ratio,
            Objective::CalmarRatio => self.calmar_ratio,
            Objective::WinRate => self.win_rate,
            Objective::ProfitFactor => self.profit_factor,
        }
    }
}

/// `(final / initial - 1) × 100`. Zero when initial equity is zero.
pub fn total_return_pct(initial_equity: f64, final_equity: f64) -> f64 {
    if initial_equity <= 0.0 {
        return 0.0;
    }
    (final_equity / initial_equity - 1.0) * 100.0
}

/// Compound annual growth rate in percent, from the bar count of the run.
pub fn annualized_return_pct(initial_equity: f64, final_equity: f64, bars: usize) -> f64 {
    if initial_equity <= 0.0 || final_equity <= 0.0 || bars < 2 {
        return 0.0;
    }
    let years = bars as f64 / TRADING_DAYS_PER_YEAR;
    ((final_equity / initial_equity).powf(1.0 / years) - 1.0) * 100.0
}

/// Annualized Sharpe ratio: `mean(daily returns) / stdev × √252`.
/// Defined as 0 (not NaN) when the standard deviation is zero.
pub fn sharpe_ratio(equity_curve: &[EquityPoint]) -> f64 {
    let returns = equity_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let std_dev = stdev_sample(&returns);
    if std_dev < 1e-12 {
        return 0.0;
    }
    (mean / std_dev) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Largest peak-to-trough decline in percent over the curve.
pub fn max_drawdown_pct(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        let equity = point.equity.to_f64().unwrap_or(0.0);
        if equity > peak {
            peak = equity;
        }
        if peak > 0.0 {
            let dd = (peak - equity) / peak * 100.0;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// `annualized return / |max drawdown|`; 0 when drawdown is 0.
pub fn calmar_ratio(annualized_return_pct: f64, max_drawdown_pct: f64) -> f64 {
    if max_drawdown_pct == 0.0 {
        return 0.0;
    }
    annualized_return_pct / max_drawdown_pct.abs()
}

/// Fraction of trades with positive realized P&L. Zero (not an error) when
/// there are no trades.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let wins = trades
        .iter()
        .filter(|t| t.realized_pnl > Decimal::ZERO)
        .count();
    wins as f64 / trades.len() as f64
}

/// `sum(gains) / |sum(losses)|`, capped at [`PROFIT_FACTOR_CAP`] when there
/// are gains and no losses. Zero when there are neither.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gains: Decimal = trades
        .iter()
        .filter(|t| t.realized_pnl > Decimal::ZERO)
        .map(|t| t.realized_pnl)
        .sum();
    let losses: Decimal = trades
        .iter()
        .filter(|t| t.realized_pnl < Decimal::ZERO)
        .map(|t| t.realized_pnl.abs())
        .sum();

    let gains = gains.to_f64().unwrap_or(0.0);
    let losses = losses.to_f64().unwrap_or(0.0);
    if losses > 0.0 {
        (gains / losses).min(PROFIT_FACTOR_CAP)
    } else if gains > 0.0 {
        PROFIT_FACTOR_CAP
    } else {
        0.0
    }
}
