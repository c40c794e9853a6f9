use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;
use perf_metrics::PerformanceMetrics;
use price_cache::PriceCache;
use rust_decimal::prelude::*;
use strategy_core::{
    check_bar_quality, EngineError, EquityPoint, PriceBar, PriceHistoryProvider, Signal,
    SignalProvider, Trade, MIN_BARS,
};
use trade_simulator::{Account, TradingSimulator};

use crate::allocation::{compute_weights, SymbolSnapshot};
use crate::models::{PortfolioConfig, PortfolioResult, SymbolPerformance};

const MIN_SYMBOLS: usize = 2;
const MAX_SYMBOLS: usize = 10;

/// One symbol's independent simulation state inside the portfolio.
struct Sleeve {
    symbol: String,
    simulator: TradingSimulator,
    account: Account,
    bars: Arc<Vec<PriceBar>>,
    /// Index of the next unprocessed bar.
    cursor: usize,
    /// Most recent close, used to mark the sleeve flat on calendar days
    /// where this symbol has no bar.
    last_close: Decimal,
    latest_signal: Option<Signal>,
    /// Daily close-to-close returns accumulated so far, for the
    /// volatility-aware allocation strategies.
    trailing_returns: Vec<f64>,
    last_close_f64: Option<f64>,
}

impl Sleeve {
    fn equity(&self) -> Decimal {
        self.account.equity(self.last_close)
    }

    fn bar_for(&self, date: NaiveDate) -> Option<&PriceBar> {
        self.bars
            .get(self.cursor)
            .filter(|bar| bar.timestamp == date)
    }
}

/// Runs N single-symbol simulations in lockstep over a shared calendar,
/// rebalancing toward allocation-strategy targets at calendar boundaries.
pub struct PortfolioBacktester {
    config: PortfolioConfig,
}

impl PortfolioBacktester {
    pub fn new(config: PortfolioConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        prices: &dyn PriceHistoryProvider,
        signals: &dyn SignalProvider,
        cache: &PriceCache,
    ) -> Result<PortfolioResult, EngineError> {
        let config = &self.config;
        let n = config.symbols.len();
        if !(MIN_SYMBOLS..=MAX_SYMBOLS).contains(&n) {
            return Err(EngineError::InvalidPortfolioSize(n));
        }
        if config.start >= config.end {
            return Err(EngineError::InvalidDateRange {
                start: config.start,
                end: config.end,
            });
        }

        let mut sleeves = self.open_sleeves(prices, cache)?;
        let calendar: BTreeSet<NaiveDate> = sleeves
            .iter()
            .flat_map(|s| s.bars.iter().map(|b| b.timestamp))
            .collect();

        tracing::info!(
            symbols = n,
            start = %config.start,
            end = %config.end,
            trading_days = calendar.len(),
            "starting portfolio backtest"
        );

        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(calendar.len());
        let mut contributions: Vec<Vec<f64>> = vec![Vec::with_capacity(calendar.len()); n];
        let mut prev_date: Option<NaiveDate> = None;
        let last_date = calendar.iter().next_back().copied();

        for &date in &calendar {
            // No rebalance on the final date: everything is liquidated at
            // its close, and a buy here would open and exit at the same
            // timestamp
            if Some(date) != last_date {
                if let Some(prev) = prev_date {
                    if config.rebalance.crosses_boundary(prev, date) {
                        self.rebalance(&mut sleeves, date);
                    }
                }
            }

            for sleeve in sleeves.iter_mut() {
                let Some(bar) = sleeve.bar_for(date) else {
                    continue;
                };
                let bar = bar.clone();
                let signal = if sleeve.cursor == 0 {
                    None
                } else {
                    Some(signals.predict(
                        &sleeve.symbol,
                        sleeve.bars[sleeve.cursor - 1].timestamp,
                        config.lookback_days,
                    )?)
                };
                if sleeve.cursor + 1 == sleeve.bars.len() {
                    sleeve
                        .simulator
                        .step_final(&mut sleeve.account, &bar, signal.as_ref());
                } else {
                    sleeve.simulator.step(&mut sleeve.account, &bar, signal.as_ref());
                }
                sleeve.latest_signal = signal;

                let close = bar.close.to_f64().unwrap_or(0.0);
                if let Some(prev_close) = sleeve.last_close_f64 {
                    if prev_close != 0.0 {
                        sleeve.trailing_returns.push((close - prev_close) / prev_close);
                    }
                }
                sleeve.last_close_f64 = Some(close);
                sleeve.last_close = bar.close;
                sleeve.cursor += 1;
            }

            // Sleeves without a bar today hold their prior mark flat
            let total: Decimal = sleeves.iter().map(Sleeve::equity).sum();
            for (sleeve, series) in sleeves.iter().zip(contributions.iter_mut()) {
                series.push(sleeve.equity().to_f64().unwrap_or(0.0));
            }
            equity_curve.push(EquityPoint {
                timestamp: date,
                equity: total,
            });
            prev_date = Some(date);
        }

        for sleeve in sleeves.iter_mut() {
            if let Some(final_bar) = sleeve.bars.last() {
                let final_bar = final_bar.clone();
                sleeve.simulator.close_all(&mut sleeve.account, &final_bar);
            }
        }

        let final_equity: Decimal = sleeves.iter().map(Sleeve::equity).sum();
        let correlation_matrix = correlation_from_contributions(&contributions);

        let mut all_trades: Vec<Trade> = Vec::new();
        let mut per_symbol = Vec::with_capacity(n);
        for sleeve in sleeves {
            let metrics = PerformanceMetrics::compute(
                &sleeve.account.equity_curve,
                &sleeve.account.closed_trades,
                sleeve.simulator.config().initial_capital,
            );
            all_trades.extend(sleeve.account.closed_trades.iter().cloned());
            per_symbol.push(SymbolPerformance {
                symbol: sleeve.symbol,
                final_equity: sleeve.account.equity(sleeve.last_close),
                trades: sleeve.account.closed_trades,
                metrics,
            });
        }
        all_trades.sort_by_key(|t| t.exit_at);

        let metrics =
            PerformanceMetrics::compute(&equity_curve, &all_trades, config.initial_capital);

        tracing::info!(
            symbols = n,
            trades = all_trades.len(),
            return_pct = metrics.total_return_pct,
            "portfolio backtest finished"
        );

        Ok(PortfolioResult {
            symbols: config.symbols.clone(),
            start: config.start,
            end: config.end,
            initial_capital: config.initial_capital,
            final_equity,
            equity_curve,
            per_symbol,
            correlation_matrix,
            metrics,
        })
    }

    /// Fetch each symbol's bars and seed its account with an equal share of
    /// the starting capital. The last sleeve absorbs the division remainder
    /// so the shares sum exactly to the configured capital.
    fn open_sleeves(
        &self,
        prices: &dyn PriceHistoryProvider,
        cache: &PriceCache,
    ) -> Result<Vec<Sleeve>, EngineError> {
        let config = &self.config;
        let n = config.symbols.len();
        let share = (config.initial_capital / Decimal::from(n as u64)).round_dp(2);

        let mut sleeves = Vec::with_capacity(n);
        for (i, symbol) in config.symbols.iter().enumerate() {
            let bars = cache.get_bars(
                prices,
                symbol,
                config.start,
                config.end,
                config.granularity,
            )?;
            if bars.len() < MIN_BARS {
                return Err(EngineError::InsufficientData(format!(
                    "{} bars for {} in [{}, {}], need at least {}",
                    bars.len(),
                    symbol,
                    config.start,
                    config.end,
                    MIN_BARS
                )));
            }
            let quality = check_bar_quality(&bars);
            if !quality.warnings.is_empty() {
                tracing::debug!(
                    symbol = %symbol,
                    warnings = quality.warnings.len(),
                    "bar quality issues in portfolio series"
                );
            }

            let capital = if i == n - 1 {
                config.initial_capital - share * Decimal::from((n - 1) as u64)
            } else {
                share
            };
            let simulator = TradingSimulator::new(config.account_config(symbol, capital));
            let account = simulator.open()?;
            let last_close = bars.first().map(|b| b.open).unwrap_or(Decimal::ZERO);
            sleeves.push(Sleeve {
                symbol: symbol.clone(),
                simulator,
                account,
                bars,
                cursor: 0,
                last_close,
                latest_signal: None,
                trailing_returns: Vec::new(),
                last_close_f64: None,
            });
        }
        Ok(sleeves)
    }

    /// Realize allocation targets at this morning's opens. Sells run first so
    /// their proceeds can fund buys in other sleeves; cash is then pooled,
    /// granted to buyers, and the remainder redistributed equally so every
    /// sleeve can still act on its own signals between rebalances.
    fn rebalance(&self, sleeves: &mut [Sleeve], date: NaiveDate) {
        let config = &self.config;

        let weights = {
            let snapshots: Vec<SymbolSnapshot<'_>> = sleeves
                .iter()
                .map(|s| SymbolSnapshot {
                    symbol: &s.symbol,
                    latest_signal: s.latest_signal.as_ref(),
                    has_position: s.account.position(&s.symbol).is_some(),
                    trailing_returns: &s.trailing_returns,
                })
                .collect();
            compute_weights(config.allocation, &snapshots, config.volatility_window)
        };

        let portfolio_equity: Decimal = sleeves
            .iter()
            .map(|s| {
                // Mark at today's open when the symbol trades today
                let mark = s.bar_for(date).map(|b| b.open).unwrap_or(s.last_close);
                s.account.equity(mark)
            })
            .sum();
        if portfolio_equity <= Decimal::ZERO {
            return;
        }

        let targets: Vec<Decimal> = weights
            .iter()
            .map(|w| {
                Decimal::from_f64(w.weight).unwrap_or(Decimal::ZERO) * portfolio_equity
            })
            .collect();

        tracing::debug!(
            date = %date,
            equity = %portfolio_equity,
            "rebalancing toward target weights"
        );

        // Pass 1: trims and closes free up cash
        for (sleeve, &target) in sleeves.iter_mut().zip(&targets) {
            let Some(bar) = sleeve.bar_for(date) else {
                continue;
            };
            let bar = bar.clone();
            let current = sleeve
                .account
                .position(&sleeve.symbol)
                .map(|p| p.market_value(bar.open))
                .unwrap_or(Decimal::ZERO);
            if target < current {
                sleeve
                    .simulator
                    .adjust_position_value(&mut sleeve.account, &bar, target);
            }
        }

        // Pass 2: pool all cash, grant what each buyer needs
        let mut pool = Decimal::ZERO;
        for sleeve in sleeves.iter_mut() {
            pool += sleeve.account.cash;
            sleeve.account.cash = Decimal::ZERO;
        }
        for (sleeve, &target) in sleeves.iter_mut().zip(&targets) {
            let Some(bar) = sleeve.bar_for(date) else {
                continue;
            };
            let bar = bar.clone();
            let current = sleeve
                .account
                .position(&sleeve.symbol)
                .map(|p| p.market_value(bar.open))
                .unwrap_or(Decimal::ZERO);
            if target > current {
                let grant = (target - current).min(pool);
                pool -= grant;
                sleeve.account.cash = grant;
                sleeve
                    .simulator
                    .adjust_position_value(&mut sleeve.account, &bar, target);
                // Unspent grant (rounding to whole shares) returns to the pool
                pool += sleeve.account.cash;
                sleeve.account.cash = Decimal::ZERO;
            }
        }

        // Pass 3: split the residual cash evenly; the last sleeve takes the
        // division remainder so total cash is conserved exactly
        let n = sleeves.len();
        let share = (pool / Decimal::from(n as u64)).round_dp(6);
        for (i, sleeve) in sleeves.iter_mut().enumerate() {
            sleeve.account.cash += if i == n - 1 {
                pool - share * Decimal::from((n - 1) as u64)
            } else {
                share
            };
        }
    }
}

/// Pairwise Pearson correlation of per-symbol equity-contribution returns.
/// Symmetric with a unit diagonal by construction.
fn correlation_from_contributions(contributions: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = contributions.len();
    let returns: Vec<Vec<f64>> = contributions
        .iter()
        .map(|series| perf_metrics::daily_returns(series))
        .collect();

    let mut matrix = vec![vec![0.0; n]; n];
    for i in 0..n {
        matrix[i][i] = 1.0;
        for j in (i + 1)..n {
            let rho = perf_metrics::pearson(&returns[i], &returns[j]);
            matrix[i][j] = rho;
            matrix[j][i] = rho;
        }
    }
    matrix
}

/// Multi-symbol entry point consumed by the API layer.
pub fn run_portfolio_backtest(
    prices: &dyn PriceHistoryProvider,
    signals: &dyn SignalProvider,
    cache: &PriceCache,
    config: PortfolioConfig,
) -> Result<PortfolioResult, EngineError> {
    PortfolioBacktester::new(config).run(prices, signals, cache)
}
