use perf_metrics::PerformanceMetrics;
use price_cache::PriceCache;
use strategy_core::{
    check_bar_quality, EngineError, PriceHistoryProvider, SignalProvider, MIN_BARS,
};
use trade_simulator::TradingSimulator;

use crate::models::{BacktestConfig, BacktestResult};

/// Drives one trading simulator across a date range for one instrument.
///
/// The run is single-threaded and deterministic: bars are processed strictly
/// in chronological order, and the signal provider only ever sees the
/// trailing window ending at the bar *before* the one being simulated.
pub struct BacktestEngine {
    config: BacktestConfig,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        prices: &dyn PriceHistoryProvider,
        signals: &dyn SignalProvider,
        cache: &PriceCache,
    ) -> Result<BacktestResult, EngineError> {
        let config = &self.config;
        if config.start >= config.end {
            return Err(EngineError::InvalidDateRange {
                start: config.start,
                end: config.end,
            });
        }

        let bars = cache.get_bars(
            prices,
            &config.symbol,
            config.start,
            config.end,
            config.granularity,
        )?;
        if bars.len() < MIN_BARS {
            return Err(EngineError::InsufficientData(format!(
                "{} bars for {} in [{}, {}], need at least {}",
                bars.len(),
                config.symbol,
                config.start,
                config.end,
                MIN_BARS
            )));
        }
        let data_quality = check_bar_quality(&bars);

        tracing::info!(
            symbol = %config.symbol,
            start = %config.start,
            end = %config.end,
            bars = bars.len(),
            "starting backtest run"
        );

        let simulator = TradingSimulator::new(config.account_config());
        let mut account = simulator.open()?;

        for (i, bar) in bars.iter().enumerate() {
            // No signal for the very first bar: there is no prior close for
            // the provider to predict from.
            let signal = if i == 0 {
                None
            } else {
                Some(signals.predict(
                    &config.symbol,
                    bars[i - 1].timestamp,
                    config.lookback_days,
                )?)
            };
            if i + 1 == bars.len() {
                simulator.step_final(&mut account, bar, signal.as_ref());
            } else {
                simulator.step(&mut account, bar, signal.as_ref());
            }
        }

        let final_bar = bars.last().expect("length checked above");
        simulator.close_all(&mut account, final_bar);

        let metrics =
            PerformanceMetrics::compute(&account.equity_curve, &account.closed_trades, config.initial_capital);
        let final_equity = account
            .equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(config.initial_capital);

        tracing::info!(
            symbol = %config.symbol,
            trades = account.closed_trades.len(),
            return_pct = metrics.total_return_pct,
            "backtest run finished"
        );

        Ok(BacktestResult {
            symbol: config.symbol.clone(),
            start: config.start,
            end: config.end,
            initial_capital: config.initial_capital,
            final_equity,
            equity_curve: account.equity_curve,
            trades: account.closed_trades,
            metrics,
            data_quality,
        })
    }
}

/// Single-run entry point consumed by the API layer. Read-only and
/// side-effect-free apart from the two collaborator calls.
pub fn run_backtest(
    prices: &dyn PriceHistoryProvider,
    signals: &dyn SignalProvider,
    cache: &PriceCache,
    config: BacktestConfig,
) -> Result<BacktestResult, EngineError> {
    BacktestEngine::new(config).run(prices, signals, cache)
}
