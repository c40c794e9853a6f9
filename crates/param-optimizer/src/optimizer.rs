use std::time::{Duration, Instant};

use backtest_engine::{run_backtest, BacktestConfig};
use chrono::NaiveDate;
use perf_metrics::{Objective, PerformanceMetrics};
use price_cache::PriceCache;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use strategy_core::{EngineError, PriceHistoryProvider, SignalProvider};

use crate::space::{ParamConfig, ParameterSpace, SearchMethod};

/// Fraction of the date range used for training; the rest is held out.
const TRAIN_FRACTION: f64 = 0.75;

const LOW_OVERFIT_CEILING: f64 = 20.0;
const MODERATE_OVERFIT_CEILING: f64 = 40.0;

/// Advisory classification of a configuration's train/test degradation.
/// Metadata only: nothing is filtered on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverfitBand {
    Low,
    Moderate,
    High,
}

impl OverfitBand {
    pub fn classify(score: f64) -> Self {
        if score < LOW_OVERFIT_CEILING {
            OverfitBand::Low
        } else if score <= MODERATE_OVERFIT_CEILING {
            OverfitBand::Moderate
        } else {
            OverfitBand::High
        }
    }
}

/// Train/test degradation in percent of the train result. Zero when the
/// train return is zero: no degradation is possible from a zero baseline.
pub fn overfit_score(train_return: f64, test_return: f64) -> f64 {
    if train_return == 0.0 {
        return 0.0;
    }
    (train_return - test_return) / train_return.abs() * 100.0
}

/// Contiguous 75/25 split of `[start, end]`. Returns
/// `(train_end, test_start)`; the two sub-ranges never overlap and the test
/// range always starts the day after training ends.
pub fn split_train_test(start: NaiveDate, end: NaiveDate) -> (NaiveDate, NaiveDate) {
    let total_days = (end - start).num_days().max(0);
    let train_days = (total_days as f64 * TRAIN_FRACTION).floor() as i64;
    let train_end = start + chrono::Duration::days(train_days);
    (train_end, train_end + chrono::Duration::days(1))
}

/// One configuration's scored outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub parameters: ParamConfig,
    pub train_metrics: PerformanceMetrics,
    pub test_metrics: PerformanceMetrics,
    pub train_objective: f64,
    pub test_objective: f64,
    pub overfit_score: f64,
    pub overfit_band: OverfitBand,
}

/// A configuration that could not be evaluated. Recorded, never fatal to
/// the sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFailure {
    pub parameters: ParamConfig,
    pub reason: String,
}

/// Inputs to one optimization sweep. `base` carries the symbol, full date
/// range and any parameters not being searched over.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub base: BacktestConfig,
    pub space: ParameterSpace,
    pub method: SearchMethod,
    pub objective: Objective,
    /// Seeds configuration generation so random searches replay exactly.
    pub seed: u64,
    /// Wall-clock budget, checked between configuration runs. Configurations
    /// reached after expiry are recorded as failures, not silently dropped.
    pub deadline: Option<Duration>,
}

/// Everything a finished sweep produced: every evaluated configuration
/// ranked descending by the test objective, plus the recorded failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationReport {
    pub objective: Objective,
    pub results: Vec<OptimizationResult>,
    pub failures: Vec<ConfigFailure>,
}

/// Condensed view for callers that only want the winner: best parameters,
/// aggregate statistics, and the top of the ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationSummary {
    pub best_parameters: Option<ParamConfig>,
    pub evaluated: usize,
    pub failed: usize,
    pub mean_test_objective: f64,
    pub mean_overfit_score: f64,
    pub top_configurations: Vec<OptimizationResult>,
    pub failures: Vec<ConfigFailure>,
}

const TOP_CONFIGURATIONS: usize = 10;

/// Searches a parameter space with train/test validation. Configurations
/// are independent, so the sweep fans out across the rayon pool; results
/// are re-ranked deterministically afterwards.
pub struct Optimizer {
    config: OptimizerConfig,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        prices: &dyn PriceHistoryProvider,
        signals: &dyn SignalProvider,
        cache: &PriceCache,
    ) -> Result<OptimizationReport, EngineError> {
        let config = &self.config;
        config.space.validate()?;
        if config.base.start >= config.base.end {
            return Err(EngineError::InvalidDateRange {
                start: config.base.start,
                end: config.base.end,
            });
        }
        if let SearchMethod::Random { iterations } = config.method {
            if iterations == 0 {
                return Err(EngineError::InvalidParameter(
                    "random search needs at least one iteration".to_string(),
                ));
            }
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let candidates = config.space.generate(config.method, &mut rng);
        let (train_end, test_start) = split_train_test(config.base.start, config.base.end);

        tracing::info!(
            symbol = %config.base.symbol,
            candidates = candidates.len(),
            train_end = %train_end,
            test_start = %test_start,
            "starting parameter sweep"
        );

        let started = Instant::now();
        let outcomes: Vec<Result<OptimizationResult, ConfigFailure>> = candidates
            .into_par_iter()
            .map(|candidate| {
                if let Some(deadline) = config.deadline {
                    if started.elapsed() >= deadline {
                        return Err(ConfigFailure {
                            parameters: candidate,
                            reason: "wall-clock deadline exceeded".to_string(),
                        });
                    }
                }
                self.evaluate(candidate, train_end, test_start, prices, signals, cache)
            })
            .collect();

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(failure) => {
                    tracing::warn!(
                        reason = %failure.reason,
                        "configuration dropped from sweep"
                    );
                    failures.push(failure);
                }
            }
        }

        // Descending by held-out objective; NaN sinks to the bottom
        results.sort_by(|a, b| {
            b.test_objective
                .partial_cmp(&a.test_objective)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        tracing::info!(
            evaluated = results.len(),
            failed = failures.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "parameter sweep finished"
        );

        Ok(OptimizationReport {
            objective: config.objective,
            results,
            failures,
        })
    }

    /// Run one candidate on the train range, then the test range. Any error
    /// along the way turns into this candidate's recorded failure.
    fn evaluate(
        &self,
        candidate: ParamConfig,
        train_end: NaiveDate,
        test_start: NaiveDate,
        prices: &dyn PriceHistoryProvider,
        signals: &dyn SignalProvider,
        cache: &PriceCache,
    ) -> Result<OptimizationResult, ConfigFailure> {
        let config = &self.config;
        let fail = |reason: EngineError| ConfigFailure {
            parameters: candidate.clone(),
            reason: reason.to_string(),
        };

        let mut train_config = config.base.clone();
        train_config.end = train_end;
        candidate.apply(&mut train_config).map_err(fail)?;

        let mut test_config = train_config.clone();
        test_config.start = test_start;
        test_config.end = config.base.end;

        let train = run_backtest(prices, signals, cache, train_config).map_err(fail)?;
        let test = run_backtest(prices, signals, cache, test_config).map_err(fail)?;

        let train_objective = train.metrics.value_for(config.objective);
        let test_objective = test.metrics.value_for(config.objective);
        let score = overfit_score(
            train.metrics.total_return_pct,
            test.metrics.total_return_pct,
        );

        Ok(OptimizationResult {
            parameters: candidate,
            train_metrics: train.metrics,
            test_metrics: test.metrics,
            train_objective,
            test_objective,
            overfit_score: score,
            overfit_band: OverfitBand::classify(score),
        })
    }
}

/// Sweep the space and condense the ranking for callers that only need the
/// winning parameters and headline statistics.
pub fn optimize_parameters(
    prices: &dyn PriceHistoryProvider,
    signals: &dyn SignalProvider,
    cache: &PriceCache,
    config: OptimizerConfig,
) -> Result<OptimizationSummary, EngineError> {
    let report = Optimizer::new(config).run(prices, signals, cache)?;

    let evaluated = report.results.len();
    let mean = |f: fn(&OptimizationResult) -> f64| {
        if evaluated == 0 {
            0.0
        } else {
            report.results.iter().map(f).sum::<f64>() / evaluated as f64
        }
    };

    Ok(OptimizationSummary {
        best_parameters: report.results.first().map(|r| r.parameters.clone()),
        evaluated,
        failed: report.failures.len(),
        mean_test_objective: mean(|r| r.test_objective),
        mean_overfit_score: mean(|r| r.overfit_score),
        top_configurations: report
            .results
            .iter()
            .take(TOP_CONFIGURATIONS)
            .cloned()
            .collect(),
        failures: report.failures,
    })
}
