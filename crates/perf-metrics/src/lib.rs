//! Pure, stateless performance math over equity curves and trade lists.
//! No I/O, no async, no external state.

pub mod metrics;
pub mod stats;

pub use metrics::{Objective, PerformanceMetrics, PROFIT_FACTOR_CAP, TRADING_DAYS_PER_YEAR};
pub use stats::{
    covariance_matrix, daily_returns, equity_returns, pearson, stdev_sample, trailing_volatility,
};
