pub mod engine;
pub mod models;


pub use engine::{run_backtest, BacktestEngine};
pub use models::{BacktestConfig, BacktestResult};
