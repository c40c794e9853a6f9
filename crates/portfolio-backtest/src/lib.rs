pub mod allocation;
pub mod models;
pub mod portfolio;


pub use allocation::{compute_weights, AllocationStrategy, SymbolSnapshot};
pub use models::{PortfolioConfig, PortfolioResult, SymbolPerformance};
pub use portfolio::{run_portfolio_backtest, PortfolioBacktester};
