pub mod account;
pub mod order;
pub mod simulator;

#[cfg(test)]
mod tests;

pub use account::{Account, AccountConfig, Position};
pub use order::{Order, OrderKind, OrderSide, OrderStatus};
pub use simulator::{SkipReason, StepEvent, TradingSimulator};
