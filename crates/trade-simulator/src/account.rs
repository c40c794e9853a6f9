use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use strategy_core::{EngineError, EquityPoint, Trade};

use crate::order::Order;

/// Caller-supplied account parameters, fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountConfig {
    pub symbol: String,
    pub initial_capital: Decimal,
    /// Signals below this confidence are ignored.
    pub confidence_threshold: f64,
    /// Maximum fraction of equity committed to a single entry, in (0, 1].
    pub max_position_size: f64,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
    /// Bars a resting limit/stop entry order stays alive.
    pub order_expiry_bars: u32,
    /// Allow fractional share quantities. Off by default: entries round down
    /// to whole shares.
    pub fractional_shares: bool,
}

impl AccountConfig {
    pub fn new(symbol: impl Into<String>, initial_capital: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            initial_capital,
            confidence_threshold: 0.5,
            max_position_size: 1.0,
            stop_loss_pct: None,
            take_profit_pct: None,
            order_expiry_bars: 5,
            fractional_shares: false,
        }
    }
}

/// An open position. At most one per symbol per account; quantity and
/// average entry price stay strictly positive while the position is open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub avg_entry_price: Decimal,
    pub opened_at: NaiveDate,
    pub stop_loss_pct: Option<f64>,
    pub take_profit_pct: Option<f64>,
}

impl Position {
    pub fn market_value(&self, price: Decimal) -> Decimal {
        self.quantity * price
    }

    pub fn stop_loss_price(&self) -> Option<Decimal> {
        self.stop_loss_pct
            .and_then(|pct| Decimal::from_f64(1.0 - pct))
            .map(|factor| self.avg_entry_price * factor)
    }

    pub fn take_profit_price(&self) -> Option<Decimal> {
        self.take_profit_pct
            .and_then(|pct| Decimal::from_f64(1.0 + pct))
            .map(|factor| self.avg_entry_price * factor)
    }
}

/// One simulated account: cash, open positions, closed trades, equity curve
/// and any resting orders. Owned exclusively by one simulator instance and
/// threaded explicitly through every call — no ambient state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub cash: Decimal,
    pub realized_pnl_total: Decimal,
    pub open_positions: HashMap<String, Position>,
    pub closed_trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub pending_orders: Vec<Order>,
    pub(crate) next_order_id: u64,
}

impl Account {
    pub(crate) fn new(initial_capital: Decimal) -> Result<Self, EngineError> {
        if initial_capital <= Decimal::ZERO {
            return Err(EngineError::InvalidParameter(format!(
                "initial capital must be positive, got {initial_capital}"
            )));
        }
        Ok(Self {
            cash: initial_capital,
            realized_pnl_total: Decimal::ZERO,
            open_positions: HashMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
            pending_orders: Vec::new(),
            next_order_id: 1,
        })
    }

    /// Cash plus open positions marked at `mark_price`.
    pub fn equity(&self, mark_price: Decimal) -> Decimal {
        let positions_value: Decimal = self
            .open_positions
            .values()
            .map(|p| p.market_value(mark_price))
            .sum();
        self.cash + positions_value
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.open_positions.get(symbol)
    }

    pub fn has_pending_orders(&self) -> bool {
        !self.pending_orders.is_empty()
    }

    pub(crate) fn next_order_id(&mut self) -> u64 {
        let id = self.next_order_id;
        self.next_order_id += 1;
        id
    }
}
