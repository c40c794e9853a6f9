use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Fills at the open of the bar being stepped.
    Market,
    /// Buy fills when the bar trades down to the limit; sell when it trades
    /// up to it. Fills at the limit price.
    Limit(Decimal),
    /// Buy triggers when the bar trades up through the stop; sell when it
    /// trades down through it. Fills at the stop price.
    Stop(Decimal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
    Expired,
}

/// A simulated order. Created by the simulator when a signal passes the
/// confidence gate (or placed directly by the caller), resolved against
/// subsequent bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: u64,
    pub symbol: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub created_at: NaiveDate,
    pub status: OrderStatus,
    /// Bars left before a resting order expires. Market orders never rest.
    pub bars_remaining: u32,
}

impl Order {
    /// Whether this bar's trading range reaches the order's trigger price.
    /// Returns the fill price when it does.
    pub fn triggered_fill(&self, bar_low: Decimal, bar_high: Decimal) -> Option<Decimal> {
        match (self.kind, self.side) {
            (OrderKind::Limit(price), OrderSide::Buy) if bar_low <= price => Some(price),
            (OrderKind::Limit(price), OrderSide::Sell) if bar_high >= price => Some(price),
            (OrderKind::Stop(price), OrderSide::Buy) if bar_high >= price => Some(price),
            (OrderKind::Stop(price), OrderSide::Sell) if bar_low <= price => Some(price),
            _ => None,
        }
    }
}
