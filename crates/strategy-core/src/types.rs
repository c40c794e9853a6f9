use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single OHLCV bar. Owned by the cache layer; engines hold read-only slices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: f64,
}

/// What the strategy wants to do at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

/// A trading signal produced by the external signal provider.
///
/// Consumed once per simulated step and never mutated. `confidence` is in
/// `[0, 1]`; a signal below the account's confidence threshold is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: NaiveDate,
    pub action: SignalAction,
    pub confidence: f64,
    /// When present, entries are placed as limit orders at this price.
    #[serde(default)]
    pub suggested_price: Option<Decimal>,
}

/// Bar granularity requested from the price history provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Minute,
    Hour,
    Day,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Minute => "minute",
            Granularity::Hour => "hour",
            Granularity::Day => "day",
        }
    }
}

/// How often the portfolio backtester rebalances toward target weights.
///
/// Boundaries are calendar-defined (day/ISO-week/month/quarter crossings of
/// the bar timestamp), not elapsed-bar counts, so gaps in trading days never
/// silently skip a rebalance window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
}

impl RebalanceFrequency {
    /// True when moving from `prev` to `curr` crosses a period boundary.
    pub fn crosses_boundary(&self, prev: NaiveDate, curr: NaiveDate) -> bool {
        use chrono::Datelike;
        if curr <= prev {
            return false;
        }
        match self {
            RebalanceFrequency::Daily => curr != prev,
            RebalanceFrequency::Weekly => {
                let pw = prev.iso_week();
                let cw = curr.iso_week();
                (cw.year(), cw.week()) != (pw.year(), pw.week())
            }
            RebalanceFrequency::Monthly => {
                (curr.year(), curr.month()) != (prev.year(), prev.month())
            }
            RebalanceFrequency::Quarterly => {
                let q = |d: NaiveDate| (d.year(), (d.month() - 1) / 3);
                q(curr) != q(prev)
            }
        }
    }
}

/// Per-symbol target weight at a rebalance date. Weights over the active
/// symbols sum to at most 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationWeight {
    pub symbol: String,
    pub weight: f64,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    EndOfRange,
    Rebalance,
}

/// Immutable record of a completed round-trip trade. Created exactly once,
/// at position close, and never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub entry_at: NaiveDate,
    pub exit_at: NaiveDate,
    pub quantity: Decimal,
    pub realized_pnl: Decimal,
    pub pnl_pct: f64,
    pub exit_reason: ExitReason,
}

/// A point on an account's equity curve. Equity is cash plus the
/// mark-to-market value of open positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDate,
    pub equity: Decimal,
}
