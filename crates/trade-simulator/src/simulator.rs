use chrono::NaiveDate;
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use strategy_core::{EngineError, EquityPoint, ExitReason, PriceBar, Signal, SignalAction, Trade};

use crate::account::{Account, AccountConfig, Position};
use crate::order::{Order, OrderKind, OrderSide, OrderStatus};

/// Why a signal produced no order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    BelowConfidenceThreshold,
    OrderPending,
    AlreadyInPosition,
    NoOpenPosition,
    InsufficientCash,
    FinalBar,
}

/// Everything observable that happened inside one simulated step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepEvent {
    OrderPlaced(Order),
    OrderFilled {
        order_id: u64,
        fill_price: Decimal,
        quantity: Decimal,
    },
    OrderCancelled {
        order_id: u64,
    },
    OrderExpired {
        order_id: u64,
    },
    PositionOpened {
        symbol: String,
        quantity: Decimal,
        entry_price: Decimal,
    },
    PositionClosed(Trade),
    SignalSkipped {
        reason: SkipReason,
    },
}

/// Advances one account bar by bar, applying order semantics and realistic
/// cash accounting. Deterministic: the order of operations inside `step` is
/// fixed, and no operation looks at future bars.
pub struct TradingSimulator {
    config: AccountConfig,
}

impl TradingSimulator {
    pub fn new(config: AccountConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Initialize an account at the configured starting capital.
    pub fn open(&self) -> Result<Account, EngineError> {
        Account::new(self.config.initial_capital)
    }

    /// Advance the account by exactly one bar.
    ///
    /// Fixed order of operations:
    /// 1. Mark the open position to `bar.close` for equity accounting.
    /// 2. Check stop-loss, then take-profit, against the bar's low/high.
    ///    Stop-loss wins a same-bar tie: the worse outcome is assumed to
    ///    occur first intraday. Fills at the threshold price.
    /// 3. Resolve resting limit/stop orders against the bar's range.
    /// 4. Apply the signal (generated as of the previous bar's close, so
    ///    entries fill at this bar's open — never the signal bar).
    /// 5. Record one equity-curve point.
    pub fn step(
        &self,
        account: &mut Account,
        bar: &PriceBar,
        signal: Option<&Signal>,
    ) -> Vec<StepEvent> {
        let mut events = Vec::new();

        self.check_exit_thresholds(account, bar, &mut events);
        self.resolve_pending_orders(account, bar, &mut events);

        if let Some(signal) = signal {
            self.apply_signal(account, bar, signal, &mut events);
        }

        account.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: account.equity(bar.close),
        });

        events
    }

    /// Advance the account by the last bar of the range.
    ///
    /// Exits still apply (stop-loss, take-profit, sell signals), but nothing
    /// may *enter* here: a position opened on the final bar would be
    /// liquidated by `close_all` at that same bar's close, minting a trade
    /// whose exit timestamp equals its entry. Buy signals are skipped and
    /// resting orders cancelled instead.
    pub fn step_final(
        &self,
        account: &mut Account,
        bar: &PriceBar,
        signal: Option<&Signal>,
    ) -> Vec<StepEvent> {
        let mut events = Vec::new();

        self.check_exit_thresholds(account, bar, &mut events);

        for order in &mut account.pending_orders {
            order.status = OrderStatus::Cancelled;
            events.push(StepEvent::OrderCancelled { order_id: order.id });
        }
        account.pending_orders.clear();

        if let Some(signal) = signal {
            if signal.action == SignalAction::Buy {
                events.push(StepEvent::SignalSkipped {
                    reason: SkipReason::FinalBar,
                });
            } else {
                self.apply_signal(account, bar, signal, &mut events);
            }
        }

        account.equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: account.equity(bar.close),
        });

        events
    }

    /// Force-liquidate any open position at the final bar's close so it still
    /// contributes to measured performance. A no-op on a flat account: no
    /// spurious trade is created.
    pub fn close_all(&self, account: &mut Account, final_bar: &PriceBar) -> Vec<StepEvent> {
        let mut events = Vec::new();

        for order in &mut account.pending_orders {
            order.status = OrderStatus::Cancelled;
            events.push(StepEvent::OrderCancelled { order_id: order.id });
        }
        account.pending_orders.clear();

        if let Some(position) = account.open_positions.remove(&self.config.symbol) {
            let trade = close_position(
                account,
                position,
                final_bar.close,
                final_bar.timestamp,
                ExitReason::EndOfRange,
            );
            events.push(StepEvent::PositionClosed(trade));
        }
        events
    }

    /// Place a resting stop order directly (used by callers that manage
    /// exits outside the signal flow).
    pub fn place_stop_order(
        &self,
        account: &mut Account,
        side: OrderSide,
        stop_price: Decimal,
        quantity: Decimal,
        created_at: NaiveDate,
    ) -> Order {
        let order = Order {
            id: account.next_order_id(),
            symbol: self.config.symbol.clone(),
            side,
            kind: OrderKind::Stop(stop_price),
            quantity,
            created_at,
            status: OrderStatus::Pending,
            bars_remaining: self.config.order_expiry_bars,
        };
        account.pending_orders.push(order.clone());
        order
    }

    /// Adjust the open position toward `target_value` at the bar's open,
    /// regardless of any signal. Used by the portfolio rebalancer; a sell
    /// delta may trim or fully close the position.
    pub fn adjust_position_value(
        &self,
        account: &mut Account,
        bar: &PriceBar,
        target_value: Decimal,
    ) -> Vec<StepEvent> {
        let mut events = Vec::new();
        let price = bar.open;
        if price <= Decimal::ZERO {
            return events;
        }

        let current_value = account
            .position(&self.config.symbol)
            .map(|p| p.market_value(price))
            .unwrap_or(Decimal::ZERO);
        let delta = target_value - current_value;

        if delta > Decimal::ZERO {
            let spend = delta.min(account.cash);
            let quantity = self.round_quantity(spend / price);
            if quantity > Decimal::ZERO {
                self.execute_buy(account, price, quantity, bar.timestamp, &mut events);
            }
        } else if delta < Decimal::ZERO {
            if let Some(position) = account.open_positions.remove(&self.config.symbol) {
                let sell_quantity = self.round_quantity((-delta) / price).min(position.quantity);
                if sell_quantity <= Decimal::ZERO {
                    account
                        .open_positions
                        .insert(self.config.symbol.clone(), position);
                } else if sell_quantity == position.quantity {
                    let trade = close_position(
                        account,
                        position,
                        price,
                        bar.timestamp,
                        ExitReason::Rebalance,
                    );
                    events.push(StepEvent::PositionClosed(trade));
                } else {
                    let (trade, remainder) =
                        trim_position(account, position, sell_quantity, price, bar.timestamp);
                    account
                        .open_positions
                        .insert(self.config.symbol.clone(), remainder);
                    events.push(StepEvent::PositionClosed(trade));
                }
            }
        }
        events
    }

    // --- step internals ---

    /// Stop-loss is checked before take-profit on the same bar. Conservative
    /// tie-break: when a single bar spans both thresholds, the loss exit is
    /// taken.
    fn check_exit_thresholds(
        &self,
        account: &mut Account,
        bar: &PriceBar,
        events: &mut Vec<StepEvent>,
    ) {
        let Some(position) = account.position(&self.config.symbol) else {
            return;
        };

        let stop = position.stop_loss_price().filter(|sl| bar.low <= *sl);
        let take = position.take_profit_price().filter(|tp| bar.high >= *tp);

        let (exit_price, reason) = match (stop, take) {
            (Some(sl), _) => (sl, ExitReason::StopLoss),
            (None, Some(tp)) => (tp, ExitReason::TakeProfit),
            (None, None) => return,
        };

        let position = account
            .open_positions
            .remove(&self.config.symbol)
            .expect("position checked above");
        let trade = close_position(account, position, exit_price, bar.timestamp, reason);
        events.push(StepEvent::PositionClosed(trade));
    }

    fn resolve_pending_orders(
        &self,
        account: &mut Account,
        bar: &PriceBar,
        events: &mut Vec<StepEvent>,
    ) {
        let pending = std::mem::take(&mut account.pending_orders);
        for mut order in pending {
            if let Some(fill_price) = order.triggered_fill(bar.low, bar.high) {
                match order.side {
                    OrderSide::Buy => {
                        if let Some(quantity) =
                            self.fill_entry(account, fill_price, order.quantity, bar.timestamp, events)
                        {
                            order.status = OrderStatus::Filled;
                            events.push(StepEvent::OrderFilled {
                                order_id: order.id,
                                fill_price,
                                quantity,
                            });
                        } else {
                            order.status = OrderStatus::Cancelled;
                            events.push(StepEvent::OrderCancelled { order_id: order.id });
                        }
                    }
                    OrderSide::Sell => {
                        order.status = OrderStatus::Filled;
                        events.push(StepEvent::OrderFilled {
                            order_id: order.id,
                            fill_price,
                            quantity: order.quantity,
                        });
                        if let Some(position) =
                            account.open_positions.remove(&self.config.symbol)
                        {
                            let trade = close_position(
                                account,
                                position,
                                fill_price,
                                bar.timestamp,
                                ExitReason::Signal,
                            );
                            events.push(StepEvent::PositionClosed(trade));
                        }
                    }
                }
            } else {
                order.bars_remaining = order.bars_remaining.saturating_sub(1);
                if order.bars_remaining == 0 {
                    order.status = OrderStatus::Expired;
                    events.push(StepEvent::OrderExpired { order_id: order.id });
                } else {
                    account.pending_orders.push(order);
                }
            }
        }
    }

    fn apply_signal(
        &self,
        account: &mut Account,
        bar: &PriceBar,
        signal: &Signal,
        events: &mut Vec<StepEvent>,
    ) {
        if signal.action == SignalAction::Hold {
            return;
        }
        if signal.confidence < self.config.confidence_threshold {
            events.push(StepEvent::SignalSkipped {
                reason: SkipReason::BelowConfidenceThreshold,
            });
            return;
        }

        match signal.action {
            SignalAction::Buy => {
                if account.has_pending_orders() {
                    events.push(StepEvent::SignalSkipped {
                        reason: SkipReason::OrderPending,
                    });
                    return;
                }
                if account.position(&self.config.symbol).is_some() {
                    events.push(StepEvent::SignalSkipped {
                        reason: SkipReason::AlreadyInPosition,
                    });
                    return;
                }
                match signal.suggested_price {
                    Some(limit_price) => {
                        self.place_limit_entry(account, bar, limit_price, events)
                    }
                    None => self.market_entry(account, bar, events),
                }
            }
            SignalAction::Sell => {
                // A sell supersedes any unfilled entry order
                for order in &mut account.pending_orders {
                    order.status = OrderStatus::Cancelled;
                    events.push(StepEvent::OrderCancelled { order_id: order.id });
                }
                account.pending_orders.clear();

                match account.open_positions.remove(&self.config.symbol) {
                    Some(position) => {
                        let order = Order {
                            id: account.next_order_id(),
                            symbol: self.config.symbol.clone(),
                            side: OrderSide::Sell,
                            kind: OrderKind::Market,
                            quantity: position.quantity,
                            created_at: bar.timestamp,
                            status: OrderStatus::Filled,
                            bars_remaining: 0,
                        };
                        events.push(StepEvent::OrderPlaced(order.clone()));
                        events.push(StepEvent::OrderFilled {
                            order_id: order.id,
                            fill_price: bar.open,
                            quantity: position.quantity,
                        });
                        let trade = close_position(
                            account,
                            position,
                            bar.open,
                            bar.timestamp,
                            ExitReason::Signal,
                        );
                        events.push(StepEvent::PositionClosed(trade));
                    }
                    None => {
                        events.push(StepEvent::SignalSkipped {
                            reason: SkipReason::NoOpenPosition,
                        });
                    }
                }
            }
            SignalAction::Hold => unreachable!("handled above"),
        }
    }

    /// Market entry at the bar's open. Sized as
    /// `min(max_position_size × equity, cash) / open`.
    fn market_entry(&self, account: &mut Account, bar: &PriceBar, events: &mut Vec<StepEvent>) {
        let quantity = self.entry_quantity(account, bar);
        if quantity <= Decimal::ZERO {
            // Normal market condition, not a fault: skip and log
            tracing::debug!(
                symbol = %self.config.symbol,
                date = %bar.timestamp,
                "insufficient cash for minimum position, signal skipped"
            );
            events.push(StepEvent::SignalSkipped {
                reason: SkipReason::InsufficientCash,
            });
            return;
        }

        let order = Order {
            id: account.next_order_id(),
            symbol: self.config.symbol.clone(),
            side: OrderSide::Buy,
            kind: OrderKind::Market,
            quantity,
            created_at: bar.timestamp,
            status: OrderStatus::Filled,
            bars_remaining: 0,
        };
        events.push(StepEvent::OrderPlaced(order.clone()));
        events.push(StepEvent::OrderFilled {
            order_id: order.id,
            fill_price: bar.open,
            quantity,
        });
        self.execute_buy(account, bar.open, quantity, bar.timestamp, events);
    }

    fn place_limit_entry(
        &self,
        account: &mut Account,
        bar: &PriceBar,
        limit_price: Decimal,
        events: &mut Vec<StepEvent>,
    ) {
        if limit_price <= Decimal::ZERO {
            return;
        }
        let equity = account.equity(bar.close);
        let max_value = Decimal::from_f64(self.config.max_position_size).unwrap_or(Decimal::ZERO)
            * equity;
        let quantity = self.round_quantity(max_value.min(account.cash) / limit_price);
        if quantity <= Decimal::ZERO {
            tracing::debug!(
                symbol = %self.config.symbol,
                date = %bar.timestamp,
                "insufficient cash for limit entry, signal skipped"
            );
            events.push(StepEvent::SignalSkipped {
                reason: SkipReason::InsufficientCash,
            });
            return;
        }
        let order = Order {
            id: account.next_order_id(),
            symbol: self.config.symbol.clone(),
            side: OrderSide::Buy,
            kind: OrderKind::Limit(limit_price),
            quantity,
            created_at: bar.timestamp,
            status: OrderStatus::Pending,
            bars_remaining: self.config.order_expiry_bars,
        };
        account.pending_orders.push(order.clone());
        events.push(StepEvent::OrderPlaced(order));
    }

    /// Fill a resting buy order. Quantity was sized at placement; cap it to
    /// what cash still affords at the fill price. Returns the filled
    /// quantity, or `None` when cash was exhausted in the meantime.
    fn fill_entry(
        &self,
        account: &mut Account,
        fill_price: Decimal,
        quantity: Decimal,
        date: NaiveDate,
        events: &mut Vec<StepEvent>,
    ) -> Option<Decimal> {
        if fill_price <= Decimal::ZERO {
            return None;
        }
        let affordable = self.round_quantity(account.cash / fill_price);
        let quantity = quantity.min(affordable);
        if quantity <= Decimal::ZERO {
            tracing::debug!(
                symbol = %self.config.symbol,
                date = %date,
                "cash exhausted before resting order filled, fill skipped"
            );
            return None;
        }
        self.execute_buy(account, fill_price, quantity, date, events);
        Some(quantity)
    }

    fn execute_buy(
        &self,
        account: &mut Account,
        price: Decimal,
        quantity: Decimal,
        date: NaiveDate,
        events: &mut Vec<StepEvent>,
    ) {
        let cost = price * quantity;
        debug_assert!(cost <= account.cash, "orders are sized against cash");
        account.cash -= cost;

        match account.open_positions.get_mut(&self.config.symbol) {
            Some(position) => {
                // Increase: weighted average entry
                let total_cost =
                    position.avg_entry_price * position.quantity + price * quantity;
                position.quantity += quantity;
                position.avg_entry_price = total_cost / position.quantity;
            }
            None => {
                account.open_positions.insert(
                    self.config.symbol.clone(),
                    Position {
                        symbol: self.config.symbol.clone(),
                        quantity,
                        avg_entry_price: price,
                        opened_at: date,
                        stop_loss_pct: self.config.stop_loss_pct,
                        take_profit_pct: self.config.take_profit_pct,
                    },
                );
            }
        }
        events.push(StepEvent::PositionOpened {
            symbol: self.config.symbol.clone(),
            quantity,
            entry_price: price,
        });
    }

    fn entry_quantity(&self, account: &Account, bar: &PriceBar) -> Decimal {
        if bar.open <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let equity = account.equity(bar.close);
        let max_value =
            Decimal::from_f64(self.config.max_position_size).unwrap_or(Decimal::ZERO) * equity;
        self.round_quantity(max_value.min(account.cash) / bar.open)
    }

    fn round_quantity(&self, quantity: Decimal) -> Decimal {
        if self.config.fractional_shares {
            quantity
        } else {
            quantity.floor()
        }
    }
}

/// Remove cash/P&L effects of a full close and mint the immutable trade
/// record. The position is already detached from the account.
fn close_position(
    account: &mut Account,
    position: Position,
    exit_price: Decimal,
    exit_at: NaiveDate,
    exit_reason: ExitReason,
) -> Trade {
    let proceeds = exit_price * position.quantity;
    let realized_pnl = (exit_price - position.avg_entry_price) * position.quantity;
    account.cash += proceeds;
    account.realized_pnl_total += realized_pnl;

    let entry = position.avg_entry_price.to_f64().unwrap_or(0.0);
    let exit = exit_price.to_f64().unwrap_or(0.0);
    let pnl_pct = if entry > 0.0 {
        (exit / entry - 1.0) * 100.0
    } else {
        0.0
    };

    let trade = Trade {
        symbol: position.symbol,
        entry_price: position.avg_entry_price,
        exit_price,
        entry_at: position.opened_at,
        exit_at,
        quantity: position.quantity,
        realized_pnl,
        pnl_pct,
        exit_reason,
    };
    account.closed_trades.push(trade.clone());
    trade
}

/// Partial close for rebalancing: sells `sell_quantity` and returns the
/// trade record plus the surviving position.
fn trim_position(
    account: &mut Account,
    mut position: Position,
    sell_quantity: Decimal,
    exit_price: Decimal,
    exit_at: NaiveDate,
) -> (Trade, Position) {
    let proceeds = exit_price * sell_quantity;
    let realized_pnl = (exit_price - position.avg_entry_price) * sell_quantity;
    account.cash += proceeds;
    account.realized_pnl_total += realized_pnl;

    let entry = position.avg_entry_price.to_f64().unwrap_or(0.0);
    let exit = exit_price.to_f64().unwrap_or(0.0);
    let pnl_pct = if entry > 0.0 {
        (exit / entry - 1.0) * 100.0
    } else {
        0.0
    };

    let trade = Trade {
        symbol: position.symbol.clone(),
        entry_price: position.avg_entry_price,
        exit_price,
        entry_at: position.opened_at,
        exit_at,
        quantity: sell_quantity,
        realized_pnl,
        pnl_pct,
        exit_reason: ExitReason::Rebalance,
    };
    account.closed_trades.push(trade.clone());
    position.quantity -= sell_quantity;
    (trade, position)
}
