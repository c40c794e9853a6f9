use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use strategy_core::{ExitReason, PriceBar, Signal, SignalAction};

use crate::account::AccountConfig;
use crate::order::{OrderKind, OrderStatus};
use crate::simulator::{SkipReason, StepEvent, TradingSimulator};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn bar(date: &str, open: f64, high: f64, low: f64, close: f64) -> PriceBar {
    PriceBar {
        timestamp: d(date),
        open: Decimal::from_f64(open).unwrap(),
        high: Decimal::from_f64(high).unwrap(),
        low: Decimal::from_f64(low).unwrap(),
        close: Decimal::from_f64(close).unwrap(),
        volume: 1_000_000.0,
    }
}

fn buy(date: &str, confidence: f64) -> Signal {
    Signal {
        timestamp: d(date),
        action: SignalAction::Buy,
        confidence,
        suggested_price: None,
    }
}

fn sell(date: &str, confidence: f64) -> Signal {
    Signal {
        timestamp: d(date),
        action: SignalAction::Sell,
        confidence,
        suggested_price: None,
    }
}

fn config() -> AccountConfig {
    AccountConfig {
        symbol: "AAPL".to_string(),
        initial_capital: dec!(10000),
        confidence_threshold: 0.6,
        max_position_size: 0.2,
        stop_loss_pct: None,
        take_profit_pct: None,
        order_expiry_bars: 5,
        fractional_shares: false,
    }
}

// Scenario from the sizing rule: $10,000 capital, Buy at confidence 0.9
// against threshold 0.6, max position 20%, fill bar opens at $100
// → 20 shares, $8,000 cash remaining.
#[test]
fn buy_signal_sizes_against_equity_and_cash() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let fill_bar = bar("2024-01-03", 100.0, 102.0, 99.0, 101.0);
    let events = sim.step(&mut account, &fill_bar, Some(&buy("2024-01-02", 0.9)));

    let position = account.position("AAPL").expect("position opened");
    assert_eq!(position.quantity, dec!(20));
    assert_eq!(position.avg_entry_price, dec!(100));
    assert_eq!(account.cash, dec!(8000));
    assert!(events
        .iter()
        .any(|e| matches!(e, StepEvent::PositionOpened { .. })));
}

#[test]
fn signal_below_threshold_is_ignored() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let events = sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.5)),
    );

    assert!(account.open_positions.is_empty());
    assert!(events.contains(&StepEvent::SignalSkipped {
        reason: SkipReason::BelowConfidenceThreshold
    }));
}

// Stop-loss scenario: 5% stop from a $100 entry arms at $95; a bar trading
// down to $94 force-closes at exactly $95.
#[test]
fn stop_loss_closes_at_threshold_price() {
    let mut cfg = config();
    cfg.stop_loss_pct = Some(0.05);
    let sim = TradingSimulator::new(cfg);
    let mut account = sim.open().unwrap();

    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.9)),
    );
    let events = sim.step(&mut account, &bar("2024-01-04", 98.0, 99.0, 94.0, 96.0), None);

    assert!(account.open_positions.is_empty());
    let trade = match &events[0] {
        StepEvent::PositionClosed(t) => t,
        other => panic!("expected close, got {other:?}"),
    };
    assert_eq!(trade.exit_price, dec!(95.00));
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert_eq!(trade.quantity, dec!(20));
}

#[test]
fn take_profit_closes_at_threshold_price() {
    let mut cfg = config();
    cfg.take_profit_pct = Some(0.10);
    let sim = TradingSimulator::new(cfg);
    let mut account = sim.open().unwrap();

    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.9)),
    );
    let events = sim.step(
        &mut account,
        &bar("2024-01-04", 105.0, 112.0, 104.0, 111.0),
        None,
    );

    let trade = match &events[0] {
        StepEvent::PositionClosed(t) => t,
        other => panic!("expected close, got {other:?}"),
    };
    assert_eq!(trade.exit_price, dec!(110.00));
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
}

// A bar wide enough to span both thresholds takes the stop-loss: the worse
// outcome is assumed to occur first intraday.
#[test]
fn stop_loss_wins_same_bar_tie_against_take_profit() {
    let mut cfg = config();
    cfg.stop_loss_pct = Some(0.05);
    cfg.take_profit_pct = Some(0.05);
    let sim = TradingSimulator::new(cfg);
    let mut account = sim.open().unwrap();

    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.9)),
    );
    let events = sim.step(
        &mut account,
        &bar("2024-01-04", 100.0, 106.0, 94.0, 100.0),
        None,
    );

    let trade = match &events[0] {
        StepEvent::PositionClosed(t) => t,
        other => panic!("expected close, got {other:?}"),
    };
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
}

#[test]
fn sell_signal_closes_at_bar_open() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.9)),
    );
    let events = sim.step(
        &mut account,
        &bar("2024-01-04", 104.0, 106.0, 103.0, 105.0),
        Some(&sell("2024-01-03", 0.8)),
    );

    assert!(account.open_positions.is_empty());
    let trade = account.closed_trades.last().unwrap();
    assert_eq!(trade.exit_price, dec!(104));
    assert_eq!(trade.exit_reason, ExitReason::Signal);
    assert_eq!(trade.realized_pnl, dec!(80)); // 20 shares × $4
    assert!(events
        .iter()
        .any(|e| matches!(e, StepEvent::PositionClosed(_))));
}

#[test]
fn sell_without_position_is_skipped() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let events = sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&sell("2024-01-02", 0.9)),
    );

    assert!(events.contains(&StepEvent::SignalSkipped {
        reason: SkipReason::NoOpenPosition
    }));
    assert!(account.closed_trades.is_empty());
}

#[test]
fn insufficient_cash_skips_signal_without_error() {
    let mut cfg = config();
    cfg.initial_capital = dec!(50); // below one share at $100
    let sim = TradingSimulator::new(cfg);
    let mut account = sim.open().unwrap();

    let events = sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.9)),
    );

    assert!(events.contains(&StepEvent::SignalSkipped {
        reason: SkipReason::InsufficientCash
    }));
    assert_eq!(account.cash, dec!(50));
}

#[test]
fn close_all_on_flat_account_is_noop() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let events = sim.close_all(&mut account, &bar("2024-01-31", 100.0, 101.0, 99.0, 100.0));

    assert!(events.is_empty());
    assert!(account.closed_trades.is_empty());
}

#[test]
fn close_all_liquidates_at_final_close() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.9)),
    );
    let final_bar = bar("2024-01-31", 107.0, 109.0, 106.0, 108.0);
    sim.close_all(&mut account, &final_bar);

    let trade = account.closed_trades.last().unwrap();
    assert_eq!(trade.exit_price, dec!(108));
    assert_eq!(trade.exit_reason, ExitReason::EndOfRange);
    assert!(trade.exit_at > trade.entry_at);
}

#[test]
fn cash_never_goes_negative_and_curve_grows_once_per_step() {
    let mut cfg = config();
    cfg.max_position_size = 1.0;
    cfg.stop_loss_pct = Some(0.03);
    let sim = TradingSimulator::new(cfg);
    let mut account = sim.open().unwrap();

    let bars = vec![
        bar("2024-01-02", 100.0, 101.0, 98.0, 99.0),
        bar("2024-01-03", 99.0, 103.0, 97.0, 102.0),
        bar("2024-01-04", 102.0, 104.0, 95.0, 96.0),
        bar("2024-01-05", 96.0, 99.0, 94.0, 98.0),
        bar("2024-01-08", 98.0, 100.0, 96.0, 97.0),
    ];
    let signals = vec![
        Some(buy("2024-01-01", 0.9)),
        None,
        Some(buy("2024-01-03", 0.8)),
        Some(sell("2024-01-04", 0.7)),
        Some(buy("2024-01-05", 0.95)),
    ];

    for (bar, signal) in bars.iter().zip(&signals) {
        sim.step(&mut account, bar, signal.as_ref());
        assert!(account.cash >= Decimal::ZERO, "cash must stay non-negative");
    }
    assert_eq!(account.equity_curve.len(), bars.len());
}

#[test]
fn runs_are_deterministic() {
    let bars = vec![
        bar("2024-01-02", 100.0, 101.0, 98.0, 99.0),
        bar("2024-01-03", 99.0, 103.0, 97.0, 102.0),
        bar("2024-01-04", 102.0, 104.0, 95.0, 96.0),
    ];
    let signals = [Some(buy("2024-01-01", 0.9)), None, Some(sell("2024-01-03", 0.8))];

    let run = || {
        let sim = TradingSimulator::new(config());
        let mut account = sim.open().unwrap();
        for (bar, signal) in bars.iter().zip(&signals) {
            sim.step(&mut account, bar, signal.as_ref());
        }
        account
    };

    let a = run();
    let b = run();
    assert_eq!(a.equity_curve, b.equity_curve);
    assert_eq!(a.closed_trades, b.closed_trades);
    assert_eq!(a.cash, b.cash);
}

#[test]
fn suggested_price_places_limit_order_that_fills_on_touch() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let mut signal = buy("2024-01-02", 0.9);
    signal.suggested_price = Some(dec!(98));

    let events = sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&signal),
    );
    let placed = matches!(
        events.first(),
        Some(StepEvent::OrderPlaced(o)) if o.kind == OrderKind::Limit(dec!(98))
    );
    assert!(placed, "expected a resting limit order, got {events:?}");
    assert!(account.open_positions.is_empty());

    // Next bar trades down through the limit → filled at the limit price
    let events = sim.step(&mut account, &bar("2024-01-04", 99.0, 100.0, 97.0, 98.5), None);
    assert!(events
        .iter()
        .any(|e| matches!(e, StepEvent::OrderFilled { fill_price, .. } if *fill_price == dec!(98))));
    assert_eq!(account.position("AAPL").unwrap().avg_entry_price, dec!(98));
}

#[test]
fn resting_limit_order_expires_after_configured_bars() {
    let mut cfg = config();
    cfg.order_expiry_bars = 2;
    let sim = TradingSimulator::new(cfg);
    let mut account = sim.open().unwrap();

    let mut signal = buy("2024-01-02", 0.9);
    signal.suggested_price = Some(dec!(90)); // never touched

    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&signal),
    );
    sim.step(&mut account, &bar("2024-01-04", 101.0, 103.0, 100.0, 102.0), None);
    let events = sim.step(&mut account, &bar("2024-01-05", 102.0, 104.0, 101.0, 103.0), None);

    assert!(events
        .iter()
        .any(|e| matches!(e, StepEvent::OrderExpired { .. })));
    assert!(!account.has_pending_orders());
}

#[test]
fn sell_signal_cancels_resting_entry_order() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let mut signal = buy("2024-01-02", 0.9);
    signal.suggested_price = Some(dec!(90));
    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&signal),
    );
    assert!(account.has_pending_orders());

    let events = sim.step(
        &mut account,
        &bar("2024-01-04", 101.0, 103.0, 100.0, 102.0),
        Some(&sell("2024-01-03", 0.9)),
    );
    assert!(events
        .iter()
        .any(|e| matches!(e, StepEvent::OrderCancelled { .. })));
    assert!(!account.has_pending_orders());
}

#[test]
fn buy_signal_with_order_pending_is_skipped() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let mut signal = buy("2024-01-02", 0.9);
    signal.suggested_price = Some(dec!(90));
    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&signal),
    );

    let events = sim.step(
        &mut account,
        &bar("2024-01-04", 101.0, 103.0, 100.0, 102.0),
        Some(&buy("2024-01-03", 0.9)),
    );
    assert!(events.contains(&StepEvent::SignalSkipped {
        reason: SkipReason::OrderPending
    }));
}

#[test]
fn stop_order_triggers_on_range() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    // Buy-stop above the market: triggers when the bar trades up through it
    let order = sim.place_stop_order(
        &mut account,
        crate::order::OrderSide::Buy,
        dec!(105),
        dec!(10),
        d("2024-01-03"),
    );
    assert_eq!(order.status, OrderStatus::Pending);

    let events = sim.step(&mut account, &bar("2024-01-04", 103.0, 106.0, 102.0, 105.5), None);
    assert!(events
        .iter()
        .any(|e| matches!(e, StepEvent::OrderFilled { fill_price, .. } if *fill_price == dec!(105))));
    assert_eq!(account.position("AAPL").unwrap().quantity, dec!(10));
}

#[test]
fn rebalance_adjustment_trims_position() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.9)),
    );
    assert_eq!(account.position("AAPL").unwrap().quantity, dec!(20));

    // Trim toward half the current value at a $100 open
    let next = bar("2024-01-04", 100.0, 101.0, 99.0, 100.0);
    let events = sim.adjust_position_value(&mut account, &next, dec!(1000));

    let position = account.position("AAPL").unwrap();
    assert_eq!(position.quantity, dec!(10));
    let trade = match &events[0] {
        StepEvent::PositionClosed(t) => t,
        other => panic!("expected trim trade, got {other:?}"),
    };
    assert_eq!(trade.quantity, dec!(10));
    assert_eq!(trade.exit_reason, ExitReason::Rebalance);
}

#[test]
fn rebalance_adjustment_buys_up_to_target() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let entry = bar("2024-01-03", 100.0, 101.0, 99.0, 100.0);
    sim.adjust_position_value(&mut account, &entry, dec!(1000));
    assert_eq!(account.position("AAPL").unwrap().quantity, dec!(10));
    assert_eq!(account.cash, dec!(9000));

    // Target doubles: buy 10 more at the next open
    let next = bar("2024-01-04", 100.0, 101.0, 99.0, 100.0);
    sim.adjust_position_value(&mut account, &next, dec!(2000));
    assert_eq!(account.position("AAPL").unwrap().quantity, dec!(20));
    assert_eq!(account.cash, dec!(8000));
}

#[test]
fn final_bar_step_never_opens_a_position() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let events = sim.step_final(
        &mut account,
        &bar("2024-01-31", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-30", 0.9)),
    );

    assert!(account.open_positions.is_empty());
    assert!(events.contains(&StepEvent::SignalSkipped {
        reason: SkipReason::FinalBar
    }));
    // Equity is still marked: the curve covers every bar of the range
    assert_eq!(account.equity_curve.len(), 1);
}

#[test]
fn final_bar_step_cancels_resting_entry_instead_of_filling() {
    let sim = TradingSimulator::new(config());
    let mut account = sim.open().unwrap();

    let mut signal = buy("2024-01-02", 0.9);
    signal.suggested_price = Some(dec!(98));
    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&signal),
    );
    assert!(account.has_pending_orders());

    // The final bar trades through the limit, but filling here would close
    // at the same timestamp via the end-of-range liquidation
    let events = sim.step_final(&mut account, &bar("2024-01-04", 99.0, 100.0, 97.0, 98.5), None);

    assert!(events
        .iter()
        .any(|e| matches!(e, StepEvent::OrderCancelled { .. })));
    assert!(account.open_positions.is_empty());
    assert!(!account.has_pending_orders());
}

#[test]
fn final_bar_step_still_applies_exits() {
    let mut cfg = config();
    cfg.stop_loss_pct = Some(0.05);
    let sim = TradingSimulator::new(cfg);
    let mut account = sim.open().unwrap();

    sim.step(
        &mut account,
        &bar("2024-01-03", 100.0, 102.0, 99.0, 101.0),
        Some(&buy("2024-01-02", 0.9)),
    );
    let events = sim.step_final(&mut account, &bar("2024-01-04", 98.0, 99.0, 94.0, 96.0), None);

    let trade = match &events[0] {
        StepEvent::PositionClosed(t) => t,
        other => panic!("expected stop-loss close, got {other:?}"),
    };
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!(trade.exit_at > trade.entry_at);
}

#[test]
fn open_rejects_non_positive_capital() {
    let mut cfg = config();
    cfg.initial_capital = Decimal::ZERO;
    let sim = TradingSimulator::new(cfg);
    assert!(sim.open().is_err());
}
