//! End-to-end account scenarios driven by the real scheduler.
//!
//! Market: one instrument, previous close 10.01 (daily bar), then minute bars
//! closing 10.00 at 09:30 and 10.50 for the rest of the session.

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::sync::{Arc, Mutex};
use tframe_core::data::{BarStore, InMemoryBarStore};
use tframe_core::domain::{Bar, InstrumentId, OrderStatus};
use tframe_core::engine::{
    trading_minutes, Account, Backtest, BacktestOutcome, CallbackResult, Context, OrderError,
};
use tframe_core::strategy::{Strategy, StrategyInfo};

// ── Helpers ──────────────────────────────────────────────────────────

const CASH: f64 = 1_000_000.0;

fn inst() -> InstrumentId {
    InstrumentId::parse("000001.SZ").unwrap()
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
    day(d).and_hms_opt(h, m, 0).unwrap()
}

fn bar(timestamp: NaiveDateTime, close: f64, volume: u64) -> Bar {
    Bar {
        timestamp,
        open: close,
        high: close,
        low: close,
        close,
        volume,
        amount: close * volume as f64,
    }
}

fn session(d: u32, volume: u64) -> Vec<Bar> {
    trading_minutes(day(d))
        .into_iter()
        .map(|t| {
            let close = if t == at(d, 9, 30) { 10.00 } else { 10.50 };
            bar(t, close, volume)
        })
        .collect()
}

fn store(days: &[u32]) -> Arc<dyn BarStore> {
    let mut store = InMemoryBarStore::new();
    store.insert_daily_bars(&inst(), vec![bar(at(2, 0, 0), 10.01, 5_000_000)]);
    for d in days {
        store.insert_minute_bars(&inst(), session(*d, 1_000_000));
    }
    Arc::new(store)
}

fn run(days: &[u32], strategy: impl Strategy + 'static) -> BacktestOutcome {
    let info = StrategyInfo::new("scenario", day(days[0]), day(*days.last().unwrap())).unwrap();
    let mut backtest = Backtest::new(store(days), info, CASH).unwrap();
    backtest.add_strategy(Box::new(strategy));
    backtest.run().unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

// ── Scenario A ───────────────────────────────────────────────────────

struct AllIn;

impl Strategy for AllIn {
    fn before_trade_day(&mut self, _t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        ctx.account().rebalance_by_total_percent(&inst(), 1.0, None)?;
        Ok(())
    }
}

#[test]
fn scenario_a_buys_whole_lots_with_all_cash() {
    let outcome = run(&[3], AllIn);
    let account = &outcome.account;

    let orders: Vec<_> = account.order_manager().all_orders().collect();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].quantity, 99_900);
    assert_eq!(orders[0].status, OrderStatus::Completed);
    assert!(close(orders[0].average_filled_price, 10.00));

    let position = account.position(&inst()).unwrap();
    assert_eq!(position.quantity, 99_900);
    assert!(close(position.cost_price, 10.00));

    assert!(close(CASH - account.available_cash(), 999_000.0));
    assert_eq!(account.frozen_cash(), 0.0);
    assert!(outcome.stats.failures.is_empty());
}

// ── Scenario B ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct SellRecord {
    cash_before_sell: Arc<Mutex<Option<f64>>>,
    sell_qty: Arc<Mutex<Option<i64>>>,
}

struct InAndOut(SellRecord);

impl Strategy for InAndOut {
    fn before_trade_day(&mut self, _t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        ctx.account().rebalance_by_total_percent(&inst(), 1.0, None)?;
        Ok(())
    }

    fn on_trade_day_start(&mut self, _t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        let account = ctx.account();
        *self.0.cash_before_sell.lock().unwrap() = Some(account.available_cash());
        let id = account.rebalance_by_total_percent(&inst(), 0.0, None)?;
        let qty = account
            .open_orders()
            .iter()
            .find(|o| Some(&o.id) == id.as_ref())
            .map(|o| o.quantity);
        *self.0.sell_qty.lock().unwrap() = qty;
        Ok(())
    }
}

#[test]
fn scenario_b_unwinds_position_and_books_proceeds() {
    let record = SellRecord::default();
    let outcome = run(&[3], InAndOut(record.clone()));
    let account = &outcome.account;

    assert_eq!(*record.sell_qty.lock().unwrap(), Some(-99_900));
    let before = record.cash_before_sell.lock().unwrap().unwrap();
    assert!(close(account.available_cash() - before, 99_900.0 * 10.50));

    // Flat position swept at AfterTradeDay.
    assert!(account.positions().is_empty());
    let last = account.snapshots().last().unwrap();
    assert_eq!(last.open_positions, 0);
    assert!(close(last.total_value, account.available_cash()));
}

// ── Scenario C ───────────────────────────────────────────────────────

struct Greedy(Arc<Mutex<Option<OrderError>>>);

impl Strategy for Greedy {
    fn before_trade_day(&mut self, _t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        if let Err(err) = ctx.account().order_by_percent(&inst(), 1.5, None) {
            *self.0.lock().unwrap() = Some(err);
        }
        Ok(())
    }
}

#[test]
fn scenario_c_percent_above_one_is_rejected() {
    let seen = Arc::new(Mutex::new(None));
    let outcome = run(&[3], Greedy(Arc::clone(&seen)));
    assert!(matches!(
        *seen.lock().unwrap(),
        Some(OrderError::PercentOutOfRange { .. })
    ));
    assert_eq!(outcome.account.order_manager().all_orders().count(), 0);
    assert_eq!(outcome.account.available_cash(), CASH);
}

// ── Day boundary ─────────────────────────────────────────────────────

#[derive(Default)]
struct LateBid {
    checks: Arc<Mutex<Vec<(NaiveDateTime, usize, f64)>>>,
}

impl Strategy for LateBid {
    fn after_trade_minute(&mut self, t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        let account = ctx.account();
        if t == at(3, 14, 59) {
            // Limit far below the market: never fills.
            account.order(&inst(), 1_000, Some(5.0))?;
        }
        if t == at(3, 15, 0) || t == at(4, 9, 30) {
            self.checks
                .lock()
                .unwrap()
                .push((t, account.open_orders().len(), account.frozen_cash()));
        }
        Ok(())
    }
}

#[test]
fn unfilled_order_cancelled_at_next_day_open() {
    let strategy = LateBid::default();
    let checks = Arc::clone(&strategy.checks);
    let outcome = run(&[3, 4], strategy);

    let checks = checks.lock().unwrap();
    assert_eq!(checks.len(), 2);
    assert_eq!(checks[0], (at(3, 15, 0), 1, 5_000.0));
    assert_eq!(checks[1], (at(4, 9, 30), 0, 0.0));

    let order = outcome.account.order_manager().all_orders().next().unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.filled_quantity, 0);
    assert!(close(outcome.account.available_cash(), CASH));
}

// ── End-of-day snapshot ──────────────────────────────────────────────

struct OvernightBid;

impl Strategy for OvernightBid {
    fn after_trade_day(&mut self, _t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        ctx.account().order(&inst(), 1_000, Some(10.0))?;
        Ok(())
    }
}

#[test]
fn day_snapshot_includes_orders_placed_after_close() {
    let outcome = run(&[3], OvernightBid);
    let snapshots = outcome.account.snapshots();
    assert_eq!(snapshots.len(), 1);

    let snap = &snapshots[0];
    assert_eq!(snap.date, day(3));
    assert!(close(snap.frozen_cash, 10_000.0));
    assert!(close(snap.available_cash, CASH - 10_000.0));
    assert!(close(snap.total_value, CASH));
    assert!(outcome.stats.failures.is_empty());
}

// ── Round trip ───────────────────────────────────────────────────────

struct RoundTrip;

impl Strategy for RoundTrip {
    fn after_trade_minute(&mut self, t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        let account = ctx.account();
        if t == at(3, 10, 0) {
            account.order(&inst(), 5_000, None)?;
        }
        if t == at(3, 10, 5) {
            account.order(&inst(), -5_000, None)?;
        }
        Ok(())
    }
}

#[test]
fn round_trip_at_flat_price_restores_cash() {
    let outcome = run(&[3], RoundTrip);
    let account = &outcome.account;
    assert_eq!(account.fills().len(), 2);
    assert!(close(account.available_cash(), CASH));
    assert!(account.positions().is_empty());
    assert!(close(account.total_return_rate(), 0.0));
}

// ── Total-value identity ─────────────────────────────────────────────

struct Churn {
    worst: Arc<Mutex<f64>>,
}

impl Strategy for Churn {
    fn after_trade_minute(&mut self, t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        let account = ctx.account();
        let frozen: f64 = account.open_orders().iter().map(|o| o.frozen_cash).sum();
        let market: f64 = account
            .positions()
            .values()
            .map(|p| p.quantity as f64 * p.current_price)
            .sum();
        let gap = (account.available_cash() + frozen + market - account.total_value()).abs();
        let mut worst = self.worst.lock().unwrap();
        *worst = worst.max(gap);

        // Alternate small buys and sells; errors (e.g. nothing to sell) are fine.
        let qty = if t.minute() % 2 == 0 { 300 } else { -200 };
        let _ = account.order(&inst(), qty, None);
        Ok(())
    }
}

#[test]
fn total_value_identity_holds_every_minute() {
    let worst = Arc::new(Mutex::new(0.0));
    let outcome = run(&[3, 4], Churn { worst: Arc::clone(&worst) });
    assert!(*worst.lock().unwrap() < 1e-6);
    assert!(outcome.account.fills().len() > 100);
    assert!(outcome.stats.failures.is_empty());
}
