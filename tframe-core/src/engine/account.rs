//! Account ledger: cash, positions and the trading entry points strategies
//! call.
//!
//! Cash moves only through order events:
//!
//! | event                    | available cash                        |
//! |--------------------------|---------------------------------------|
//! | `Created`                | `-= qty * reference_price` (buys)     |
//! | `Updated`                | `+= abs(delta) * price` (sells)       |
//! | `Completed`, `Cancelled` | `+=` the order's remaining frozen cash |
//! | `Failed`                 | same as `Cancelled`                   |
//!
//! Buy fills move cash from the order's frozen balance into the position, so
//! `total_value = available + frozen + market_value` holds after every event.

use super::events::{OrderEvent, OrderObserver};
use super::order_manager::{OrderError, OrderManager};
use super::position_manager::PositionManager;
use super::validators::{OrderRequest, OrderValidator};
use crate::data::BarStore;
use crate::domain::{Fill, InstrumentId, Order, OrderId, Position, LOT_SIZE};
use crate::error::SetupError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

// ── Role interface ──

/// What a strategy sees of an account.
///
/// Sizing helpers are provided on top of four primitives (`quote`, `submit`,
/// `cancel_order` and the balance getters) so every account variant shares
/// the same rounding and range rules.
pub trait Account {
    fn current_time(&self) -> NaiveDateTime;
    fn initial_cash(&self) -> f64;
    fn available_cash(&self) -> f64;
    fn frozen_cash(&self) -> f64;
    fn position_market_value(&self) -> f64;
    fn position_profit(&self) -> f64;
    fn positions(&self) -> &BTreeMap<InstrumentId, Position>;
    fn open_orders(&self) -> &[Order];

    /// Price used for sizing and reservation: `price` if given, otherwise the
    /// store's current price.
    fn quote(&self, instrument: &InstrumentId, price: Option<f64>) -> Result<f64, OrderError>;

    /// Validate and place a signed order.
    fn submit(
        &mut self,
        instrument: &InstrumentId,
        quantity: i64,
        limit_price: Option<f64>,
        reference_price: f64,
    ) -> Result<OrderId, OrderError>;

    fn cancel_order(&mut self, id: &OrderId) -> Result<(), OrderError>;

    // ── Provided ──

    fn total_value(&self) -> f64 {
        self.available_cash() + self.frozen_cash() + self.position_market_value()
    }

    fn total_return_rate(&self) -> f64 {
        (self.total_value() - self.initial_cash()) / self.initial_cash()
    }

    fn position(&self, instrument: &InstrumentId) -> Option<&Position> {
        self.positions().get(instrument)
    }

    fn position_quantity(&self, instrument: &InstrumentId) -> i64 {
        self.position(instrument).map_or(0, |p| p.quantity)
    }

    /// Signed share order. `price` is a limit; `None` is a market order.
    fn order(
        &mut self,
        instrument: &InstrumentId,
        quantity: i64,
        price: Option<f64>,
    ) -> Result<OrderId, OrderError> {
        let reference = self.quote(instrument, price)?;
        self.submit(instrument, quantity, price, reference)
    }

    /// Order shares worth `value` (negative sells), rounded toward zero to a
    /// whole lot.
    fn order_by_value(
        &mut self,
        instrument: &InstrumentId,
        value: f64,
        price: Option<f64>,
    ) -> Result<OrderId, OrderError> {
        let reference = self.quote(instrument, price)?;
        let quantity = shares_for_value(value, reference);
        self.submit(instrument, quantity, price, reference)
    }

    /// Positive `percent` spends that fraction of available cash; negative
    /// sells that fraction of the position's market value.
    fn order_by_percent(
        &mut self,
        instrument: &InstrumentId,
        percent: f64,
        price: Option<f64>,
    ) -> Result<OrderId, OrderError> {
        check_percent(percent, -1.0, 1.0)?;
        let value = if percent >= 0.0 {
            self.available_cash() * percent
        } else {
            let position = self
                .position(instrument)
                .ok_or_else(|| OrderError::NoPosition(instrument.clone()))?;
            position.market_value * percent
        };
        self.order_by_value(instrument, value, price)
    }

    /// Order a fraction of total account value.
    fn order_by_total_percent(
        &mut self,
        instrument: &InstrumentId,
        percent: f64,
        price: Option<f64>,
    ) -> Result<OrderId, OrderError> {
        check_percent(percent, -1.0, 1.0)?;
        let value = self.total_value() * percent;
        self.order_by_value(instrument, value, price)
    }

    /// Move the position to `target_quantity` shares (floored to a lot).
    ///
    /// Returns `Ok(None)` when already on target.
    fn rebalance(
        &mut self,
        instrument: &InstrumentId,
        target_quantity: i64,
        price: Option<f64>,
    ) -> Result<Option<OrderId>, OrderError> {
        if target_quantity < 0 {
            return Err(OrderError::NegativeTarget(target_quantity as f64));
        }
        let target = target_quantity / LOT_SIZE * LOT_SIZE;
        let delta = target - self.position_quantity(instrument);
        if delta == 0 {
            debug!(%instrument, target, "already on target");
            return Ok(None);
        }
        let reference = self.quote(instrument, price)?;
        self.submit(instrument, delta, price, reference).map(Some)
    }

    /// Move the position to the share count worth `target_value`.
    fn rebalance_by_value(
        &mut self,
        instrument: &InstrumentId,
        target_value: f64,
        price: Option<f64>,
    ) -> Result<Option<OrderId>, OrderError> {
        if target_value < 0.0 {
            return Err(OrderError::NegativeTarget(target_value));
        }
        let reference = self.quote(instrument, price)?;
        let target = shares_for_value(target_value, reference);
        self.rebalance(instrument, target, price)
    }

    /// Move the position to `percent` of total account value.
    fn rebalance_by_total_percent(
        &mut self,
        instrument: &InstrumentId,
        percent: f64,
        price: Option<f64>,
    ) -> Result<Option<OrderId>, OrderError> {
        check_percent(percent, 0.0, 1.0)?;
        let target_value = self.total_value() * percent;
        self.rebalance_by_value(instrument, target_value, price)
    }
}

fn check_percent(percent: f64, min: f64, max: f64) -> Result<(), OrderError> {
    if percent.is_finite() && (min..=max).contains(&percent) {
        Ok(())
    } else {
        warn!(percent, min, max, "percent out of range");
        Err(OrderError::PercentOutOfRange { percent, min, max })
    }
}

/// Whole-lot share count worth `value` at `price`, rounded toward zero.
pub fn shares_for_value(value: f64, price: f64) -> i64 {
    if price.is_nan() || price <= 0.0 || !value.is_finite() {
        return 0;
    }
    let lots = value / price / LOT_SIZE as f64;
    // Absorb representation error so 999.9999999 lots counts as 1000.
    let lots = (lots + lots.signum() * 1e-9).trunc();
    lots as i64 * LOT_SIZE
}

// ── Cash ledger ──

/// Available cash and the fill log, driven purely by order events.
#[derive(Debug, Clone)]
pub struct CashLedger {
    initial: f64,
    available: f64,
    fills: Vec<Fill>,
}

impl CashLedger {
    pub fn new(initial: f64) -> Self {
        Self {
            initial,
            available: initial,
            fills: Vec::new(),
        }
    }

    pub fn available(&self) -> f64 {
        self.available
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }
}

impl OrderObserver for CashLedger {
    fn on_order_create(&mut self, order: &Order) {
        self.available -= order.frozen_cash;
    }

    fn on_order_update(&mut self, order: &Order, delta: i64, price: f64, time: NaiveDateTime) {
        if delta < 0 {
            self.available += delta.unsigned_abs() as f64 * price;
        }
        self.fills.push(Fill {
            order_id: order.id.clone(),
            instrument: order.instrument.clone(),
            time,
            quantity: delta,
            price,
        });
    }

    fn on_order_completed(&mut self, _order: &Order, released_cash: f64) {
        self.available += released_cash;
    }

    fn on_order_cancelled(&mut self, _order: &Order, released_cash: f64) {
        self.available += released_cash;
    }
}

// ── Backtest account ──

/// End-of-day account state; the equity curve is a list of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub date: NaiveDate,
    pub available_cash: f64,
    pub frozen_cash: f64,
    pub market_value: f64,
    pub total_value: f64,
    pub profit: f64,
    pub open_positions: usize,
}

/// The simulated account: owns the order manager, the position manager and
/// the cash ledger, and routes order events between them.
pub struct BacktestAccount {
    store: Arc<dyn BarStore>,
    orders: OrderManager,
    positions: PositionManager,
    cash: CashLedger,
    observers: Vec<Box<dyn OrderObserver>>,
    time: NaiveDateTime,
    snapshots: Vec<AccountSnapshot>,
}

impl BacktestAccount {
    pub fn new(
        store: Arc<dyn BarStore>,
        initial_cash: f64,
        start: NaiveDateTime,
    ) -> Result<Self, SetupError> {
        if !initial_cash.is_finite() || initial_cash <= 0.0 {
            return Err(SetupError::InvalidInitialCash(initial_cash));
        }
        Ok(Self {
            orders: OrderManager::new(Arc::clone(&store)),
            positions: PositionManager::new(Arc::clone(&store)),
            store,
            cash: CashLedger::new(initial_cash),
            observers: Vec::new(),
            time: start,
            snapshots: Vec::new(),
        })
    }

    pub fn store(&self) -> &dyn BarStore {
        self.store.as_ref()
    }

    /// Extra observers are notified after the position manager and the cash
    /// ledger.
    pub fn add_observer(&mut self, observer: Box<dyn OrderObserver>) {
        self.observers.push(observer);
    }

    pub fn add_validator(&mut self, validator: Box<dyn OrderValidator>) {
        self.orders.add_validator(validator);
    }

    pub fn set_time(&mut self, time: NaiveDateTime) {
        self.time = time;
    }

    pub fn order_manager(&self) -> &OrderManager {
        &self.orders
    }

    pub fn fills(&self) -> &[Fill] {
        self.cash.fills()
    }

    pub fn snapshots(&self) -> &[AccountSnapshot] {
        &self.snapshots
    }

    /// Run the fill engine for `time` and settle the resulting events.
    pub fn advance_fills(&mut self, time: NaiveDateTime) {
        let events = self.orders.advance_fills(time);
        for event in &events {
            self.dispatch(event);
        }
    }

    pub fn update_positions(&mut self, time: NaiveDateTime) {
        self.positions.update_positions(time);
    }

    pub fn sweep_flat_positions(&mut self) {
        self.positions.after_trade_day();
    }

    /// Mark positions and append today's snapshot.
    pub fn record_snapshot(&mut self, time: NaiveDateTime) -> AccountSnapshot {
        self.positions.update_positions(time);
        let snapshot = AccountSnapshot {
            date: time.date(),
            available_cash: self.available_cash(),
            frozen_cash: self.frozen_cash(),
            market_value: self.position_market_value(),
            total_value: self.total_value(),
            profit: self.position_profit(),
            open_positions: self.positions.positions().values().filter(|p| !p.is_flat()).count(),
        };
        self.snapshots.push(snapshot.clone());
        snapshot
    }

    fn dispatch(&mut self, event: &OrderEvent) {
        event.dispatch(&mut self.positions);
        event.dispatch(&mut self.cash);
        for observer in self.observers.iter_mut() {
            event.dispatch(observer.as_mut());
        }
    }
}

impl Account for BacktestAccount {
    fn current_time(&self) -> NaiveDateTime {
        self.time
    }

    fn initial_cash(&self) -> f64 {
        self.cash.initial
    }

    fn available_cash(&self) -> f64 {
        self.cash.available()
    }

    fn frozen_cash(&self) -> f64 {
        self.orders.frozen_cash()
    }

    fn position_market_value(&self) -> f64 {
        self.positions.market_value()
    }

    fn position_profit(&self) -> f64 {
        self.positions.profit()
    }

    fn positions(&self) -> &BTreeMap<InstrumentId, Position> {
        self.positions.positions()
    }

    fn open_orders(&self) -> &[Order] {
        self.orders.open_orders()
    }

    fn quote(&self, instrument: &InstrumentId, price: Option<f64>) -> Result<f64, OrderError> {
        match price {
            Some(p) if p.is_finite() && p > 0.0 => Ok(p),
            Some(p) => Err(OrderError::InvalidPrice(p)),
            None => Ok(self.store.current_price(instrument, self.time)?),
        }
    }

    fn submit(
        &mut self,
        instrument: &InstrumentId,
        quantity: i64,
        limit_price: Option<f64>,
        reference_price: f64,
    ) -> Result<OrderId, OrderError> {
        let request = OrderRequest {
            instrument: instrument.clone(),
            quantity,
            limit_price,
            reference_price,
            time: self.time,
        };
        let (id, event) =
            self.orders
                .create_order(request, self.cash.available(), self.positions.positions())?;
        self.dispatch(&event);
        Ok(id)
    }

    fn cancel_order(&mut self, id: &OrderId) -> Result<(), OrderError> {
        let event = self.orders.cancel(id, "cancelled by strategy")?;
        self.dispatch(&event);
        Ok(())
    }
}

impl std::fmt::Debug for BacktestAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktestAccount")
            .field("time", &self.time)
            .field("available_cash", &self.cash.available)
            .field("orders", &self.orders)
            .field("positions", &self.positions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryBarStore;
    use crate::domain::Bar;

    fn inst() -> InstrumentId {
        InstrumentId::parse("000001.SZ").unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn bar(time: NaiveDateTime, close: f64, volume: u64) -> Bar {
        Bar {
            timestamp: time,
            open: close,
            high: close,
            low: close,
            close,
            volume,
            amount: close * volume as f64,
        }
    }

    fn account(cash: f64) -> BacktestAccount {
        let mut store = InMemoryBarStore::new();
        store.insert_minute_bars(
            &inst(),
            vec![bar(at(9, 30), 10.0, 1_000_000), bar(at(9, 31), 12.0, 1_000_000)],
        );
        BacktestAccount::new(Arc::new(store), cash, at(9, 0)).unwrap()
    }

    fn assert_identity(acc: &BacktestAccount, expected_total: f64) {
        assert!(
            (acc.total_value() - expected_total).abs() < 1e-6,
            "total {} != {}",
            acc.total_value(),
            expected_total
        );
    }

    #[test]
    fn shares_round_toward_zero_to_lot() {
        assert_eq!(shares_for_value(1_050.0, 10.0), 100);
        assert_eq!(shares_for_value(999.0, 10.0), 0);
        assert_eq!(shares_for_value(-1_050.0, 10.0), -100);
        assert_eq!(shares_for_value(100_000.0, 10.0), 10_000);
        assert_eq!(shares_for_value(1_000.0, 0.0), 0);
    }

    #[test]
    fn rejects_non_positive_initial_cash() {
        let store = Arc::new(InMemoryBarStore::new());
        assert!(matches!(
            BacktestAccount::new(store, 0.0, at(9, 0)),
            Err(SetupError::InvalidInitialCash(_))
        ));
    }

    #[test]
    fn buy_reserves_then_settles_cash() {
        let mut acc = account(10_000.0);
        acc.order(&inst(), 500, Some(11.0)).unwrap();
        assert!((acc.available_cash() - 4_500.0).abs() < 1e-9);
        assert!((acc.frozen_cash() - 5_500.0).abs() < 1e-9);
        assert_identity(&acc, 10_000.0);

        acc.set_time(at(9, 30));
        acc.advance_fills(at(9, 30));
        // filled at 10.0, 500 shares released back
        assert!((acc.available_cash() - 5_000.0).abs() < 1e-9);
        assert_eq!(acc.frozen_cash(), 0.0);
        assert_eq!(acc.position_quantity(&inst()), 500);
        assert_identity(&acc, 10_000.0);
        assert_eq!(acc.fills().len(), 1);
    }

    #[test]
    fn market_buy_filled_above_quote_settles_overdraft() {
        let mut acc = account(10_000.0);
        acc.set_time(at(9, 30));
        acc.order(&inst(), 100, None).unwrap();
        // quoted at the 09:30 close
        assert!((acc.frozen_cash() - 1_000.0).abs() < 1e-9);

        acc.set_time(at(9, 31));
        acc.advance_fills(at(9, 31));
        // filled at the 09:31 close of 12.0; the 200 overrun comes out of available
        assert_eq!(acc.position_quantity(&inst()), 100);
        assert_eq!(acc.frozen_cash(), 0.0);
        assert!((acc.available_cash() - 8_800.0).abs() < 1e-9);
        assert_identity(&acc, 10_000.0);
    }

    #[test]
    fn sell_books_proceeds() {
        let mut acc = account(10_000.0);
        acc.order(&inst(), 500, Some(10.0)).unwrap();
        acc.set_time(at(9, 30));
        acc.advance_fills(at(9, 30));

        acc.order(&inst(), -500, None).unwrap();
        acc.set_time(at(9, 31));
        acc.advance_fills(at(9, 31));
        assert!((acc.available_cash() - 11_000.0).abs() < 1e-9);
        assert!(acc.position(&inst()).unwrap().is_flat());
        acc.sweep_flat_positions();
        assert!(acc.positions().is_empty());
        assert!((acc.total_return_rate() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn percent_out_of_range_places_nothing() {
        let mut acc = account(10_000.0);
        let err = acc.order_by_percent(&inst(), 1.5, None).unwrap_err();
        assert!(matches!(err, OrderError::PercentOutOfRange { .. }));
        let err = acc.rebalance_by_total_percent(&inst(), -0.1, None).unwrap_err();
        assert!(matches!(err, OrderError::PercentOutOfRange { .. }));
        assert!(acc.open_orders().is_empty());
        assert_eq!(acc.available_cash(), 10_000.0);
    }

    #[test]
    fn negative_percent_needs_position() {
        let mut acc = account(10_000.0);
        let err = acc.order_by_percent(&inst(), -0.5, None).unwrap_err();
        assert_eq!(err, OrderError::NoPosition(inst()));
    }

    #[test]
    fn rebalance_orders_only_the_delta() {
        let mut acc = account(100_000.0);
        acc.set_time(at(9, 30));
        let id = acc.rebalance(&inst(), 1_050, None).unwrap().unwrap();
        let order = acc.order_manager().get(&id).unwrap();
        assert_eq!(order.quantity, 1_000);

        acc.advance_fills(at(9, 30));
        assert_eq!(acc.rebalance(&inst(), 1_000, None).unwrap(), None);
        let id = acc.rebalance(&inst(), 600, None).unwrap().unwrap();
        assert_eq!(acc.order_manager().get(&id).unwrap().quantity, -400);
    }

    #[test]
    fn zero_value_order_is_rejected_quietly() {
        let mut acc = account(10_000.0);
        let err = acc.order_by_value(&inst(), 50.0, Some(10.0)).unwrap_err();
        assert!(err.is_noop());
    }

    #[test]
    fn cancel_releases_reservation() {
        let mut acc = account(10_000.0);
        let id = acc.order(&inst(), 500, Some(9.0)).unwrap();
        acc.cancel_order(&id).unwrap();
        assert_eq!(acc.available_cash(), 10_000.0);
        assert_eq!(acc.frozen_cash(), 0.0);
    }

    #[test]
    fn extra_observers_see_events_after_ledger() {
        use std::sync::Mutex;

        struct Tap(Arc<Mutex<Vec<i64>>>);
        impl OrderObserver for Tap {
            fn on_order_update(&mut self, _o: &Order, delta: i64, _p: f64, _t: NaiveDateTime) {
                self.0.lock().unwrap().push(delta);
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut acc = account(10_000.0);
        acc.add_observer(Box::new(Tap(Arc::clone(&seen))));
        acc.order(&inst(), 300, Some(10.0)).unwrap();
        acc.advance_fills(at(9, 30));
        assert_eq!(*seen.lock().unwrap(), vec![300]);
    }
}
