//! Order manager: order creation, the fill engine, cancellation.
//!
//! Fill model: on every `AfterTradeMinute` each open order is offered the
//! 1-minute bars in `[last_update_time, now]` it has not seen yet, newest bar
//! first. Each bar can supply at most half its volume, at its close price,
//! subject to the limit rule. Orders never survive their trading day.

use super::events::OrderEvent;
use super::validators::{OrderRequest, OrderValidator, ValidationContext, ValidatorChain};
use crate::data::{BarStore, DataError};
use crate::domain::{IdGen, InstrumentId, Order, OrderId, OrderStatus, Position};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Why an order operation did not produce an order.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrderError {
    #[error("order rejected by {validator}: {message}")]
    Rejected { validator: String, message: String },

    #[error("order quantity rounds to zero")]
    ZeroQuantity,

    #[error("percent {percent} outside [{min}, {max}]")]
    PercentOutOfRange { percent: f64, min: f64, max: f64 },

    #[error("invalid price {0}")]
    InvalidPrice(f64),

    #[error("target value must not be negative, got {0}")]
    NegativeTarget(f64),

    #[error("no position in {0}")]
    NoPosition(InstrumentId),

    #[error("order {0} not found")]
    NotFound(OrderId),

    #[error("order {id} is already {status:?}")]
    NotOpen { id: OrderId, status: OrderStatus },

    #[error(transparent)]
    Data(#[from] DataError),
}

impl OrderError {
    /// Quiet outcomes that are not worth a warning.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::ZeroQuantity)
    }
}

const DAY_END_REASON: &str = "not filled by end of trading day";

pub struct OrderManager {
    store: Arc<dyn BarStore>,
    validators: ValidatorChain,
    /// Open orders in creation order.
    open: Vec<Order>,
    /// Terminal orders in the order they closed.
    closed: Vec<Order>,
    ids: IdGen,
}

impl OrderManager {
    pub fn new(store: Arc<dyn BarStore>) -> Self {
        Self::with_validators(store, ValidatorChain::default())
    }

    pub fn with_validators(store: Arc<dyn BarStore>, validators: ValidatorChain) -> Self {
        Self {
            store,
            validators,
            open: Vec::new(),
            closed: Vec::new(),
            ids: IdGen::default(),
        }
    }

    pub fn add_validator(&mut self, validator: Box<dyn OrderValidator>) {
        self.validators.push(validator);
    }

    // ── Creation ──

    /// Validate `request` and, if accepted, open a new order.
    ///
    /// Returns the new id and the `Created` event the caller must dispatch.
    pub fn create_order(
        &mut self,
        request: OrderRequest,
        available_cash: f64,
        positions: &BTreeMap<InstrumentId, Position>,
    ) -> Result<(OrderId, OrderEvent), OrderError> {
        if request.quantity == 0 {
            return Err(OrderError::ZeroQuantity);
        }
        if !request.reference_price.is_finite() || request.reference_price <= 0.0 {
            return Err(OrderError::InvalidPrice(request.reference_price));
        }

        // Ids are drawn before validation so rejections can be logged by id.
        let id = self
            .ids
            .next_order_id(&request.instrument, request.time, request.quantity);
        let ctx = ValidationContext {
            available_cash,
            positions,
            pending_sell_quantity: self.pending_sell_quantity(&request.instrument),
        };
        if let Some((validator, result)) = self.validators.check(&request, &ctx) {
            warn!(
                order_id = %id,
                quantity = request.quantity,
                time = %request.time,
                validator = %validator,
                "order rejected: {}",
                result.message
            );
            return Err(OrderError::Rejected {
                validator,
                message: result.message,
            });
        }

        let order = Order::new(
            id.clone(),
            request.instrument,
            request.quantity,
            request.limit_price,
            request.reference_price,
            request.time,
        );
        info!(
            order_id = %id,
            quantity = order.quantity,
            limit = ?order.limit_price,
            reference_price = order.reference_price,
            "order created"
        );
        self.open.push(order.clone());
        Ok((id, OrderEvent::Created { order }))
    }

    // ── Fill engine ──

    /// Work every open order up to `time` and return the resulting events in
    /// the order observers must see them.
    pub fn advance_fills(&mut self, time: NaiveDateTime) -> Vec<OrderEvent> {
        let mut events = Vec::new();
        let today = time.date();

        for order in self.open.iter_mut() {
            if order.created_at.date() != today {
                order.status = OrderStatus::Cancelled;
                order.cancel_reason = Some(DAY_END_REASON.to_string());
                let released_cash = order.release_frozen_cash();
                info!(
                    order_id = %order.id,
                    filled = order.filled_quantity,
                    released_cash,
                    "order expired"
                );
                events.push(OrderEvent::Cancelled {
                    order: order.clone(),
                    released_cash,
                });
                continue;
            }

            let bars = match self
                .store
                .minute_bars(&order.instrument, order.last_update_time, time)
            {
                Ok(bars) => bars,
                Err(err @ DataError::UnknownInstrument(_)) => {
                    order.status = OrderStatus::Failed;
                    order.cancel_reason = Some(err.to_string());
                    let released_cash = order.release_frozen_cash();
                    warn!(order_id = %order.id, error = %err, "order failed");
                    events.push(OrderEvent::Failed {
                        order: order.clone(),
                        released_cash,
                    });
                    continue;
                }
                Err(err) => {
                    // Window is retried next minute.
                    warn!(order_id = %order.id, error = %err, "bar query failed");
                    continue;
                }
            };

            let newest_seen = order.scanned_through;
            for bar in bars
                .iter()
                .rev()
                .filter(|b| newest_seen.map_or(true, |seen| b.timestamp > seen))
            {
                if order.remaining_quantity() == 0 {
                    break;
                }
                if bar.is_void() {
                    continue;
                }
                let delta = order.fill(bar.fillable_volume(), bar.close);
                if delta != 0 {
                    debug!(
                        order_id = %order.id,
                        bar = %bar.timestamp,
                        delta,
                        price = bar.close,
                        "fill"
                    );
                    events.push(OrderEvent::Updated {
                        order: order.clone(),
                        delta,
                        price: bar.close,
                        time,
                    });
                }
            }
            if let Some(last) = bars.last() {
                order.scanned_through = Some(newest_seen.map_or(last.timestamp, |s| s.max(last.timestamp)));
            }
            order.last_update_time = time;

            if order.status == OrderStatus::Completed {
                let released_cash = order.release_frozen_cash();
                info!(
                    order_id = %order.id,
                    average_price = order.average_filled_price,
                    released_cash,
                    "order completed"
                );
                events.push(OrderEvent::Completed {
                    order: order.clone(),
                    released_cash,
                });
            }
        }

        self.retire_terminal();
        events
    }

    // ── Cancellation ──

    /// Cancel an open order, releasing its reserved cash.
    pub fn cancel(&mut self, id: &OrderId, reason: &str) -> Result<OrderEvent, OrderError> {
        let Some(order) = self.open.iter_mut().find(|o| &o.id == id) else {
            return Err(match self.closed.iter().find(|o| &o.id == id) {
                Some(o) => OrderError::NotOpen {
                    id: id.clone(),
                    status: o.status,
                },
                None => OrderError::NotFound(id.clone()),
            });
        };
        order.status = OrderStatus::Cancelled;
        order.cancel_reason = Some(reason.to_string());
        let released_cash = order.release_frozen_cash();
        info!(order_id = %id, reason, released_cash, "order cancelled");
        let event = OrderEvent::Cancelled {
            order: order.clone(),
            released_cash,
        };
        self.retire_terminal();
        Ok(event)
    }

    fn retire_terminal(&mut self) {
        let (closed, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.open)
            .into_iter()
            .partition(|o| o.status.is_terminal());
        self.open = open;
        self.closed.extend(closed);
    }

    // ── Queries ──

    /// Cash reserved across all open orders.
    pub fn frozen_cash(&self) -> f64 {
        self.open.iter().map(|o| o.frozen_cash).sum()
    }

    /// Unfilled shares of open sell orders in `instrument`.
    pub fn pending_sell_quantity(&self, instrument: &InstrumentId) -> i64 {
        self.open
            .iter()
            .filter(|o| &o.instrument == instrument && !o.is_buy())
            .map(|o| o.remaining_quantity())
            .sum()
    }

    pub fn open_orders(&self) -> &[Order] {
        &self.open
    }

    pub fn closed_orders(&self) -> &[Order] {
        &self.closed
    }

    /// All orders ever accepted, open or closed.
    pub fn all_orders(&self) -> impl Iterator<Item = &Order> {
        self.closed.iter().chain(self.open.iter())
    }

    pub fn get(&self, id: &OrderId) -> Option<&Order> {
        self.all_orders().find(|o| &o.id == id)
    }
}

impl std::fmt::Debug for OrderManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderManager")
            .field("validators", &self.validators)
            .field("open", &self.open.len())
            .field("closed", &self.closed.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::InMemoryBarStore;
    use crate::domain::Bar;
    use chrono::{NaiveDate, NaiveDateTime};

    fn inst() -> InstrumentId {
        InstrumentId::parse("000001.SZ").unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn at(d: u32, h: u32, m: u32) -> NaiveDateTime {
        day(d).and_hms_opt(h, m, 0).unwrap()
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

    fn manager(bars: Vec<Bar>) -> OrderManager {
        let mut store = InMemoryBarStore::new();
        store.insert_minute_bars(&inst(), bars);
        OrderManager::new(Arc::new(store))
    }

    fn request(quantity: i64, limit: Option<f64>, time: NaiveDateTime) -> OrderRequest {
        OrderRequest {
            instrument: inst(),
            quantity,
            limit_price: limit,
            reference_price: limit.unwrap_or(10.0),
            time,
        }
    }

    fn buy(om: &mut OrderManager, quantity: i64, limit: Option<f64>, time: NaiveDateTime) -> OrderId {
        let (id, _) = om
            .create_order(request(quantity, limit, time), 1e9, &BTreeMap::new())
            .unwrap();
        id
    }

    #[test]
    fn partial_fills_across_minutes() {
        let mut om = manager(vec![
            bar(at(2, 9, 30), 10.0, 400),
            bar(at(2, 9, 31), 10.2, 400),
        ]);
        let id = buy(&mut om, 300, None, at(2, 9, 0));

        let events = om.advance_fills(at(2, 9, 30));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], OrderEvent::Updated { delta: 200, .. }));
        assert_eq!(om.get(&id).unwrap().status, OrderStatus::Active);

        let events = om.advance_fills(at(2, 9, 31));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], OrderEvent::Updated { delta: 100, .. }));
        assert!(matches!(events[1], OrderEvent::Completed { .. }));

        let order = om.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert!((order.average_filled_price - (200.0 * 10.0 + 100.0 * 10.2) / 300.0).abs() < 1e-9);
        assert!(om.open_orders().is_empty());
    }

    #[test]
    fn boundary_bar_is_not_consumed_twice() {
        let mut om = manager(vec![bar(at(2, 9, 30), 10.0, 200)]);
        let id = buy(&mut om, 300, None, at(2, 9, 0));
        om.advance_fills(at(2, 9, 30));
        om.advance_fills(at(2, 9, 31));
        assert_eq!(om.get(&id).unwrap().filled_quantity, 100);
    }

    #[test]
    fn newest_bar_fills_first() {
        let mut om = manager(vec![
            bar(at(2, 9, 30), 10.0, 200),
            bar(at(2, 9, 31), 11.0, 200),
        ]);
        let id = buy(&mut om, 100, None, at(2, 9, 0));
        om.advance_fills(at(2, 9, 31));
        assert_eq!(om.get(&id).unwrap().average_filled_price, 11.0);
    }

    #[test]
    fn limit_blocks_fill() {
        let mut om = manager(vec![bar(at(2, 9, 30), 10.0, 1_000)]);
        let id = buy(&mut om, 100, Some(9.5), at(2, 9, 0));
        assert!(om.advance_fills(at(2, 9, 30)).is_empty());
        assert_eq!(om.get(&id).unwrap().status, OrderStatus::Pending);
    }

    #[test]
    fn limit_blocked_newest_bar_falls_through_to_older_bar() {
        let mut om = manager(vec![bar(at(2, 9, 30), 9.0, 1_000), bar(at(2, 9, 31), 11.0, 1_000)]);
        let id = buy(&mut om, 300, Some(10.0), at(2, 9, 0));

        let events = om.advance_fills(at(2, 9, 31));
        let updates = events.iter().filter(|e| matches!(e, OrderEvent::Updated { .. })).count();
        assert_eq!(updates, 1);
        assert!(matches!(events[0], OrderEvent::Updated { delta: 300, .. }));

        let order = om.get(&id).unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.filled_quantity, 300);
        assert!((order.average_filled_price - 9.0).abs() < 1e-9);
    }

    #[test]
    fn void_bars_are_skipped() {
        let mut om = manager(vec![bar(at(2, 9, 30), 10.0, 0)]);
        buy(&mut om, 100, None, at(2, 9, 0));
        assert!(om.advance_fills(at(2, 9, 30)).is_empty());
    }

    #[test]
    fn open_orders_expire_at_next_day() {
        let mut om = manager(vec![bar(at(3, 9, 30), 10.0, 10_000)]);
        let id = buy(&mut om, 100, Some(10.0), at(2, 14, 59));
        assert!((om.frozen_cash() - 1_000.0).abs() < 1e-9);

        let events = om.advance_fills(at(3, 9, 30));
        assert_eq!(events.len(), 1);
        match &events[0] {
            OrderEvent::Cancelled { released_cash, .. } => {
                assert!((released_cash - 1_000.0).abs() < 1e-9)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(om.get(&id).unwrap().status, OrderStatus::Cancelled);
        assert_eq!(om.frozen_cash(), 0.0);
    }

    #[test]
    fn unknown_instrument_fails_order() {
        let mut om = OrderManager::new(Arc::new(InMemoryBarStore::new()));
        let id = buy(&mut om, 100, None, at(2, 9, 0));
        let events = om.advance_fills(at(2, 9, 30));
        assert!(matches!(events[0], OrderEvent::Failed { .. }));
        assert_eq!(om.get(&id).unwrap().status, OrderStatus::Failed);
    }

    #[test]
    fn cancel_twice_is_an_error() {
        let mut om = manager(vec![]);
        let id = buy(&mut om, 100, None, at(2, 9, 0));
        assert!(om.cancel(&id, "user").is_ok());
        assert!(matches!(
            om.cancel(&id, "user"),
            Err(OrderError::NotOpen {
                status: OrderStatus::Cancelled,
                ..
            })
        ));
        assert!(matches!(
            om.cancel(&OrderId::new("nope"), "user"),
            Err(OrderError::NotFound(_))
        ));
    }

    #[test]
    fn rejected_order_is_not_recorded() {
        let mut om = manager(vec![]);
        let err = om
            .create_order(request(100, None, at(2, 9, 0)), 10.0, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, OrderError::Rejected { .. }));
        assert_eq!(om.all_orders().count(), 0);
    }

    #[test]
    fn pending_sells_reduce_sellable() {
        let mut om = manager(vec![]);
        let mut positions = BTreeMap::new();
        positions.insert(inst(), Position::open(inst(), 300, 10.0, at(2, 9, 0)));
        om.create_order(request(-200, None, at(2, 9, 0)), 0.0, &positions)
            .unwrap();
        assert_eq!(om.pending_sell_quantity(&inst()), 200);
        let err = om
            .create_order(request(-200, None, at(2, 9, 0)), 0.0, &positions)
            .unwrap_err();
        assert!(matches!(err, OrderError::Rejected { .. }));
    }
}
