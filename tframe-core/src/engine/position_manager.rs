//! Position manager: positions follow fills, prices follow the bar store.

use super::events::OrderObserver;
use crate::data::BarStore;
use crate::domain::{InstrumentId, Order, Position};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct PositionManager {
    store: Arc<dyn BarStore>,
    positions: BTreeMap<InstrumentId, Position>,
    last_marked: Option<NaiveDateTime>,
}

impl PositionManager {
    pub fn new(store: Arc<dyn BarStore>) -> Self {
        Self {
            store,
            positions: BTreeMap::new(),
            last_marked: None,
        }
    }

    pub fn positions(&self) -> &BTreeMap<InstrumentId, Position> {
        &self.positions
    }

    pub fn get(&self, instrument: &InstrumentId) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn quantity(&self, instrument: &InstrumentId) -> i64 {
        self.positions.get(instrument).map_or(0, |p| p.quantity)
    }

    pub fn market_value(&self) -> f64 {
        self.positions.values().map(|p| p.market_value).sum()
    }

    pub fn profit(&self) -> f64 {
        self.positions.values().map(|p| p.profit).sum()
    }

    /// Re-mark every position at `time`.
    ///
    /// Calling twice for the same instant is a no-op; a missing price keeps
    /// the previous mark.
    pub fn update_positions(&mut self, time: NaiveDateTime) {
        if self.last_marked == Some(time) {
            return;
        }
        for (instrument, position) in self.positions.iter_mut() {
            match self.store.current_price(instrument, time) {
                Ok(price) => position.mark(price),
                Err(err) => debug!(%instrument, error = %err, "keeping previous mark"),
            }
        }
        self.last_marked = Some(time);
    }

    /// End-of-day sweep: drop positions that went flat.
    pub fn after_trade_day(&mut self) {
        self.positions.retain(|_, p| !p.is_flat());
    }
}

impl OrderObserver for PositionManager {
    fn on_order_update(&mut self, order: &Order, delta: i64, price: f64, time: NaiveDateTime) {
        let mark = match self.store.current_price(&order.instrument, time) {
            Ok(p) => p,
            Err(err) => {
                warn!(instrument = %order.instrument, error = %err, "marking at fill price");
                price
            }
        };
        let reopen = self
            .positions
            .get(&order.instrument)
            .map_or(true, Position::is_flat);
        if reopen {
            let mut position = Position::open(order.instrument.clone(), delta, price, time);
            position.mark(mark);
            self.positions.insert(order.instrument.clone(), position);
        } else if let Some(position) = self.positions.get_mut(&order.instrument) {
            position.apply_fill(delta, price);
            position.mark(mark);
        }
        // Fills move the position; the next update must re-mark.
        self.last_marked = None;
    }
}

impl std::fmt::Debug for PositionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionManager")
            .field("positions", &self.positions)
            .finish()
    }
}
