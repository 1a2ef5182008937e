//! Orders and their lifecycle states.

use super::ids::{InstrumentId, OrderId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Order lifecycle states.
///
/// `Pending → Active → {Completed | Cancelled | Failed}`. Terminal states are
/// final; an order never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, nothing filled yet.
    Pending,
    /// Partially filled.
    Active,
    /// Completely filled.
    Completed,
    /// Cancelled by the user or by the end-of-day sweep.
    Cancelled,
    /// Could not be worked at all (e.g. instrument unknown to the bar store).
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// A single simulated order.
///
/// Quantities are signed: positive buys, negative sells. `filled_quantity`
/// always carries the same sign as `quantity` and never exceeds it in
/// magnitude.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub instrument: InstrumentId,
    pub quantity: i64,
    /// `None` is a market order.
    pub limit_price: Option<f64>,
    /// Price used for cash reservation and pre-trade validation.
    pub reference_price: f64,
    pub created_at: NaiveDateTime,
    /// End of the last bar window this order was worked against.
    pub last_update_time: NaiveDateTime,
    /// Newest bar already offered to this order; older bars are never reused.
    pub scanned_through: Option<NaiveDateTime>,
    pub status: OrderStatus,
    pub filled_quantity: i64,
    pub average_filled_price: f64,
    /// Cash still reserved against this order (buys only).
    pub frozen_cash: f64,
    pub cancel_reason: Option<String>,
}

impl Order {
    pub fn new(
        id: OrderId,
        instrument: InstrumentId,
        quantity: i64,
        limit_price: Option<f64>,
        reference_price: f64,
        created_at: NaiveDateTime,
    ) -> Self {
        let frozen_cash = if quantity > 0 {
            quantity as f64 * reference_price
        } else {
            0.0
        };
        Self {
            id,
            instrument,
            quantity,
            limit_price,
            reference_price,
            created_at,
            last_update_time: created_at,
            scanned_through: None,
            status: OrderStatus::Pending,
            filled_quantity: 0,
            average_filled_price: 0.0,
            frozen_cash,
            cancel_reason: None,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.quantity > 0
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Unfilled shares, unsigned.
    pub fn remaining_quantity(&self) -> i64 {
        (self.quantity - self.filled_quantity).abs()
    }

    /// Limit rule: buys fill at or below the limit, sells at or above it.
    pub fn accepts_price(&self, price: f64) -> bool {
        match self.limit_price {
            None => true,
            Some(limit) if self.is_buy() => price <= limit,
            Some(limit) => price >= limit,
        }
    }

    /// Fill up to `available` shares at `price`.
    ///
    /// Returns the signed fill delta (zero when the limit rejects the price,
    /// nothing is available, or the order is no longer open).
    pub fn fill(&mut self, available: i64, price: f64) -> i64 {
        if !self.is_open() || available <= 0 || !self.accepts_price(price) {
            return 0;
        }
        let take = available.min(self.remaining_quantity());
        if take == 0 {
            return 0;
        }

        let filled_abs = self.filled_quantity.abs() as f64;
        self.average_filled_price =
            (self.average_filled_price * filled_abs + price * take as f64) / (filled_abs + take as f64);

        let delta = if self.is_buy() { take } else { -take };
        self.filled_quantity += delta;
        if self.is_buy() {
            self.frozen_cash -= take as f64 * price;
        }

        if self.filled_quantity.abs() >= self.quantity.abs() {
            self.filled_quantity = self.quantity;
            self.status = OrderStatus::Completed;
        } else {
            self.status = OrderStatus::Active;
        }
        delta
    }

    /// Hand back whatever cash is still reserved. Returns the released amount.
    pub fn release_frozen_cash(&mut self) -> f64 {
        std::mem::take(&mut self.frozen_cash)
    }
}
