use super::ids::InstrumentId;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Long-only position in one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: InstrumentId,
    pub quantity: i64,
    pub cost_price: f64,
    pub current_price: f64,
    pub market_value: f64,
    /// Profit at `current_price` against the diluted cost price. Sells fold
    /// their gain into the cost, so this is the position's total profit.
    pub profit: f64,
    pub opened_at: NaiveDateTime,
}

impl Position {
    pub fn open(instrument: InstrumentId, quantity: i64, price: f64, time: NaiveDateTime) -> Self {
        let mut position = Self {
            instrument,
            quantity,
            cost_price: price,
            current_price: price,
            market_value: 0.0,
            profit: 0.0,
            opened_at: time,
        };
        position.mark(price);
        position
    }

    pub fn is_flat(&self) -> bool {
        self.quantity == 0
    }

    /// Apply a signed fill using the quantity-weighted cost formula
    /// `(cost*qty + delta*price) / (qty + delta)`.
    ///
    /// A fill that flattens the position keeps the previous cost price.
    pub fn apply_fill(&mut self, delta: i64, price: f64) {
        let new_quantity = self.quantity + delta;
        if new_quantity != 0 {
            self.cost_price = (self.cost_price * self.quantity as f64 + delta as f64 * price)
                / new_quantity as f64;
        }
        self.quantity = new_quantity;
        self.mark(self.current_price);
    }

    /// Mark to market without touching quantity or cost.
    pub fn mark(&mut self, current_price: f64) {
        self.current_price = current_price;
        self.market_value = self.quantity as f64 * current_price;
        self.profit = (current_price - self.cost_price) * self.quantity as f64;
    }

    /// Unrealized profit relative to cost basis; zero for a flat position.
    pub fn profit_rate(&self) -> f64 {
        let basis = self.cost_price * self.quantity as f64;
        if basis == 0.0 {
            0.0
        } else {
            self.profit / basis
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn spy() -> InstrumentId {
        InstrumentId::parse("000001.SZ").unwrap()
    }

    #[test]
    fn weighted_average_cost_on_add() {
        let mut pos = Position::open(spy(), 100, 10.0, t0());
        pos.apply_fill(300, 12.0);
        assert_eq!(pos.quantity, 400);
        assert!((pos.cost_price - 11.5).abs() < 1e-12);
    }

    #[test]
    fn mark_updates_value_and_profit() {
        let mut pos = Position::open(spy(), 200, 10.0, t0());
        pos.mark(11.0);
        assert_eq!(pos.market_value, 2200.0);
        assert!((pos.profit - 200.0).abs() < 1e-12);
        assert!((pos.profit_rate() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn partial_sell_dilutes_cost() {
        let mut pos = Position::open(spy(), 200, 10.0, t0());
        pos.mark(12.0);
        pos.apply_fill(-100, 12.0);
        // (10*200 - 12*100) / 100
        assert!((pos.cost_price - 8.0).abs() < 1e-12);
        // 400 total gain on 200 shares bought at 10, sold/marked at 12
        assert!((pos.profit - 400.0).abs() < 1e-9);
    }

    #[test]
    fn full_exit_keeps_cost() {
        let mut pos = Position::open(spy(), 100, 10.0, t0());
        pos.mark(12.0);
        pos.apply_fill(-100, 12.0);
        assert!(pos.is_flat());
        assert_eq!(pos.cost_price, 10.0);
        assert_eq!(pos.market_value, 0.0);
        assert_eq!(pos.profit_rate(), 0.0);
    }
}
