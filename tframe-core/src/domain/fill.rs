use crate::domain::ids::{InstrumentId, OrderId};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Fill record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: OrderId,
    pub instrument: InstrumentId,
    /// Scheduler tick at which the fill was booked.
    pub time: NaiveDateTime,
    /// Signed: positive bought, negative sold.
    pub quantity: i64,
    pub price: f64,
}

impl Fill {
    /// Signed cash flow of the fill: negative for buys, positive for sells.
    pub fn cash_flow(&self) -> f64 {
        -(self.quantity as f64) * self.price
    }
}
