//! Order lifecycle events and the observer contract.
//!
//! The order manager never calls observers directly: it returns the events it
//! produced, and the account dispatches them, in order, to every registered
//! observer (position manager, cash ledger, then user observers).

use crate::domain::Order;
use chrono::NaiveDateTime;

/// Everything that can happen to an order after validation.
#[derive(Debug, Clone)]
pub enum OrderEvent {
    Created {
        order: Order,
    },
    /// A non-zero fill of `delta` shares (signed) at `price`.
    Updated {
        order: Order,
        delta: i64,
        price: f64,
        time: NaiveDateTime,
    },
    Completed {
        order: Order,
        released_cash: f64,
    },
    Cancelled {
        order: Order,
        released_cash: f64,
    },
    Failed {
        order: Order,
        released_cash: f64,
    },
}

impl OrderEvent {
    pub fn order(&self) -> &Order {
        match self {
            Self::Created { order }
            | Self::Updated { order, .. }
            | Self::Completed { order, .. }
            | Self::Cancelled { order, .. }
            | Self::Failed { order, .. } => order,
        }
    }

    /// Route this event to the matching observer method.
    pub fn dispatch(&self, observer: &mut dyn OrderObserver) {
        match self {
            Self::Created { order } => observer.on_order_create(order),
            Self::Updated {
                order,
                delta,
                price,
                time,
            } => observer.on_order_update(order, *delta, *price, *time),
            Self::Completed {
                order,
                released_cash,
            } => observer.on_order_completed(order, *released_cash),
            Self::Cancelled {
                order,
                released_cash,
            } => observer.on_order_cancelled(order, *released_cash),
            Self::Failed {
                order,
                released_cash,
            } => observer.on_order_failed(order, *released_cash),
        }
    }
}

/// Listener for order lifecycle events. Every method defaults to a no-op.
pub trait OrderObserver: Send {
    fn on_order_create(&mut self, _order: &Order) {}

    fn on_order_update(&mut self, _order: &Order, _delta: i64, _price: f64, _time: NaiveDateTime) {}

    fn on_order_completed(&mut self, _order: &Order, _released_cash: f64) {}

    fn on_order_cancelled(&mut self, _order: &Order, _released_cash: f64) {}

    fn on_order_failed(&mut self, order: &Order, released_cash: f64) {
        self.on_order_cancelled(order, released_cash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstrumentId, OrderId};
    use chrono::NaiveDate;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl OrderObserver for Recorder {
        fn on_order_create(&mut self, order: &Order) {
            self.0.push(format!("create {}", order.quantity));
        }
        fn on_order_update(&mut self, _order: &Order, delta: i64, price: f64, _time: NaiveDateTime) {
            self.0.push(format!("update {delta}@{price}"));
        }
        fn on_order_cancelled(&mut self, _order: &Order, released_cash: f64) {
            self.0.push(format!("cancel {released_cash}"));
        }
    }

    #[test]
    fn dispatch_routes_by_variant_and_failed_defaults_to_cancelled() {
        let t = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let order = Order::new(
            OrderId::new("o"),
            InstrumentId::parse("000001.SZ").unwrap(),
            100,
            None,
            10.0,
            t,
        );
        let events = [
            OrderEvent::Created { order: order.clone() },
            OrderEvent::Updated {
                order: order.clone(),
                delta: 100,
                price: 9.5,
                time: t,
            },
            OrderEvent::Failed {
                order,
                released_cash: 50.0,
            },
        ];
        let mut rec = Recorder::default();
        for e in &events {
            e.dispatch(&mut rec);
        }
        assert_eq!(rec.0, vec!["create 100", "update 100@9.5", "cancel 50"]);
    }
}
