//! Market data: the bar store contract, an in-memory store, the trading
//! calendar and a synthetic generator.

pub mod calendar;
pub mod memory;
pub mod store;
pub mod synthetic;

pub use calendar::TradingCalendar;
pub use memory::InMemoryBarStore;
pub use store::{BarStore, DataError};
