//! Domain types for the simulator.

pub mod bar;
pub mod fill;
pub mod ids;
pub mod order;
pub mod position;

pub use bar::Bar;
pub use fill::Fill;
pub use ids::{IdGen, InstrumentId, InstrumentIdError, OrderId};
pub use order::{Order, OrderStatus};
pub use position::Position;

/// Minimum tradable share increment for A-shares.
pub const LOT_SIZE: i64 = 100;
