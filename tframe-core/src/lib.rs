//! tframe core: a discrete-event backtest simulator for A-share strategies.
//!
//! - Domain types (instrument ids, bars, orders, fills, positions)
//! - Bar store contract, in-memory store, trading calendar
//! - Minute-level fill engine with pre-trade validators
//! - Account ledger driven by order events
//! - Deterministic scheduler and the strategy callback contract

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod strategy;

pub use error::SetupError;
