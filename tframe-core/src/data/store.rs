//! Bar Store contract and structured error types.
//!
//! The simulator only ever reads from a bar store. Implementations must be
//! deterministic and idempotent: the same query always returns the same bars,
//! so parallel runs can share one store behind an `Arc`.

use crate::domain::{Bar, InstrumentId};
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Structured error types for bar store reads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataError {
    #[error("instrument {0} is unknown to the bar store")]
    UnknownInstrument(InstrumentId),

    #[error("no price for {instrument} at or before {time}")]
    NoPrice {
        instrument: InstrumentId,
        time: NaiveDateTime,
    },

    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    #[error("data error: {0}")]
    Other(String),
}

/// Read-only source of historical bars.
pub trait BarStore: Send + Sync {
    /// 1-minute bars with `start <= timestamp <= end`, oldest first.
    fn minute_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, DataError>;

    /// Daily bars with `start <= date <= end`, oldest first.
    fn daily_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError>;

    /// Latest known price at `time` without looking ahead: the close of the
    /// newest minute bar at or before `time`, else the close of the newest
    /// daily bar strictly before `time`'s date.
    fn current_price(&self, instrument: &InstrumentId, time: NaiveDateTime) -> Result<f64, DataError>;

    /// Distinct trading dates within `[start, end]`, ascending.
    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, DataError>;
}
