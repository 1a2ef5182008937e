//! Fatal setup errors: anything that stops a run before the clock starts.

use crate::data::DataError;
use crate::domain::InstrumentIdError;
use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("trading calendar between {start} and {end} is empty")]
    EmptyCalendar { start: NaiveDate, end: NaiveDate },

    #[error("start date {start} is after end date {end}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error(transparent)]
    InvalidInstrument(#[from] InstrumentIdError),

    #[error("initial cash must be positive, got {0}")]
    InvalidInitialCash(f64),

    #[error("scheduler has already run")]
    AlreadyStarted,

    #[error("could not build trading calendar: {0}")]
    Data(#[from] DataError),
}
