//! Trading calendar: the ordered set of sessions one run steps through.

use super::store::BarStore;
use crate::error::SetupError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ordered, deduplicated trading dates. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingCalendar {
    days: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Build from explicit dates; sorts and deduplicates.
    pub fn new(mut days: Vec<NaiveDate>, start: NaiveDate, end: NaiveDate) -> Result<Self, SetupError> {
        if start > end {
            return Err(SetupError::InvalidDateRange { start, end });
        }
        days.retain(|d| *d >= start && *d <= end);
        days.sort_unstable();
        days.dedup();
        if days.is_empty() {
            return Err(SetupError::EmptyCalendar { start, end });
        }
        Ok(Self { days })
    }

    /// Ask the bar store which sessions exist in `[start, end]`.
    pub fn from_store(store: &dyn BarStore, start: NaiveDate, end: NaiveDate) -> Result<Self, SetupError> {
        if start > end {
            return Err(SetupError::InvalidDateRange { start, end });
        }
        let days = store.trading_days(start, end)?;
        Self::new(days, start, end)
    }

    pub fn days(&self) -> &[NaiveDate] {
        &self.days
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn first(&self) -> NaiveDate {
        self.days[0]
    }

    pub fn last(&self) -> NaiveDate {
        self.days[self.days.len() - 1]
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days.binary_search(&date).is_ok()
    }
}
