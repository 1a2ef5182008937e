//! In-memory bar store backed by ordered maps.

use super::store::{BarStore, DataError};
use crate::domain::{Bar, InstrumentId};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{BTreeMap, BTreeSet};

/// Bar store holding every bar in memory.
///
/// Keyed by instrument then timestamp, so range queries are ordered and
/// iteration over instruments is deterministic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBarStore {
    minute: BTreeMap<InstrumentId, BTreeMap<NaiveDateTime, Bar>>,
    daily: BTreeMap<InstrumentId, BTreeMap<NaiveDate, Bar>>,
}

impl InMemoryBarStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert minute bars; a bar with an existing timestamp replaces the old one.
    pub fn insert_minute_bars(&mut self, instrument: &InstrumentId, bars: impl IntoIterator<Item = Bar>) {
        let series = self.minute.entry(instrument.clone()).or_default();
        for bar in bars {
            series.insert(bar.timestamp, bar);
        }
    }

    /// Insert daily bars; a bar with an existing date replaces the old one.
    pub fn insert_daily_bars(&mut self, instrument: &InstrumentId, bars: impl IntoIterator<Item = Bar>) {
        let series = self.daily.entry(instrument.clone()).or_default();
        for bar in bars {
            series.insert(bar.date(), bar);
        }
    }

    /// All instruments with at least one bar, sorted.
    pub fn instruments(&self) -> Vec<InstrumentId> {
        let set: BTreeSet<&InstrumentId> = self.minute.keys().chain(self.daily.keys()).collect();
        set.into_iter().cloned().collect()
    }

    pub fn contains(&self, instrument: &InstrumentId) -> bool {
        self.minute.contains_key(instrument) || self.daily.contains_key(instrument)
    }

    pub fn minute_bar_count(&self) -> usize {
        self.minute.values().map(BTreeMap::len).sum()
    }

    pub fn daily_bar_count(&self) -> usize {
        self.daily.values().map(BTreeMap::len).sum()
    }

    /// Every minute bar of one instrument, oldest first.
    pub fn all_minute_bars(&self, instrument: &InstrumentId) -> impl Iterator<Item = &Bar> {
        self.minute.get(instrument).into_iter().flat_map(|s| s.values())
    }

    /// Every daily bar of one instrument, oldest first.
    pub fn all_daily_bars(&self, instrument: &InstrumentId) -> impl Iterator<Item = &Bar> {
        self.daily.get(instrument).into_iter().flat_map(|s| s.values())
    }

    fn ensure_known(&self, instrument: &InstrumentId) -> Result<(), DataError> {
        if self.contains(instrument) {
            Ok(())
        } else {
            Err(DataError::UnknownInstrument(instrument.clone()))
        }
    }
}

impl BarStore for InMemoryBarStore {
    fn minute_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Bar>, DataError> {
        self.ensure_known(instrument)?;
        if start > end {
            return Err(DataError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(self
            .minute
            .get(instrument)
            .map(|series| series.range(start..=end).map(|(_, bar)| bar.clone()).collect())
            .unwrap_or_default())
    }

    fn daily_bars(
        &self,
        instrument: &InstrumentId,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, DataError> {
        self.ensure_known(instrument)?;
        if start > end {
            return Err(DataError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(self
            .daily
            .get(instrument)
            .map(|series| series.range(start..=end).map(|(_, bar)| bar.clone()).collect())
            .unwrap_or_default())
    }

    fn current_price(&self, instrument: &InstrumentId, time: NaiveDateTime) -> Result<f64, DataError> {
        self.ensure_known(instrument)?;
        let from_minutes = self
            .minute
            .get(instrument)
            .and_then(|series| series.range(..=time).next_back())
            .map(|(_, bar)| bar);
        let from_daily = || {
            self.daily
                .get(instrument)
                .and_then(|series| series.range(..time.date()).next_back())
                .map(|(_, bar)| bar)
        };

        // A daily close is never older than a minute bar from the same session.
        let bar = match (from_minutes, from_daily()) {
            (Some(m), Some(d)) if d.date() >= m.date() => Some(d),
            (Some(m), _) => Some(m),
            (None, d) => d,
        };
        bar.map(|b| b.close).ok_or_else(|| DataError::NoPrice {
            instrument: instrument.clone(),
            time,
        })
    }

    fn trading_days(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<NaiveDate>, DataError> {
        if start > end {
            return Err(DataError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        // A session exists if either resolution has a bar for it.
        let lo = start.and_time(NaiveTime::MIN);
        let hi = end.and_hms_opt(23, 59, 59).unwrap_or(lo);
        let days: BTreeSet<NaiveDate> = self
            .daily
            .values()
            .flat_map(|series| series.range(start..=end).map(|(date, _)| *date))
            .chain(
                self.minute
                    .values()
                    .flat_map(|series| series.range(lo..=hi).map(|(ts, _)| ts.date())),
            )
            .collect();
        Ok(days.into_iter().collect())
    }
}
