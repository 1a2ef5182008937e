//! Deterministic synthetic bars for demos, tests and benchmarks.
//!
//! Produces a random walk per instrument seeded from the BLAKE3 hash of the
//! instrument id, so the same id and date range always yield the same bars.

use super::memory::InMemoryBarStore;
use crate::domain::{Bar, InstrumentId};
use crate::engine::schedule::trading_minutes;
use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Weekdays in `[start, end]`. Holidays are not modelled.
pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

fn round_tick(price: f64) -> f64 {
    (price * 100.0).round() / 100.0
}

/// Minute bars for every trading minute of every weekday in `[start, end]`.
pub fn generate_minute_bars(instrument: &InstrumentId, start: NaiveDate, end: NaiveDate) -> Vec<Bar> {
    let seed: [u8; 32] = *blake3::hash(instrument.as_str().as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);
    let mut price: f64 = rng.gen_range(5.0..50.0);

    let mut bars = Vec::new();
    for day in weekdays(start, end) {
        for timestamp in trading_minutes(day) {
            let open = round_tick(price);
            let step: f64 = rng.gen_range(-0.002..0.002);
            let close = round_tick((price * (1.0 + step)).max(0.01));
            let high = round_tick(open.max(close) * (1.0 + rng.gen_range(0.0..0.001)));
            let low = round_tick((open.min(close) * (1.0 - rng.gen_range(0.0..0.001))).max(0.01));
            let volume = rng.gen_range(10u64..2_000) * 100;
            bars.push(Bar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
                amount: close * volume as f64,
            });
            price = close;
        }
    }
    bars
}

/// Collapse minute bars (oldest first) into one bar per date.
pub fn aggregate_daily(minute_bars: &[Bar]) -> Vec<Bar> {
    let mut daily: Vec<Bar> = Vec::new();
    for bar in minute_bars {
        match daily.last_mut() {
            Some(day) if day.date() == bar.date() => {
                day.high = day.high.max(bar.high);
                day.low = day.low.min(bar.low);
                day.close = bar.close;
                day.volume += bar.volume;
                day.amount += bar.amount;
            }
            _ => daily.push(Bar {
                timestamp: bar.date().and_hms_opt(0, 0, 0).unwrap_or(bar.timestamp),
                ..bar.clone()
            }),
        }
    }
    daily
}

/// Fill `store` with synthetic minute and daily bars for each instrument.
pub fn populate(store: &mut InMemoryBarStore, instruments: &[InstrumentId], start: NaiveDate, end: NaiveDate) {
    for instrument in instruments {
        let minutes = generate_minute_bars(instrument, start, end);
        store.insert_daily_bars(instrument, aggregate_daily(&minutes));
        store.insert_minute_bars(instrument, minutes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn weekdays_skip_weekends() {
        // 2024-01-06 and 07 are a weekend
        let days = weekdays(d(4), d(9));
        assert_eq!(days, vec![d(4), d(5), d(8), d(9)]);
    }

    #[test]
    fn generation_is_deterministic_per_instrument() {
        let a = InstrumentId::parse("000001.SZ").unwrap();
        let b = InstrumentId::parse("600000.SH").unwrap();
        let first = generate_minute_bars(&a, d(2), d(3));
        let again = generate_minute_bars(&a, d(2), d(3));
        let other = generate_minute_bars(&b, d(2), d(3));
        assert_eq!(first, again);
        assert_eq!(first.len(), 2 * 242);
        assert_ne!(first[0].close, other[0].close);
        assert!(first.iter().all(Bar::is_sane));
    }

    #[test]
    fn daily_aggregation_spans_the_session() {
        let a = InstrumentId::parse("000001.SZ").unwrap();
        let minutes = generate_minute_bars(&a, d(2), d(3));
        let daily = aggregate_daily(&minutes);
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].open, minutes[0].open);
        assert_eq!(daily[0].close, minutes[241].close);
        let volume: u64 = minutes[..242].iter().map(|b| b.volume).sum();
        assert_eq!(daily[0].volume, volume);
    }
}
