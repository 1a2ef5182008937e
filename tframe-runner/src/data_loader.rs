//! Bar loading for the runner.
//!
//! For every instrument in the universe:
//! 1. If `<minute_dir>/<id>.csv` exists → load it
//! 2. Else if synthetic data is enabled → generate a deterministic walk (tagged)
//! 3. Otherwise → fail with a clear error
//!
//! Daily bars come from `<daily_dir>/<id>.csv` when present, else they are
//! aggregated from the minute bars.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tframe_core::data::{synthetic, InMemoryBarStore};
use tframe_core::domain::{Bar, InstrumentId};
use thiserror::Error;
use tracing::{info, warn};

use crate::config::DataSection;

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no bar file for {instrument} at {path} (enable data.synthetic for synthetic data)")]
    Missing { instrument: InstrumentId, path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: bad timestamp '{value}'")]
    BadTimestamp { path: PathBuf, row: usize, value: String },
}

/// Where an instrument's bars came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Csv,
    Synthetic,
}

#[derive(Debug)]
pub struct LoadedData {
    pub store: InMemoryBarStore,
    pub sources: BTreeMap<InstrumentId, DataSource>,
    /// BLAKE3 over every loaded bar, in instrument order.
    pub dataset_hash: String,
    pub has_synthetic: bool,
}

#[derive(Debug, Deserialize)]
struct CsvBar {
    #[serde(alias = "date")]
    datetime: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: u64,
    #[serde(default)]
    amount: f64,
}

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(raw, f).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Read one bar file. Columns: `datetime|date,open,high,low,close,volume[,amount]`.
///
/// Rows failing the sanity check are skipped with a warning.
pub fn read_bars_csv(path: &Path) -> Result<Vec<Bar>, LoadError> {
    let csv_err = |source| LoadError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let mut bars = Vec::new();
    for (row, record) in reader.deserialize::<CsvBar>().enumerate() {
        let raw = record.map_err(csv_err)?;
        let timestamp = parse_datetime(&raw.datetime).ok_or_else(|| LoadError::BadTimestamp {
            path: path.to_path_buf(),
            row: row + 1,
            value: raw.datetime.clone(),
        })?;
        let bar = Bar {
            timestamp,
            open: raw.open,
            high: raw.high,
            low: raw.low,
            close: raw.close,
            volume: raw.volume,
            amount: raw.amount,
        };
        if bar.is_sane() {
            bars.push(bar);
        } else {
            warn!(path = %path.display(), row = row + 1, "skipping malformed bar");
        }
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

fn bar_file(dir: &Path, instrument: &InstrumentId) -> PathBuf {
    dir.join(format!("{instrument}.csv"))
}

/// Build an in-memory store for `instruments` over `[start, end]`.
pub fn load_store(
    data: &DataSection,
    instruments: &[InstrumentId],
    start: NaiveDate,
    end: NaiveDate,
) -> Result<LoadedData, LoadError> {
    let mut store = InMemoryBarStore::new();
    let mut sources = BTreeMap::new();

    for instrument in instruments {
        let file = data.minute_dir.as_deref().map(|d| bar_file(d, instrument));
        let (minutes, source) = match file {
            Some(path) if path.exists() => (read_bars_csv(&path)?, DataSource::Csv),
            _ if data.synthetic => {
                warn!(%instrument, "generating synthetic bars; results are tagged synthetic");
                (synthetic::generate_minute_bars(instrument, start, end), DataSource::Synthetic)
            }
            file => {
                return Err(LoadError::Missing {
                    instrument: instrument.clone(),
                    path: file.unwrap_or_else(|| PathBuf::from(format!("{instrument}.csv"))),
                })
            }
        };

        let daily = match data.daily_dir.as_deref().map(|d| bar_file(d, instrument)) {
            Some(path) if path.exists() => read_bars_csv(&path)?,
            _ => synthetic::aggregate_daily(&minutes),
        };

        info!(
            %instrument,
            source = ?source,
            minute_bars = minutes.len(),
            daily_bars = daily.len(),
            "bars loaded"
        );
        store.insert_daily_bars(instrument, daily);
        store.insert_minute_bars(instrument, minutes);
        sources.insert(instrument.clone(), source);
    }

    let dataset_hash = compute_dataset_hash(&store);
    let has_synthetic = sources.values().any(|s| *s == DataSource::Synthetic);
    Ok(LoadedData {
        store,
        sources,
        dataset_hash,
        has_synthetic,
    })
}

/// Deterministic BLAKE3 hash over all bar data.
///
/// Instruments are visited in sorted order, so the hash does not depend on
/// the order they were loaded in.
pub fn compute_dataset_hash(store: &InMemoryBarStore) -> String {
    let mut hasher = blake3::Hasher::new();
    for instrument in store.instruments() {
        hasher.update(instrument.as_str().as_bytes());
        for (tag, bars) in [
            (b"m", store.all_minute_bars(&instrument).collect::<Vec<_>>()),
            (b"d", store.all_daily_bars(&instrument).collect::<Vec<_>>()),
        ] {
            hasher.update(tag);
            for bar in bars {
                hasher.update(bar.timestamp.to_string().as_bytes());
                hasher.update(&bar.open.to_le_bytes());
                hasher.update(&bar.high.to_le_bytes());
                hasher.update(&bar.low.to_le_bytes());
                hasher.update(&bar.close.to_le_bytes());
                hasher.update(&bar.volume.to_le_bytes());
                hasher.update(&bar.amount.to_le_bytes());
            }
        }
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tframe_core::data::BarStore;

    fn id() -> InstrumentId {
        InstrumentId::parse("000001.SZ").unwrap()
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn write_minutes(dir: &Path) {
        let mut f = std::fs::File::create(dir.join("000001.SZ.csv")).unwrap();
        writeln!(f, "datetime,open,high,low,close,volume,amount").unwrap();
        writeln!(f, "2024-01-02 09:31:00,10.1,10.2,10.0,10.2,2000,20400").unwrap();
        writeln!(f, "2024-01-02 09:30:00,10.0,10.1,9.9,10.1,1000,10100").unwrap();
        // high below low: skipped
        writeln!(f, "2024-01-02 09:32:00,10.0,9.0,10.0,10.0,1000,10000").unwrap();
    }

    #[test]
    fn loads_csv_and_derives_daily() {
        let dir = tempfile::tempdir().unwrap();
        write_minutes(dir.path());
        let data = DataSection {
            instruments: vec!["000001.SZ".into()],
            minute_dir: Some(dir.path().to_path_buf()),
            daily_dir: None,
            synthetic: false,
        };
        let loaded = load_store(&data, &[id()], d(2), d(2)).unwrap();
        assert!(!loaded.has_synthetic);
        assert_eq!(loaded.sources[&id()], DataSource::Csv);
        assert_eq!(loaded.store.minute_bar_count(), 2);

        let daily = loaded.store.daily_bars(&id(), d(2), d(2)).unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].close, 10.2);
        assert_eq!(daily[0].volume, 3000);
    }

    #[test]
    fn missing_file_without_synthetic_fails() {
        let dir = tempfile::tempdir().unwrap();
        let data = DataSection {
            instruments: vec!["000001.SZ".into()],
            minute_dir: Some(dir.path().to_path_buf()),
            daily_dir: None,
            synthetic: false,
        };
        assert!(matches!(
            load_store(&data, &[id()], d(2), d(2)),
            Err(LoadError::Missing { .. })
        ));
    }

    #[test]
    fn synthetic_fallback_is_deterministic() {
        let data = DataSection {
            instruments: vec!["000001.SZ".into()],
            minute_dir: None,
            daily_dir: None,
            synthetic: true,
        };
        let a = load_store(&data, &[id()], d(2), d(5)).unwrap();
        let b = load_store(&data, &[id()], d(2), d(5)).unwrap();
        assert!(a.has_synthetic);
        assert_eq!(a.dataset_hash, b.dataset_hash);
        assert_eq!(a.store.trading_days(d(1), d(31)).unwrap().len(), 4);
    }

    #[test]
    fn bad_timestamp_is_reported_with_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.csv");
        std::fs::write(&path, "datetime,open,high,low,close,volume\nyesterday,1,1,1,1,1\n").unwrap();
        match read_bars_csv(&path) {
            Err(LoadError::BadTimestamp { row, value, .. }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
