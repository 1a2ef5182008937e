//! Serializable backtest configuration, loaded from TOML.
//!
//! ```toml
//! [backtest]
//! name = "all-in"
//! start = "2024-01-02"
//! end = "2024-01-31"
//! initial_cash = 1000000.0
//! benchmark = "000300.SH"
//!
//! [data]
//! instruments = ["000001.SZ"]
//! minute_dir = "data/minute"
//! synthetic = false
//!
//! [strategy]
//! type = "TARGET_WEIGHTS"
//! weights = { "000001.SZ" = 1.0 }
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tframe_core::domain::{InstrumentId, InstrumentIdError};
use tframe_core::strategy::{Frequency, StrategyInfo};
use thiserror::Error;

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error(transparent)]
    Instrument(#[from] InstrumentIdError),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration of one run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestConfig {
    pub backtest: BacktestSection,
    #[serde(default)]
    pub data: DataSection,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskSection,
    #[serde(default)]
    pub output: OutputSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BacktestSection {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_cash: f64,
    #[serde(default)]
    pub benchmark: Option<String>,
    #[serde(default)]
    pub frequency: Frequency,
}

/// Where bars come from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DataSection {
    #[serde(default)]
    pub instruments: Vec<String>,
    /// Directory of `<instrument>.csv` minute files.
    #[serde(default)]
    pub minute_dir: Option<PathBuf>,
    /// Directory of `<instrument>.csv` daily files; derived from minutes if absent.
    #[serde(default)]
    pub daily_dir: Option<PathBuf>,
    /// Generate deterministic bars for instruments without files.
    #[serde(default)]
    pub synthetic: bool,
}

/// Built-in strategies (serializable enum).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyConfig {
    /// Split total value equally across the universe on the first day, then hold.
    BuyAndHold,

    /// Rebalance to fixed weights of total value every morning.
    TargetWeights { weights: BTreeMap<String, f64> },

    /// Place no orders.
    #[default]
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RiskSection {
    /// Reject any single order above this notional.
    #[serde(default)]
    pub max_order_value: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OutputSection {
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl BacktestConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse and validate.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.backtest;
        if b.name.trim().is_empty() {
            return Err(ConfigError::Invalid("backtest.name must not be empty".into()));
        }
        if b.start > b.end {
            return Err(ConfigError::Invalid(format!(
                "backtest.start {} is after backtest.end {}",
                b.start, b.end
            )));
        }
        if !b.initial_cash.is_finite() || b.initial_cash <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "backtest.initial_cash must be positive, got {}",
                b.initial_cash
            )));
        }
        if self.data.instruments.is_empty() {
            return Err(ConfigError::Invalid("data.instruments must not be empty".into()));
        }
        if self.data.minute_dir.is_none() && !self.data.synthetic {
            return Err(ConfigError::Invalid(
                "set data.minute_dir or enable data.synthetic".into(),
            ));
        }
        let universe = self.instruments()?;
        if let Some(benchmark) = &b.benchmark {
            InstrumentId::parse(benchmark)?;
        }
        if let StrategyConfig::TargetWeights { weights } = &self.strategy {
            let mut sum = 0.0;
            for (raw, w) in weights {
                let id = InstrumentId::parse(raw)?;
                if !universe.contains(&id) {
                    return Err(ConfigError::Invalid(format!(
                        "weight for {id} which is not in data.instruments"
                    )));
                }
                if !(0.0..=1.0).contains(w) {
                    return Err(ConfigError::Invalid(format!("weight {w} for {id} outside [0, 1]")));
                }
                sum += w;
            }
            if sum > 1.0 + 1e-9 {
                return Err(ConfigError::Invalid(format!("weights sum to {sum:.4} > 1")));
            }
        }
        if let Some(max) = self.risk.max_order_value {
            if !max.is_finite() || max <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "risk.max_order_value must be positive, got {max}"
                )));
            }
        }
        Ok(())
    }

    /// The universe, parsed and deduplicated in configured order.
    pub fn instruments(&self) -> Result<Vec<InstrumentId>, ConfigError> {
        let mut out: Vec<InstrumentId> = Vec::with_capacity(self.data.instruments.len());
        for raw in &self.data.instruments {
            let id = InstrumentId::parse(raw)?;
            if !out.contains(&id) {
                out.push(id);
            }
        }
        Ok(out)
    }

    pub fn strategy_info(&self) -> Result<StrategyInfo, ConfigError> {
        let b = &self.backtest;
        let mut info = StrategyInfo::new(b.name.clone(), b.start, b.end)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?
            .with_frequency(b.frequency);
        if let Some(benchmark) = &b.benchmark {
            info = info.with_benchmark(InstrumentId::parse(benchmark)?);
        }
        Ok(info)
    }

    /// Deterministic hash of the configuration.
    ///
    /// Two runs with identical configs share a `RunId`. The output section
    /// does not take part: where results go does not change them.
    pub fn run_id(&self) -> RunId {
        let mut hasher = blake3::Hasher::new();
        for part in [
            serde_json::to_vec(&self.backtest),
            serde_json::to_vec(&self.data),
            serde_json::to_vec(&self.strategy),
            serde_json::to_vec(&self.risk),
        ] {
            // Plain data: serialization cannot fail.
            hasher.update(&part.unwrap_or_default());
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Copy with a different starting cash; used by cash sweeps.
    pub fn with_initial_cash(&self, cash: f64) -> Self {
        let mut config = self.clone();
        config.backtest.initial_cash = cash;
        config.backtest.name = format!("{}@{cash}", self.backtest.name);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[backtest]
name = "all-in"
start = "2024-01-02"
end = "2024-01-31"
initial_cash = 1000000.0
benchmark = "000300.sh"

[data]
instruments = ["000001.SZ", "600000.SH", "000001.sz"]
synthetic = true

[strategy]
type = "TARGET_WEIGHTS"
weights = { "000001.SZ" = 0.5, "600000.SH" = 0.4 }

[risk]
max_order_value = 600000.0
"#;

    fn sample() -> BacktestConfig {
        BacktestConfig::from_toml(SAMPLE).unwrap()
    }

    #[test]
    fn parses_full_config() {
        let config = sample();
        assert_eq!(config.backtest.name, "all-in");
        assert_eq!(config.backtest.frequency, Frequency::Minute);
        assert_eq!(config.instruments().unwrap().len(), 2);
        assert_eq!(config.risk.max_order_value, Some(600_000.0));
        let info = config.strategy_info().unwrap();
        assert_eq!(info.benchmark.unwrap().as_str(), "000300.SH");
    }

    #[test]
    fn strategy_defaults_to_none() {
        let text = r#"
[backtest]
name = "idle"
start = "2024-01-02"
end = "2024-01-02"
initial_cash = 1.0

[data]
instruments = ["000001.SZ"]
synthetic = true
"#;
        let config = BacktestConfig::from_toml(text).unwrap();
        assert_eq!(config.strategy, StrategyConfig::None);
    }

    #[test]
    fn rejects_bad_values() {
        let bad_cash = SAMPLE.replace("initial_cash = 1000000.0", "initial_cash = -5.0");
        assert!(matches!(
            BacktestConfig::from_toml(&bad_cash),
            Err(ConfigError::Invalid(_))
        ));

        let bad_id = SAMPLE.replace("\"600000.SH\", ", "\"600000.XX\", ");
        assert!(matches!(
            BacktestConfig::from_toml(&bad_id),
            Err(ConfigError::Instrument(_))
        ));

        let heavy = SAMPLE.replace("0.4 }", "0.6 }");
        assert!(matches!(
            BacktestConfig::from_toml(&heavy),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            BacktestConfig::from_toml("not toml ["),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn run_id_deterministic_and_sensitive() {
        let a = sample();
        assert_eq!(a.run_id(), a.run_id());
        assert_ne!(a.run_id(), a.with_initial_cash(5.0).run_id());

        let mut moved = a.clone();
        moved.output.dir = Some(PathBuf::from("elsewhere"));
        assert_eq!(a.run_id(), moved.run_id());
    }
}
