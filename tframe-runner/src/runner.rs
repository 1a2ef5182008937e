//! Backtest runner: builds the simulator from a config and condenses the
//! outcome into a [`BacktestResult`].
//!
//! Two entry points:
//! - `run_backtest()`: loads data per the config, then runs. Used by the CLI.
//! - `run_with_store()`: takes a pre-loaded shared store. Used by sweeps.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use tframe_core::data::BarStore;
use tframe_core::domain::{Fill, Order, Position};
use tframe_core::engine::{
    Account, AccountSnapshot, Backtest, BacktestOutcome, CallbackFailure, MaxOrderValueValidator,
};
use tframe_core::SetupError;

use crate::config::{BacktestConfig, ConfigError, RunId};
use crate::data_loader::{load_store, LoadError};
use crate::metrics::RunMetrics;
use crate::strategies::build_strategy;

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
    #[error("setup error: {0}")]
    Setup(#[from] SetupError),
}

/// Current schema version for persisted artifacts.
pub const SCHEMA_VERSION: u32 = 1;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_cash: f64,
    pub final_value: f64,
    pub metrics: RunMetrics,
    /// One entry per completed trading day.
    pub snapshots: Vec<AccountSnapshot>,
    pub final_positions: Vec<Position>,
    pub orders: Vec<Order>,
    pub fills: Vec<Fill>,
    pub callback_failures: Vec<CallbackFailure>,
    pub stopped_early: bool,
    pub dataset_hash: String,
    pub has_synthetic: bool,
    /// BLAKE3 over snapshots and fills; equal hashes mean identical replays.
    pub trajectory_hash: String,
}

/// Default schema version for serde deserialization of older JSON without the field.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestResult {
    /// Initial cash followed by each day's closing total value.
    pub fn equity_curve(&self) -> Vec<f64> {
        std::iter::once(self.initial_cash)
            .chain(self.snapshots.iter().map(|s| s.total_value))
            .collect()
    }
}

/// Run a single backtest from a config, loading its data first.
pub fn run_backtest(config: &BacktestConfig) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let universe = config.instruments()?;
    let loaded = load_store(&config.data, &universe, config.backtest.start, config.backtest.end)?;
    run_with_store(
        config,
        Arc::new(loaded.store),
        &loaded.dataset_hash,
        loaded.has_synthetic,
    )
}

/// Run a backtest against an already loaded store. No I/O.
pub fn run_with_store(
    config: &BacktestConfig,
    store: Arc<dyn BarStore>,
    dataset_hash: &str,
    has_synthetic: bool,
) -> Result<BacktestResult, RunError> {
    config.validate()?;
    let universe = config.instruments()?;
    let info = config.strategy_info()?;
    let strategy = build_strategy(&config.strategy, &universe)?;

    let mut backtest = Backtest::new(store, info, config.backtest.initial_cash)?;
    if let Some(max) = config.risk.max_order_value {
        backtest.add_validator(Box::new(MaxOrderValueValidator::new(max)));
    }
    backtest.add_strategy(strategy);

    let run_id = config.run_id();
    info!(run_id = %&run_id[..12], name = %config.backtest.name, "running backtest");
    let outcome = backtest.run()?;
    Ok(summarize(config, run_id, outcome, dataset_hash, has_synthetic))
}

fn summarize(
    config: &BacktestConfig,
    run_id: RunId,
    outcome: BacktestOutcome,
    dataset_hash: &str,
    has_synthetic: bool,
) -> BacktestResult {
    let account = &outcome.account;
    let snapshots = account.snapshots().to_vec();
    let orders: Vec<Order> = account.order_manager().all_orders().cloned().collect();
    let fills = account.fills().to_vec();

    let mut equity = vec![account.initial_cash()];
    equity.extend(snapshots.iter().map(|s| s.total_value));
    let metrics = RunMetrics::compute(&equity, &orders, fills.len());
    let trajectory_hash = trajectory_hash(&snapshots, &fills);

    BacktestResult {
        schema_version: SCHEMA_VERSION,
        run_id,
        name: config.backtest.name.clone(),
        start: config.backtest.start,
        end: config.backtest.end,
        initial_cash: account.initial_cash(),
        final_value: account.total_value(),
        metrics,
        snapshots,
        final_positions: account.positions().values().cloned().collect(),
        orders,
        fills,
        callback_failures: outcome.stats.failures.clone(),
        stopped_early: outcome.stats.stopped_early,
        dataset_hash: dataset_hash.to_string(),
        has_synthetic,
        trajectory_hash,
    }
}

/// Deterministic BLAKE3 digest of the daily account path and every fill.
pub fn trajectory_hash(snapshots: &[AccountSnapshot], fills: &[Fill]) -> String {
    let mut hasher = blake3::Hasher::new();
    for s in snapshots {
        hasher.update(s.date.to_string().as_bytes());
        hasher.update(&s.available_cash.to_le_bytes());
        hasher.update(&s.frozen_cash.to_le_bytes());
        hasher.update(&s.market_value.to_le_bytes());
        hasher.update(&s.total_value.to_le_bytes());
    }
    for f in fills {
        hasher.update(f.order_id.as_str().as_bytes());
        hasher.update(f.time.to_string().as_bytes());
        hasher.update(&f.quantity.to_le_bytes());
        hasher.update(&f.price.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}
