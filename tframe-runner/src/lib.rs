//! tframe runner: everything around a single simulation.
//!
//! This crate builds on `tframe-core` to provide:
//! - TOML configuration with content-addressed run ids
//! - CSV and synthetic bar loading with dataset hashing
//! - Built-in strategies selectable from config
//! - Single runs, parallel sweeps and performance metrics
//! - JSON/CSV artifact export

pub mod config;
pub mod data_loader;
pub mod export;
pub mod metrics;
pub mod runner;
pub mod strategies;
pub mod sweep;

pub use config::{BacktestConfig, ConfigError, RunId, StrategyConfig};
pub use data_loader::{load_store, DataSource, LoadError, LoadedData};
pub use export::{export_json, import_json, load_artifacts, write_artifacts};
pub use metrics::RunMetrics;
pub use runner::{run_backtest, run_with_store, BacktestResult, RunError, SCHEMA_VERSION};
pub use strategies::build_strategy;
pub use sweep::{best_by_return, cash_grid, run_sweep};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn backtest_result_is_send_sync() {
        assert_send::<BacktestResult>();
        assert_sync::<BacktestResult>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<BacktestConfig>();
        assert_sync::<BacktestConfig>();
        assert_send::<StrategyConfig>();
        assert_sync::<StrategyConfig>();
    }

    #[test]
    fn run_metrics_is_send_sync() {
        assert_send::<RunMetrics>();
        assert_sync::<RunMetrics>();
    }

    #[test]
    fn loaded_data_is_send_sync() {
        assert_send::<LoadedData>();
        assert_sync::<LoadedData>();
    }
}
