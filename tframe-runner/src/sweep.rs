//! Parallel sweeps: many configs against one shared, already loaded store.

use std::sync::Arc;

use rayon::prelude::*;
use tracing::info;

use tframe_core::data::BarStore;

use crate::config::BacktestConfig;
use crate::runner::{run_with_store, BacktestResult, RunError};

/// One config per entry of `cash`, each a copy of `base`.
pub fn cash_grid(base: &BacktestConfig, cash: &[f64]) -> Vec<BacktestConfig> {
    cash.iter().map(|&c| base.with_initial_cash(c)).collect()
}

/// Run every config in parallel. Results keep the input order.
///
/// Runs share no mutable state: each builds its own account and scheduler
/// over the same read-only store.
pub fn run_sweep(
    configs: &[BacktestConfig],
    store: Arc<dyn BarStore>,
    dataset_hash: &str,
    has_synthetic: bool,
) -> Result<Vec<BacktestResult>, RunError> {
    info!(runs = configs.len(), "starting sweep");
    configs
        .par_iter()
        .map(|config| run_with_store(config, Arc::clone(&store), dataset_hash, has_synthetic))
        .collect()
}

/// Index of the run with the highest total return.
pub fn best_by_return(results: &[BacktestResult]) -> Option<usize> {
    results
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            a.metrics
                .total_return
                .partial_cmp(&b.metrics.total_return)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(i, _)| i)
}
