//! Performance metrics: pure functions over the daily equity curve.
//!
//! Every metric is a pure function: equity curve and/or order list in, scalar
//! out. No dependencies on the runner or the data pipeline.

use serde::{Deserialize, Serialize};
use tframe_core::domain::{Order, OrderStatus};

/// A-share sessions per year, for annualisation.
pub const TRADING_DAYS_PER_YEAR: f64 = 242.0;

/// Aggregate statistics for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe: f64,
    pub max_drawdown: f64,
    pub trading_days: usize,
    pub order_count: usize,
    pub completed_orders: usize,
    pub cancelled_orders: usize,
    pub failed_orders: usize,
    pub fill_count: usize,
}

impl RunMetrics {
    /// `equity_curve` starts with the initial cash, then one value per day.
    pub fn compute<'a>(
        equity_curve: &[f64],
        orders: impl IntoIterator<Item = &'a Order>,
        fill_count: usize,
    ) -> Self {
        let trading_days = equity_curve.len().saturating_sub(1);
        let mut metrics = Self {
            total_return: total_return(equity_curve),
            annualized_return: annualized_return(equity_curve, trading_days),
            sharpe: sharpe_ratio(equity_curve),
            max_drawdown: max_drawdown(equity_curve),
            trading_days,
            order_count: 0,
            completed_orders: 0,
            cancelled_orders: 0,
            failed_orders: 0,
            fill_count,
        };
        for order in orders {
            metrics.order_count += 1;
            match order.status {
                OrderStatus::Completed => metrics.completed_orders += 1,
                OrderStatus::Cancelled => metrics.cancelled_orders += 1,
                OrderStatus::Failed => metrics.failed_orders += 1,
                OrderStatus::Pending | OrderStatus::Active => {}
            }
        }
        metrics
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&first), Some(&last)) if equity_curve.len() >= 2 && first > 0.0 => (last - first) / first,
        _ => 0.0,
    }
}

/// Compound annual return. Returns 0.0 for fewer than two days.
pub fn annualized_return(equity_curve: &[f64], trading_days: usize) -> f64 {
    if trading_days < 2 {
        return 0.0;
    }
    let growth = 1.0 + total_return(equity_curve);
    if growth <= 0.0 {
        return -1.0;
    }
    growth.powf(TRADING_DAYS_PER_YEAR / trading_days as f64) - 1.0
}

/// Annualized Sharpe ratio from daily returns, zero risk-free rate.
///
/// Returns 0.0 if variance is zero or there are fewer than 2 returns.
pub fn sharpe_ratio(equity_curve: &[f64]) -> f64 {
    let returns = daily_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    let std = var.sqrt();
    if std < 1e-15 {
        return 0.0;
    }
    mean / std * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
///
/// Returns 0.0 if equity is constant or monotonically increasing.
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        peak = peak.max(eq);
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

pub fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}
