//! Export: JSON summary with schema versioning, CSV tables for the daily
//! account path, orders and fills.
//!
//! Unknown schema versions are rejected on load.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tframe_core::domain::{Fill, Order};
use tframe_core::engine::AccountSnapshot;

use crate::runner::{BacktestResult, SCHEMA_VERSION};

// ─── JSON export ────────────────────────────────────────────────────

/// Serialize a `BacktestResult` to pretty JSON.
pub fn export_json(result: &BacktestResult) -> Result<String> {
    serde_json::to_string_pretty(result).context("failed to serialize BacktestResult to JSON")
}

/// Deserialize a `BacktestResult` from JSON, rejecting unknown schema versions.
pub fn import_json(json: &str) -> Result<BacktestResult> {
    let result: BacktestResult =
        serde_json::from_str(json).context("failed to deserialize BacktestResult from JSON")?;
    if result.schema_version > SCHEMA_VERSION {
        bail!(
            "unsupported schema version {} (max supported: {})",
            result.schema_version,
            SCHEMA_VERSION
        );
    }
    Ok(result)
}

// ─── CSV export ─────────────────────────────────────────────────────

fn finish(wtr: csv::Writer<Vec<u8>>) -> Result<String> {
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// One row per trading day.
pub fn export_equity_csv(snapshots: &[AccountSnapshot]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "date",
        "available_cash",
        "frozen_cash",
        "market_value",
        "total_value",
        "profit",
        "open_positions",
    ])?;
    for s in snapshots {
        wtr.write_record([
            &s.date.to_string(),
            &format!("{:.2}", s.available_cash),
            &format!("{:.2}", s.frozen_cash),
            &format!("{:.2}", s.market_value),
            &format!("{:.2}", s.total_value),
            &format!("{:.2}", s.profit),
            &s.open_positions.to_string(),
        ])?;
    }
    finish(wtr)
}

/// Columns: id, instrument, quantity, limit_price, created_at, status,
/// filled_quantity, average_filled_price, cancel_reason
pub fn export_orders_csv(orders: &[Order]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record([
        "id",
        "instrument",
        "quantity",
        "limit_price",
        "created_at",
        "status",
        "filled_quantity",
        "average_filled_price",
        "cancel_reason",
    ])?;
    for o in orders {
        wtr.write_record([
            o.id.as_str(),
            o.instrument.as_str(),
            &o.quantity.to_string(),
            &o.limit_price.map(|p| format!("{p:.2}")).unwrap_or_default(),
            &o.created_at.to_string(),
            &format!("{:?}", o.status),
            &o.filled_quantity.to_string(),
            &format!("{:.4}", o.average_filled_price),
            o.cancel_reason.as_deref().unwrap_or(""),
        ])?;
    }
    finish(wtr)
}

pub fn export_fills_csv(fills: &[Fill]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["order_id", "instrument", "time", "quantity", "price", "cash_flow"])?;
    for f in fills {
        wtr.write_record([
            f.order_id.as_str(),
            f.instrument.as_str(),
            &f.time.to_string(),
            &f.quantity.to_string(),
            &format!("{:.2}", f.price),
            &format!("{:.2}", f.cash_flow()),
        ])?;
    }
    finish(wtr)
}

// ─── Artifact bundle ────────────────────────────────────────────────

/// Write the artifact set for one run into `{output_dir}/{name}_{run_id prefix}/`:
/// - `summary.json`: the full `BacktestResult`
/// - `equity.csv`: daily account snapshots
/// - `orders.csv`: every order with its final status
/// - `fills.csv`: every fill
///
/// Returns the created directory.
pub fn write_artifacts(result: &BacktestResult, output_dir: &Path) -> Result<PathBuf> {
    let prefix = result.run_id.get(..12).unwrap_or(&result.run_id);
    let name: String = result
        .name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let run_dir = output_dir.join(format!("{name}_{prefix}"));
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create artifact dir: {}", run_dir.display()))?;

    std::fs::write(run_dir.join("summary.json"), export_json(result)?)?;
    std::fs::write(run_dir.join("equity.csv"), export_equity_csv(&result.snapshots)?)?;
    std::fs::write(run_dir.join("orders.csv"), export_orders_csv(&result.orders)?)?;
    std::fs::write(run_dir.join("fills.csv"), export_fills_csv(&result.fills)?)?;

    Ok(run_dir)
}

/// Load a `BacktestResult` from an artifact directory's summary.json.
pub fn load_artifacts(dir: &Path) -> Result<BacktestResult> {
    let path = dir.join("summary.json");
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    import_json(&json)
}
