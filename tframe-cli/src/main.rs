//! tframe CLI: run, sweep and calendar commands.
//!
//! Commands:
//! - `run`: execute a backtest from a TOML config file and write artifacts
//! - `sweep`: rerun one config across several starting cash values in parallel
//! - `calendar`: list the trading days (and optionally one day's clock) a config covers

mod logging;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tframe_core::data::{BarStore, TradingCalendar};
use tframe_core::engine::day_schedule;
use tframe_runner::{
    best_by_return, cash_grid, load_store, run_sweep, write_artifacts, BacktestConfig,
    BacktestResult,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "tframe", about = "tframe: minute-bar A-share backtest simulator")]
struct Cli {
    /// Default log filter when RUST_LOG is unset (e.g. info, debug, tframe_core=trace).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a backtest from a TOML config file.
    Run {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Override the start date (YYYY-MM-DD).
        #[arg(long)]
        start: Option<String>,

        /// Override the end date (YYYY-MM-DD).
        #[arg(long)]
        end: Option<String>,

        /// Output directory. Defaults to `output.dir` from the config, then ./results.
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Print the full result as JSON instead of a summary.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run the same config across several initial cash values.
    Sweep {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Initial cash values, e.g. `--cash 100000 --cash 1000000`.
        #[arg(long, required = true)]
        cash: Vec<f64>,

        /// Write artifacts for every run into this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Show the trading calendar covered by a config.
    Calendar {
        /// Path to a TOML config file.
        #[arg(long)]
        config: PathBuf,

        /// Also print the full clock schedule of this date.
        #[arg(long)]
        schedule: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(&cli.log_level);

    match cli.command {
        Commands::Run {
            config,
            start,
            end,
            output_dir,
            json,
        } => run_cmd(&config, start.as_deref(), end.as_deref(), output_dir, json),
        Commands::Sweep {
            config,
            cash,
            output_dir,
        } => sweep_cmd(&config, &cash, output_dir.as_deref()),
        Commands::Calendar { config, schedule } => calendar_cmd(&config, schedule.as_deref()),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").with_context(|| format!("invalid date '{raw}'"))
}

fn run_cmd(
    config_path: &Path,
    start: Option<&str>,
    end: Option<&str>,
    output_dir: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let mut config = BacktestConfig::from_file(config_path)?;
    if let Some(start) = start {
        config.backtest.start = parse_date(start)?;
    }
    if let Some(end) = end {
        config.backtest.end = parse_date(end)?;
    }

    let result = tframe_runner::run_backtest(&config)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_summary(&result);
    }

    let output_dir = output_dir
        .or_else(|| config.output.dir.clone())
        .unwrap_or_else(|| PathBuf::from("results"));
    let run_dir = write_artifacts(&result, &output_dir)?;
    info!(dir = %run_dir.display(), "artifacts written");
    if !json {
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(())
}

fn sweep_cmd(config_path: &Path, cash: &[f64], output_dir: Option<&Path>) -> Result<()> {
    let config = BacktestConfig::from_file(config_path)?;
    let universe = config.instruments()?;
    let loaded = load_store(&config.data, &universe, config.backtest.start, config.backtest.end)?;
    let store: Arc<dyn BarStore> = Arc::new(loaded.store);

    let configs = cash_grid(&config, cash);
    let results = run_sweep(&configs, store, &loaded.dataset_hash, loaded.has_synthetic)?;

    println!(
        "{:<32} {:>14} {:>10} {:>8} {:>8}",
        "Run", "Final value", "Return", "Sharpe", "Orders"
    );
    println!("{}", "-".repeat(76));
    for r in &results {
        println!(
            "{:<32} {:>14.2} {:>9.2}% {:>8.3} {:>8}",
            r.name,
            r.final_value,
            r.metrics.total_return * 100.0,
            r.metrics.sharpe,
            r.metrics.order_count
        );
    }
    if let Some(best) = best_by_return(&results) {
        println!("\nBest by return: {}", results[best].name);
    }

    if let Some(dir) = output_dir {
        for r in &results {
            write_artifacts(r, dir)?;
        }
        println!("Artifacts saved to: {}", dir.display());
    }
    Ok(())
}

fn calendar_cmd(config_path: &Path, schedule: Option<&str>) -> Result<()> {
    let config = BacktestConfig::from_file(config_path)?;
    let universe = config.instruments()?;
    let loaded = load_store(&config.data, &universe, config.backtest.start, config.backtest.end)?;
    let calendar =
        TradingCalendar::from_store(&loaded.store, config.backtest.start, config.backtest.end)?;

    println!(
        "{} trading days from {} to {}",
        calendar.len(),
        calendar.first(),
        calendar.last()
    );
    for day in calendar.days() {
        println!("  {day}");
    }

    if let Some(raw) = schedule {
        let date = parse_date(raw)?;
        if !calendar.contains(date) {
            bail!("{date} is not a trading day in this calendar");
        }
        println!("\nSchedule for {date}:");
        for event in day_schedule(date) {
            println!("  {}  {}", event.time.format("%H:%M"), event.callback);
        }
    }
    Ok(())
}

fn print_summary(result: &BacktestResult) {
    let m = &result.metrics;
    println!("=== Backtest: {} ===", result.name);
    println!("Run ID:         {}", &result.run_id[..12.min(result.run_id.len())]);
    println!("Period:         {} to {} ({} days)", result.start, result.end, m.trading_days);
    println!("Initial cash:   {:.2}", result.initial_cash);
    println!("Final value:    {:.2}", result.final_value);
    println!("Total return:   {:.2}%", m.total_return * 100.0);
    println!("Annualized:     {:.2}%", m.annualized_return * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Max drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!(
        "Orders:         {} ({} completed, {} cancelled, {} failed)",
        m.order_count, m.completed_orders, m.cancelled_orders, m.failed_orders
    );
    println!("Fills:          {}", m.fill_count);
    println!("Open positions: {}", result.final_positions.len());
    if !result.callback_failures.is_empty() {
        println!("Callback failures: {}", result.callback_failures.len());
        for f in result.callback_failures.iter().take(5) {
            println!("  {} {} at {}: {}", f.participant, f.callback, f.time, f.message);
        }
    }
    if result.stopped_early {
        println!("Stopped early.");
    }
    if result.has_synthetic {
        println!("WARNING: results use SYNTHETIC data.");
    }
}
