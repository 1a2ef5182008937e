//! Criterion benchmarks for simulator hot paths.
//!
//! Benchmarks:
//! 1. Full simulated month with a rebalancing strategy
//! 2. Fill engine over one session for a single open order

use chrono::{NaiveDate, NaiveDateTime};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use tframe_core::data::{synthetic, BarStore, InMemoryBarStore};
use tframe_core::domain::InstrumentId;
use tframe_core::engine::{
    trading_minutes, Account, Backtest, BacktestAccount, CallbackResult, Context,
};
use tframe_core::strategy::{Strategy, StrategyInfo};

// ── Helpers ──────────────────────────────────────────────────────────

fn instruments() -> Vec<InstrumentId> {
    ["600000.SH", "000001.SZ", "300750.SZ"]
        .iter()
        .map(|s| InstrumentId::parse(s).unwrap())
        .collect()
}

fn month_store() -> Arc<dyn BarStore> {
    let mut store = InMemoryBarStore::new();
    synthetic::populate(
        &mut store,
        &instruments(),
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
    );
    Arc::new(store)
}

/// Equal-weights the universe every morning.
struct EqualWeight(Vec<InstrumentId>);

impl Strategy for EqualWeight {
    fn on_trade_day_start(&mut self, _t: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        let weight = 1.0 / self.0.len() as f64;
        for id in &self.0 {
            let _ = ctx.account().rebalance_by_total_percent(id, weight * 0.95, None);
        }
        Ok(())
    }
}

// ── 1. Simulated month ───────────────────────────────────────────────

fn bench_month(c: &mut Criterion) {
    let store = month_store();
    c.bench_function("simulated_month_3_instruments", |b| {
        b.iter(|| {
            let info = StrategyInfo::new(
                "bench",
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap();
            let mut backtest = Backtest::new(Arc::clone(&store), info, 1_000_000.0).unwrap();
            backtest.add_strategy(Box::new(EqualWeight(instruments())));
            black_box(backtest.run().unwrap())
        })
    });
}

// ── 2. Fill engine ───────────────────────────────────────────────────

fn bench_fill_session(c: &mut Criterion) {
    let store = month_store();
    let day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    let minutes = trading_minutes(day);
    let id = instruments()[0].clone();

    c.bench_function("fill_engine_one_session", |b| {
        b.iter(|| {
            let mut account =
                BacktestAccount::new(Arc::clone(&store), 1e9, minutes[0]).unwrap();
            let _ = account.order(&id, 10_000_000, None);
            for t in &minutes {
                account.set_time(*t);
                account.advance_fills(*t);
            }
            black_box(account.available_cash())
        })
    });
}

criterion_group!(benches, bench_month, bench_fill_session);
criterion_main!(benches);
