//! Built-in participants that settle the ledger on the clock.
//!
//! The account, position and order clocks are registered ahead of any
//! strategy, in that order, so a strategy's `after_trade_minute` always sees
//! that minute's fills. [`SnapshotClock`] goes in behind the strategies so the
//! day's snapshot includes whatever they did at `AfterTradeDay`.

use super::scheduler::{CallbackResult, Context, TimeConsumer};
use chrono::NaiveDateTime;

/// Keeps the account's simulated time current.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccountClock;

impl AccountClock {
    fn tick(&self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        ctx.ledger().set_time(time);
        Ok(())
    }
}

impl TimeConsumer for AccountClock {
    fn name(&self) -> &str {
        "account"
    }

    fn trade_init(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.tick(time, ctx)
    }

    fn before_trade_day(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.tick(time, ctx)
    }

    fn on_trade_day_start(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.tick(time, ctx)
    }

    fn on_trade_day_end(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.tick(time, ctx)
    }

    fn after_trade_minute(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.tick(time, ctx)
    }

    fn after_trade_day(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.tick(time, ctx)
    }
}

/// Drops flat positions once the day is over.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositionClock;

impl TimeConsumer for PositionClock {
    fn name(&self) -> &str {
        "position_manager"
    }

    fn after_trade_day(&mut self, _time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        ctx.ledger().sweep_flat_positions();
        Ok(())
    }
}

/// Runs the fill engine every minute.
#[derive(Debug, Default, Clone, Copy)]
pub struct OrderClock;

impl TimeConsumer for OrderClock {
    fn name(&self) -> &str {
        "order_manager"
    }

    fn after_trade_minute(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        ctx.ledger().advance_fills(time);
        Ok(())
    }
}

/// Records the end-of-day snapshot after every other participant has run.
#[derive(Debug, Default, Clone, Copy)]
pub struct SnapshotClock;

impl TimeConsumer for SnapshotClock {
    fn name(&self) -> &str {
        "snapshot"
    }

    fn after_trade_day(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        let snapshot = ctx.ledger().record_snapshot(time);
        tracing::info!(
            date = %snapshot.date,
            total_value = snapshot.total_value,
            cash = snapshot.available_cash,
            frozen = snapshot.frozen_cash,
            positions = snapshot.open_positions,
            "day closed"
        );
        Ok(())
    }
}
