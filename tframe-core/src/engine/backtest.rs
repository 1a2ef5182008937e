//! One fully wired run: account, clock participants, strategy.

use super::account::BacktestAccount;
use super::clocks::{AccountClock, OrderClock, PositionClock, SnapshotClock};
use super::events::OrderObserver;
use super::scheduler::{Scheduler, SchedulerStats, StopHandle, TimeConsumer};
use super::validators::OrderValidator;
use crate::data::{BarStore, TradingCalendar};
use crate::error::SetupError;
use crate::strategy::{Strategy, StrategyInfo, StrategyTrigger};
use chrono::NaiveTime;
use std::sync::Arc;

pub struct Backtest {
    info: StrategyInfo,
    account: BacktestAccount,
    scheduler: Scheduler,
}

/// Everything left after the clock stops.
#[derive(Debug)]
pub struct BacktestOutcome {
    pub info: StrategyInfo,
    pub account: BacktestAccount,
    pub stats: SchedulerStats,
    pub calendar: TradingCalendar,
}

impl Backtest {
    /// Build the calendar from `store` and register the ledger clocks.
    pub fn new(store: Arc<dyn BarStore>, info: StrategyInfo, initial_cash: f64) -> Result<Self, SetupError> {
        let calendar = TradingCalendar::from_store(store.as_ref(), info.start, info.end)?;
        let account = BacktestAccount::new(store, initial_cash, info.start.and_time(NaiveTime::MIN))?;
        let mut scheduler = Scheduler::new(calendar, info.start);
        scheduler.register(Box::new(AccountClock));
        scheduler.register(Box::new(PositionClock));
        scheduler.register(Box::new(OrderClock));
        Ok(Self {
            info,
            account,
            scheduler,
        })
    }

    pub fn info(&self) -> &StrategyInfo {
        &self.info
    }

    pub fn calendar(&self) -> &TradingCalendar {
        self.scheduler.calendar()
    }

    pub fn account(&self) -> &BacktestAccount {
        &self.account
    }

    pub fn add_strategy(&mut self, strategy: Box<dyn Strategy>) {
        let trigger = StrategyTrigger::new(&self.info, strategy);
        self.scheduler.register(Box::new(trigger));
    }

    pub fn register(&mut self, consumer: Box<dyn TimeConsumer>) {
        self.scheduler.register(consumer);
    }

    pub fn add_observer(&mut self, observer: Box<dyn OrderObserver>) {
        self.account.add_observer(observer);
    }

    pub fn add_validator(&mut self, validator: Box<dyn OrderValidator>) {
        self.account.add_validator(validator);
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.scheduler.stop_handle()
    }

    /// Run to the end of the calendar (or until stopped). The snapshot clock
    /// is registered here, behind every strategy added so far.
    pub fn run(mut self) -> Result<BacktestOutcome, SetupError> {
        self.scheduler.register(Box::new(SnapshotClock));
        let stats = self.scheduler.run(&mut self.account, &self.info)?.clone();
        Ok(BacktestOutcome {
            info: self.info,
            account: self.account,
            stats,
            calendar: self.scheduler.calendar().clone(),
        })
    }
}

impl std::fmt::Debug for Backtest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backtest")
            .field("info", &self.info)
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
