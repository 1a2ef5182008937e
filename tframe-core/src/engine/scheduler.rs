//! The simulated clock.
//!
//! One scheduler drives one run: `TradeInit` once, then the fixed intraday
//! schedule for every calendar day. Participants are called in registration
//! order; a failing participant is logged and skipped, never fatal.

use super::account::{Account, BacktestAccount};
use super::schedule::{day_schedule, Callback, ClockEvent};
use crate::data::{BarStore, TradingCalendar};
use crate::error::SetupError;
use crate::strategy::StrategyInfo;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

pub type CallbackResult = anyhow::Result<()>;

// ── Participants ──

/// Anything driven by the clock. Every callback defaults to a no-op.
pub trait TimeConsumer: Send {
    fn name(&self) -> &str;

    fn trade_init(&mut self, _time: NaiveDateTime, _ctx: &mut Context<'_>) -> CallbackResult {
        Ok(())
    }

    fn before_trade_day(&mut self, _time: NaiveDateTime, _ctx: &mut Context<'_>) -> CallbackResult {
        Ok(())
    }

    fn on_trade_day_start(&mut self, _time: NaiveDateTime, _ctx: &mut Context<'_>) -> CallbackResult {
        Ok(())
    }

    fn on_trade_day_end(&mut self, _time: NaiveDateTime, _ctx: &mut Context<'_>) -> CallbackResult {
        Ok(())
    }

    fn after_trade_day(&mut self, _time: NaiveDateTime, _ctx: &mut Context<'_>) -> CallbackResult {
        Ok(())
    }

    fn after_trade_minute(&mut self, _time: NaiveDateTime, _ctx: &mut Context<'_>) -> CallbackResult {
        Ok(())
    }
}

fn invoke(consumer: &mut dyn TimeConsumer, event: ClockEvent, ctx: &mut Context<'_>) -> CallbackResult {
    let t = event.time;
    match event.callback {
        Callback::TradeInit => consumer.trade_init(t, ctx),
        Callback::BeforeTradeDay => consumer.before_trade_day(t, ctx),
        Callback::OnTradeDayStart => consumer.on_trade_day_start(t, ctx),
        Callback::OnTradeDayEnd => consumer.on_trade_day_end(t, ctx),
        Callback::AfterTradeDay => consumer.after_trade_day(t, ctx),
        Callback::AfterTradeMinute => consumer.after_trade_minute(t, ctx),
    }
}

/// Shared flag that ends a run at the next minute or day boundary.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What a participant can reach during a callback.
pub struct Context<'a> {
    account: &'a mut BacktestAccount,
    info: &'a StrategyInfo,
    stop: &'a StopHandle,
    pending: &'a mut Vec<Box<dyn TimeConsumer>>,
}

impl<'a> Context<'a> {
    pub fn new(
        account: &'a mut BacktestAccount,
        info: &'a StrategyInfo,
        stop: &'a StopHandle,
        pending: &'a mut Vec<Box<dyn TimeConsumer>>,
    ) -> Self {
        Self {
            account,
            info,
            stop,
            pending,
        }
    }

    /// The account through its strategy-facing role.
    pub fn account(&mut self) -> &mut dyn Account {
        &mut *self.account
    }

    /// The concrete ledger, for clock participants that settle it.
    pub fn ledger(&mut self) -> &mut BacktestAccount {
        &mut *self.account
    }

    pub fn store(&self) -> &dyn BarStore {
        self.account.store()
    }

    pub fn info(&self) -> &StrategyInfo {
        self.info
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Ask the scheduler to end the run at the next boundary.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Add a participant. It starts receiving callbacks with the next event.
    pub fn register(&mut self, consumer: Box<dyn TimeConsumer>) {
        self.pending.push(consumer);
    }
}

// ── Scheduler ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchedulerState {
    NotStarted,
    Running,
    Finished,
}

/// A participant callback that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackFailure {
    pub participant: String,
    pub callback: Callback,
    pub time: NaiveDateTime,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub days_run: usize,
    pub events_fired: usize,
    pub stopped_early: bool,
    pub failures: Vec<CallbackFailure>,
}

pub struct Scheduler {
    calendar: TradingCalendar,
    start: NaiveDate,
    consumers: Vec<Box<dyn TimeConsumer>>,
    state: SchedulerState,
    stop: StopHandle,
    stats: SchedulerStats,
}

impl Scheduler {
    /// `start` dates `TradeInit`; the calendar supplies the trading days.
    pub fn new(calendar: TradingCalendar, start: NaiveDate) -> Self {
        Self {
            calendar,
            start,
            consumers: Vec::new(),
            state: SchedulerState::NotStarted,
            stop: StopHandle::default(),
            stats: SchedulerStats::default(),
        }
    }

    pub fn register(&mut self, consumer: Box<dyn TimeConsumer>) {
        self.consumers.push(consumer);
    }

    pub fn participant_names(&self) -> Vec<&str> {
        self.consumers.iter().map(|c| c.name()).collect()
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Drive every participant through the calendar.
    pub fn run(
        &mut self,
        account: &mut BacktestAccount,
        info: &StrategyInfo,
    ) -> Result<&SchedulerStats, SetupError> {
        if self.state != SchedulerState::NotStarted {
            return Err(SetupError::AlreadyStarted);
        }
        self.state = SchedulerState::Running;
        info!(
            strategy = %info.name,
            days = self.calendar.len(),
            participants = self.consumers.len(),
            "backtest started"
        );

        let init = ClockEvent::new(Callback::TradeInit, self.start.and_time(chrono::NaiveTime::MIN));
        self.fire(init, account, info);

        let days = self.calendar.days().to_vec();
        'days: for day in days {
            if self.stop.is_stopped() {
                self.stats.stopped_early = true;
                break;
            }
            debug!(%day, "trading day");
            for event in day_schedule(day) {
                if event.callback == Callback::AfterTradeMinute && self.stop.is_stopped() {
                    self.stats.stopped_early = true;
                    break 'days;
                }
                self.fire(event, account, info);
            }
            self.stats.days_run += 1;
        }

        self.state = SchedulerState::Finished;
        info!(
            days_run = self.stats.days_run,
            events = self.stats.events_fired,
            failures = self.stats.failures.len(),
            stopped_early = self.stats.stopped_early,
            "backtest finished"
        );
        Ok(&self.stats)
    }

    fn fire(&mut self, event: ClockEvent, account: &mut BacktestAccount, info: &StrategyInfo) {
        let mut pending = Vec::new();
        for consumer in self.consumers.iter_mut() {
            let mut ctx = Context::new(account, info, &self.stop, &mut pending);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                invoke(consumer.as_mut(), event, &mut ctx)
            }));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => format!("{err:#}"),
                Err(payload) => panic_message(payload.as_ref()),
            };
            error!(
                participant = consumer.name(),
                callback = %event.callback,
                time = %event.time,
                "callback failed: {message}"
            );
            self.stats.failures.push(CallbackFailure {
                participant: consumer.name().to_string(),
                callback: event.callback,
                time: event.time,
                message,
            });
        }
        self.stats.events_fired += 1;
        self.consumers.append(&mut pending);
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("state", &self.state)
            .field("days", &self.calendar.len())
            .field("participants", &self.participant_names())
            .finish()
    }
}
