//! User strategy contract and its adapter onto the clock.

use crate::domain::InstrumentId;
use crate::engine::scheduler::{CallbackResult, Context, TimeConsumer};
use crate::error::SetupError;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// How often a strategy wants to be woken inside the day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    /// Every minute tick.
    #[default]
    Minute,
    /// Day-level callbacks only; `after_trade_minute` is not forwarded.
    Day,
}

/// Static facts about the strategy being run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyInfo {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub benchmark: Option<InstrumentId>,
    pub frequency: Frequency,
}

impl StrategyInfo {
    pub fn new(name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Result<Self, SetupError> {
        if start > end {
            return Err(SetupError::InvalidDateRange { start, end });
        }
        Ok(Self {
            name: name.into(),
            start,
            end,
            benchmark: None,
            frequency: Frequency::default(),
        })
    }

    pub fn with_benchmark(mut self, benchmark: InstrumentId) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    pub fn with_frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }
}

/// A trading strategy. Implement only the callbacks you need.
pub trait Strategy: Send {
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

/// Adapts a [`Strategy`] to the scheduler, honouring its [`Frequency`].
pub struct StrategyTrigger {
    name: String,
    frequency: Frequency,
    strategy: Box<dyn Strategy>,
}

impl StrategyTrigger {
    pub fn new(info: &StrategyInfo, strategy: Box<dyn Strategy>) -> Self {
        Self {
            name: info.name.clone(),
            frequency: info.frequency,
            strategy,
        }
    }
}

impl TimeConsumer for StrategyTrigger {
    fn name(&self) -> &str {
        &self.name
    }

    fn trade_init(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.strategy.trade_init(time, ctx)
    }

    fn before_trade_day(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.strategy.before_trade_day(time, ctx)
    }

    fn on_trade_day_start(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.strategy.on_trade_day_start(time, ctx)
    }

    fn on_trade_day_end(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.strategy.on_trade_day_end(time, ctx)
    }

    fn after_trade_day(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        self.strategy.after_trade_day(time, ctx)
    }

    fn after_trade_minute(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        match self.frequency {
            Frequency::Minute => self.strategy.after_trade_minute(time, ctx),
            Frequency::Day => Ok(()),
        }
    }
}
