//! The fixed intraday event schedule of an A-share trading day.
//!
//! ```text
//! 09:00            BeforeTradeDay
//! 09:30 ..= 11:30  AfterTradeMinute          (09:31 also OnTradeDayStart)
//! 13:00 ..= 15:00  AfterTradeMinute          (14:55 also OnTradeDayEnd)
//! 16:00            AfterTradeDay
//! ```

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The six lifecycle callbacks every time consumer receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Callback {
    TradeInit,
    BeforeTradeDay,
    OnTradeDayStart,
    OnTradeDayEnd,
    AfterTradeDay,
    AfterTradeMinute,
}

impl Callback {
    pub fn name(self) -> &'static str {
        match self {
            Self::TradeInit => "TradeInit",
            Self::BeforeTradeDay => "BeforeTradeDay",
            Self::OnTradeDayStart => "OnTradeDayStart",
            Self::OnTradeDayEnd => "OnTradeDayEnd",
            Self::AfterTradeDay => "AfterTradeDay",
            Self::AfterTradeMinute => "AfterTradeMinute",
        }
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One scheduled callback at one simulated instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockEvent {
    pub callback: Callback,
    pub time: NaiveDateTime,
}

impl ClockEvent {
    pub fn new(callback: Callback, time: NaiveDateTime) -> Self {
        Self { callback, time }
    }
}

const fn hm(hour: u32, minute: u32) -> NaiveTime {
    match NaiveTime::from_hms_opt(hour, minute, 0) {
        Some(t) => t,
        None => panic!("invalid session time"),
    }
}

pub const BEFORE_TRADE_DAY: NaiveTime = hm(9, 0);
pub const MORNING_OPEN: NaiveTime = hm(9, 30);
pub const MORNING_CLOSE: NaiveTime = hm(11, 30);
pub const AFTERNOON_OPEN: NaiveTime = hm(13, 0);
pub const AFTERNOON_CLOSE: NaiveTime = hm(15, 0);
pub const TRADE_DAY_START: NaiveTime = hm(9, 31);
pub const TRADE_DAY_END: NaiveTime = hm(14, 55);
pub const AFTER_TRADE_DAY: NaiveTime = hm(16, 0);

/// Number of `AfterTradeMinute` ticks in one session day.
pub const MINUTES_PER_DAY: usize = 242;

fn minutes_between(date: NaiveDate, open: NaiveTime, close: NaiveTime) -> impl Iterator<Item = NaiveDateTime> {
    let first = date.and_time(open);
    let last = date.and_time(close);
    (0..)
        .map(move |i| first + Duration::minutes(i))
        .take_while(move |t| *t <= last)
}

/// Every minute tick of `date`, morning then afternoon, both ends inclusive.
pub fn trading_minutes(date: NaiveDate) -> Vec<NaiveDateTime> {
    minutes_between(date, MORNING_OPEN, MORNING_CLOSE)
        .chain(minutes_between(date, AFTERNOON_OPEN, AFTERNOON_CLOSE))
        .collect()
}

/// The ordered events of one trading day.
pub fn day_schedule(date: NaiveDate) -> Vec<ClockEvent> {
    let mut events = Vec::with_capacity(MINUTES_PER_DAY + 4);
    events.push(ClockEvent::new(Callback::BeforeTradeDay, date.and_time(BEFORE_TRADE_DAY)));
    for minute in trading_minutes(date) {
        events.push(ClockEvent::new(Callback::AfterTradeMinute, minute));
        if minute.time() == TRADE_DAY_START {
            events.push(ClockEvent::new(Callback::OnTradeDayStart, minute));
        } else if minute.time() == TRADE_DAY_END {
            events.push(ClockEvent::new(Callback::OnTradeDayEnd, minute));
        }
    }
    events.push(ClockEvent::new(Callback::AfterTradeDay, date.and_time(AFTER_TRADE_DAY)));
    events
}
