//! Simulation engine: clock, order matching and the account ledger.
//!
//! Per minute tick the participants run in registration order:
//!
//! 1. `AccountClock` moves the account's simulated time
//! 2. `PositionClock` (day end only) drops flat positions
//! 3. `OrderClock` works open orders against the minute bars
//! 4. strategies
//! 5. `SnapshotClock` (day end only) records the day's account snapshot
//!
//! Order events flow back synchronously: position manager, cash ledger, then
//! any extra observers.

pub mod account;
pub mod backtest;
pub mod clocks;
pub mod events;
pub mod order_manager;
pub mod position_manager;
pub mod schedule;
pub mod scheduler;
pub mod validators;

pub use account::{shares_for_value, Account, AccountSnapshot, BacktestAccount, CashLedger};
pub use backtest::{Backtest, BacktestOutcome};
pub use clocks::{AccountClock, OrderClock, PositionClock, SnapshotClock};
pub use events::{OrderEvent, OrderObserver};
pub use order_manager::{OrderError, OrderManager};
pub use position_manager::PositionManager;
pub use schedule::{day_schedule, trading_minutes, Callback, ClockEvent, MINUTES_PER_DAY};
pub use scheduler::{
    CallbackFailure, CallbackResult, Context, Scheduler, SchedulerState, SchedulerStats, StopHandle,
    TimeConsumer,
};
pub use validators::{
    CashValidator, MaxOrderValueValidator, OrderRequest, OrderValidator, PositionValidator,
    ValidationContext, ValidationResult, ValidatorChain,
};
