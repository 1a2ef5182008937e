//! Built-in strategies selectable from the `[strategy]` config section.

use chrono::NaiveDateTime;
use tframe_core::domain::InstrumentId;
use tframe_core::engine::{Account, CallbackResult, Context};
use tframe_core::strategy::Strategy;
use tracing::{debug, warn};

use crate::config::{ConfigError, StrategyConfig};

/// Build the strategy named by `config` over `universe`.
pub fn build_strategy(
    config: &StrategyConfig,
    universe: &[InstrumentId],
) -> Result<Box<dyn Strategy>, ConfigError> {
    let strategy: Box<dyn Strategy> = match config {
        StrategyConfig::BuyAndHold => Box::new(BuyAndHold::new(universe.to_vec())),
        StrategyConfig::TargetWeights { weights } => {
            let weights = weights
                .iter()
                .map(|(raw, w)| Ok((InstrumentId::parse(raw)?, *w)))
                .collect::<Result<Vec<_>, ConfigError>>()?;
            Box::new(TargetWeights::new(weights))
        }
        StrategyConfig::None => Box::new(Idle),
    };
    Ok(strategy)
}

/// Equal-weight the universe once, at the first session open, then hold.
#[derive(Debug)]
pub struct BuyAndHold {
    universe: Vec<InstrumentId>,
    invested: bool,
}

impl BuyAndHold {
    pub fn new(universe: Vec<InstrumentId>) -> Self {
        Self {
            universe,
            invested: false,
        }
    }
}

impl Strategy for BuyAndHold {
    fn on_trade_day_start(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        if self.invested || self.universe.is_empty() {
            return Ok(());
        }
        let account = ctx.account();
        // Size every leg off the same starting value.
        let budget = account.total_value() / self.universe.len() as f64;
        for id in &self.universe {
            match account.order_by_value(id, budget, None) {
                Ok(order) => debug!(%time, %order, "entry placed"),
                Err(err) if err.is_noop() => {}
                Err(err) => warn!(%time, instrument = %id, error = %err, "entry not placed"),
            }
        }
        self.invested = true;
        Ok(())
    }
}

/// Rebalance to fixed weights of total value at every session open.
#[derive(Debug)]
pub struct TargetWeights {
    weights: Vec<(InstrumentId, f64)>,
}

impl TargetWeights {
    pub fn new(weights: Vec<(InstrumentId, f64)>) -> Self {
        Self { weights }
    }
}

impl Strategy for TargetWeights {
    fn on_trade_day_start(&mut self, time: NaiveDateTime, ctx: &mut Context<'_>) -> CallbackResult {
        let account = ctx.account();
        // Sells first so their proceeds can fund the buys once they fill.
        let mut legs: Vec<_> = self
            .weights
            .iter()
            .map(|(id, w)| {
                let held = account.position(id).map_or(0.0, |p| p.market_value);
                (id, *w, held - w * account.total_value())
            })
            .collect();
        legs.sort_by(|a, b| b.2.total_cmp(&a.2));

        for (id, weight, _) in legs {
            match account.rebalance_by_total_percent(id, weight, None) {
                Ok(Some(order)) => debug!(%time, %order, weight, "rebalance order"),
                Ok(None) => {}
                Err(err) if err.is_noop() => {}
                Err(err) => warn!(%time, instrument = %id, error = %err, "rebalance skipped"),
            }
        }
        Ok(())
    }
}

/// Places no orders; useful as a cash benchmark.
#[derive(Debug, Default)]
pub struct Idle;

impl Strategy for Idle {}
