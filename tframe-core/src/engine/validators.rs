//! Pre-trade validation.
//!
//! Validators run in registration order and the first rejection wins. A
//! rejected request never becomes an order: no id is handed out to the
//! caller, no cash is frozen, no observer is notified.

use crate::domain::{InstrumentId, Position};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;

/// A not-yet-accepted order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub instrument: InstrumentId,
    /// Signed share count: positive buys, negative sells.
    pub quantity: i64,
    pub limit_price: Option<f64>,
    pub reference_price: f64,
    pub time: NaiveDateTime,
}

impl OrderRequest {
    pub fn is_buy(&self) -> bool {
        self.quantity > 0
    }

    /// Cash a buy would freeze.
    pub fn notional(&self) -> f64 {
        self.quantity.unsigned_abs() as f64 * self.reference_price
    }
}

/// Account state a validator may consult.
#[derive(Debug, Clone, Copy)]
pub struct ValidationContext<'a> {
    pub available_cash: f64,
    pub positions: &'a BTreeMap<InstrumentId, Position>,
    /// Shares of this instrument already committed to open sell orders.
    pub pending_sell_quantity: i64,
}

impl ValidationContext<'_> {
    /// Position quantity not yet promised to an open sell.
    pub fn sellable(&self, instrument: &InstrumentId) -> i64 {
        let held = self.positions.get(instrument).map_or(0, |p| p.quantity);
        (held - self.pending_sell_quantity).max(0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub message: String,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            is_valid: true,
            message: String::new(),
        }
    }

    pub fn reject(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            message: message.into(),
        }
    }
}

pub trait OrderValidator: Send + Sync {
    fn name(&self) -> &str;
    fn validate(&self, request: &OrderRequest, ctx: &ValidationContext<'_>) -> ValidationResult;
}

/// Buys need `|qty| * reference_price <= available_cash`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CashValidator;

impl OrderValidator for CashValidator {
    fn name(&self) -> &str {
        "CashValidator"
    }

    fn validate(&self, request: &OrderRequest, ctx: &ValidationContext<'_>) -> ValidationResult {
        if !request.is_buy() {
            return ValidationResult::ok();
        }
        let needed = request.notional();
        if needed <= ctx.available_cash {
            ValidationResult::ok()
        } else {
            ValidationResult::reject(format!(
                "insufficient cash: need {needed:.2}, available {:.2}",
                ctx.available_cash
            ))
        }
    }
}

/// Sells need an existing position with enough sellable shares.
#[derive(Debug, Default, Clone, Copy)]
pub struct PositionValidator;

impl OrderValidator for PositionValidator {
    fn name(&self) -> &str {
        "PositionValidator"
    }

    fn validate(&self, request: &OrderRequest, ctx: &ValidationContext<'_>) -> ValidationResult {
        if request.is_buy() {
            return ValidationResult::ok();
        }
        if !ctx.positions.contains_key(&request.instrument) {
            return ValidationResult::reject(format!("no position in {}", request.instrument));
        }
        let wanted = request.quantity.abs();
        let sellable = ctx.sellable(&request.instrument);
        if wanted <= sellable {
            ValidationResult::ok()
        } else {
            ValidationResult::reject(format!(
                "insufficient position: sell {wanted}, sellable {sellable}"
            ))
        }
    }
}

/// Caps the notional of any single order, buy or sell.
#[derive(Debug, Clone, Copy)]
pub struct MaxOrderValueValidator {
    pub max_value: f64,
}

impl MaxOrderValueValidator {
    pub fn new(max_value: f64) -> Self {
        Self { max_value }
    }
}

impl OrderValidator for MaxOrderValueValidator {
    fn name(&self) -> &str {
        "MaxOrderValueValidator"
    }

    fn validate(&self, request: &OrderRequest, _ctx: &ValidationContext<'_>) -> ValidationResult {
        let value = request.notional();
        if value <= self.max_value {
            ValidationResult::ok()
        } else {
            ValidationResult::reject(format!(
                "order value {value:.2} exceeds limit {:.2}",
                self.max_value
            ))
        }
    }
}

/// Ordered list of validators.
pub struct ValidatorChain {
    validators: Vec<Box<dyn OrderValidator>>,
}

impl ValidatorChain {
    pub fn empty() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    pub fn push(&mut self, validator: Box<dyn OrderValidator>) {
        self.validators.push(validator);
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// First rejection as `(validator name, result)`, or `None` if all pass.
    pub fn check(
        &self,
        request: &OrderRequest,
        ctx: &ValidationContext<'_>,
    ) -> Option<(String, ValidationResult)> {
        self.validators.iter().find_map(|v| {
            let result = v.validate(request, ctx);
            (!result.is_valid).then(|| (v.name().to_string(), result))
        })
    }
}

impl Default for ValidatorChain {
    /// Cash check, then position check.
    fn default() -> Self {
        let mut chain = Self::empty();
        chain.push(Box::new(CashValidator));
        chain.push(Box::new(PositionValidator));
        chain
    }
}

impl std::fmt::Debug for ValidatorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.validators.iter().map(|v| v.name()))
            .finish()
    }
}
