use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Exchange suffixes accepted in an instrument id.
const EXCHANGES: [&str; 3] = ["SH", "SZ", "BJ"];

/// A-share instrument identifier, e.g. `000001.SZ`.
///
/// Six ASCII digits, a dot, and an exchange suffix (`SH`, `SZ` or `BJ`).
/// Construction always goes through [`InstrumentId::parse`], so a value of
/// this type is known to be well formed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstrumentId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed instrument id '{0}' (expected NNNNNN.SH, NNNNNN.SZ or NNNNNN.BJ)")]
pub struct InstrumentIdError(pub String);

impl InstrumentId {
    pub fn parse(raw: &str) -> Result<Self, InstrumentIdError> {
        let raw = raw.trim();
        let (code, exchange) = raw
            .split_once('.')
            .ok_or_else(|| InstrumentIdError(raw.to_string()))?;
        let code_ok = code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit());
        let exchange = exchange.to_ascii_uppercase();
        if !code_ok || !EXCHANGES.contains(&exchange.as_str()) {
            return Err(InstrumentIdError(raw.to_string()));
        }
        Ok(Self(format!("{code}.{exchange}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The six-digit security code.
    pub fn code(&self) -> &str {
        &self.0[..6]
    }

    /// The exchange suffix.
    pub fn exchange(&self) -> &str {
        &self.0[7..]
    }
}

impl FromStr for InstrumentId {
    type Err = InstrumentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for InstrumentId {
    type Error = InstrumentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InstrumentId> for String {
    fn from(id: InstrumentId) -> Self {
        id.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Order ID
///
/// Deterministic: built from instrument, creation time, quantity and a
/// per-run sequence number, so replaying a run yields the same ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Monotonic id source for one run.
#[derive(Debug, Default, Clone)]
pub struct IdGen {
    next_order: u64,
}

impl IdGen {
    pub fn next_order_id(
        &mut self,
        instrument: &InstrumentId,
        time: chrono::NaiveDateTime,
        quantity: i64,
    ) -> OrderId {
        self.next_order += 1;
        OrderId(format!(
            "{}_{}_{}_{}",
            instrument,
            time.format("%Y%m%d%H%M%S"),
            quantity,
            self.next_order
        ))
    }
}
