//! Market Observations
//!
//! One observation is produced per sync cycle: the ledger slot at which the
//! market account was read and the two cumulative flow volumes it reported.
//! Volumes are carried as `u128` and rendered as exact decimal text, so they
//! never pass through floating point on their way to the store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when an observation would violate its invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObservationError {
    /// Market identifier was empty.
    #[error("market identifier cannot be empty")]
    EmptyMarket,

    /// Slot must be strictly positive.
    #[error("slot must be greater than zero")]
    ZeroSlot,

    /// Slot does not fit the store's signed 64-bit column.
    #[error("slot {0} exceeds the storable range")]
    SlotOutOfRange(u64),

    /// Flow amount text was not a non-negative integer.
    #[error("invalid flow amount: {0}")]
    InvalidAmount(String),
}

// =============================================================================
// Value Objects
// =============================================================================

/// Opaque market account identifier (base-58 address text).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MarketId(String);

impl MarketId {
    /// Create a market identifier, rejecting empty strings.
    pub fn new(value: impl Into<String>) -> Result<Self, ObservationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ObservationError::EmptyMarket);
        }
        Ok(Self(value))
    }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for MarketId {
    type Error = ObservationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<MarketId> for String {
    fn from(id: MarketId) -> Self {
        id.0
    }
}

/// Ledger sequence counter. Always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Slot(u64);

impl Slot {
    /// Create a slot, rejecting zero.
    pub const fn new(value: u64) -> Result<Self, ObservationError> {
        if value == 0 {
            return Err(ObservationError::ZeroSlot);
        }
        Ok(Self(value))
    }

    /// Raw slot value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Slot as the store's `BIGINT` representation.
    pub fn to_i64(self) -> Result<i64, ObservationError> {
        i64::try_from(self.0).map_err(|_| ObservationError::SlotOutOfRange(self.0))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u64> for Slot {
    type Error = ObservationError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Slot> for u64 {
    fn from(slot: Slot) -> Self {
        slot.0
    }
}

/// Non-negative integer token volume, exact beyond the 64-bit range.
///
/// Serialized as decimal text, matching how it is bound to `NUMERIC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowAmount(u128);

impl FlowAmount {
    /// Zero volume.
    pub const ZERO: Self = Self(0);

    /// Wrap a raw volume.
    #[must_use]
    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    /// Raw volume.
    #[must_use]
    pub const fn get(self) -> u128 {
        self.0
    }
}

impl fmt::Display for FlowAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FlowAmount {
    type Err = ObservationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // NUMERIC text may come back with a zero scale suffix ("42.0")
        let integral = trimmed
            .split_once('.')
            .map_or(trimmed, |(whole, frac)| {
                if frac.chars().all(|c| c == '0') {
                    whole
                } else {
                    trimmed
                }
            });
        integral
            .parse::<u128>()
            .map(Self)
            .map_err(|_| ObservationError::InvalidAmount(s.to_string()))
    }
}

impl TryFrom<String> for FlowAmount {
    type Error = ObservationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FlowAmount> for String {
    fn from(amount: FlowAmount) -> Self {
        amount.to_string()
    }
}

impl From<u64> for FlowAmount {
    fn from(value: u64) -> Self {
        Self(u128::from(value))
    }
}

impl From<u128> for FlowAmount {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

// =============================================================================
// Observation
// =============================================================================

/// Snapshot of one market's flow state at a given slot.
///
/// Immutable once built. The write timestamp is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    market: MarketId,
    slot: Slot,
    flow_a: FlowAmount,
    flow_b: FlowAmount,
}

impl Observation {
    /// Build an observation, validating the market and slot.
    pub fn new(
        market: impl Into<String>,
        slot: u64,
        flow_a: impl Into<FlowAmount>,
        flow_b: impl Into<FlowAmount>,
    ) -> Result<Self, ObservationError> {
        Ok(Self {
            market: MarketId::new(market)?,
            slot: Slot::new(slot)?,
            flow_a: flow_a.into(),
            flow_b: flow_b.into(),
        })
    }

    /// Market account this observation belongs to.
    #[must_use]
    pub const fn market(&self) -> &MarketId {
        &self.market
    }

    /// Ledger slot at read time.
    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.slot
    }

    /// Token A volume.
    #[must_use]
    pub const fn flow_a(&self) -> FlowAmount {
        self.flow_a
    }

    /// Token B volume.
    #[must_use]
    pub const fn flow_b(&self) -> FlowAmount {
        self.flow_b
    }
}

/// An observation as read back from the store, with its write timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObservation {
    /// Wall-clock time assigned at write.
    pub observed_at: DateTime<Utc>,
    /// Market account identifier.
    pub market: String,
    /// Ledger slot.
    pub slot: u64,
    /// Token A volume.
    pub flow_a: FlowAmount,
    /// Token B volume.
    pub flow_b: FlowAmount,
}
