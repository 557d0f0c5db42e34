//! Market account state as read from the ledger.

use serde::{Deserialize, Serialize};

use super::address::Address;
use super::observation::{Observation, ObservationError};

/// Cumulative swap volumes held by the on-chain market account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MarketAccount {
    /// Total token A volume.
    pub token_a_volume: u128,
    /// Total token B volume.
    pub token_b_volume: u128,
}

impl MarketAccount {
    /// Build the observation of this account at `slot`.
    pub fn observe(&self, market: &Address, slot: u64) -> Result<Observation, ObservationError> {
        Observation::new(
            market.to_string(),
            slot,
            self.token_a_volume,
            self.token_b_volume,
        )
    }
}
