//! Market account byte layout.
//!
//! Anchor accounts start with an 8-byte discriminator,
//! `sha256("account:<Name>")[..8]`. The two volume fields are read at
//! configurable offsets as little-endian unsigned integers.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::MarketAccount;

/// Length of an Anchor discriminator.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Anchor account name of the market.
pub const MARKET_ACCOUNT_NAME: &str = "Market";

/// Account decoding error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Data is shorter than a field it should contain.
    #[error("account data too short: need {needed} bytes, have {actual}")]
    TooShort {
        /// Bytes required.
        needed: usize,
        /// Bytes present.
        actual: usize,
    },

    /// Discriminator does not match the expected account type.
    #[error("account discriminator mismatch")]
    DiscriminatorMismatch,
}

/// Integer width of a volume field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VolumeWidth {
    /// 8-byte little-endian.
    #[default]
    U64,
    /// 16-byte little-endian.
    U128,
}

impl VolumeWidth {
    /// Parse width from string ("u64" or "u128").
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "u64" => Some(Self::U64),
            "u128" => Some(Self::U128),
            _ => None,
        }
    }

    /// Field size in bytes.
    #[must_use]
    pub const fn byte_len(self) -> usize {
        match self {
            Self::U64 => 8,
            Self::U128 => 16,
        }
    }
}

/// Where the volume fields sit in the market account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarketLayout {
    /// Byte offset of the token A volume.
    pub token_a_offset: usize,
    /// Byte offset of the token B volume.
    pub token_b_offset: usize,
    /// Width of both volume fields.
    pub width: VolumeWidth,
}

impl Default for MarketLayout {
    fn default() -> Self {
        Self {
            token_a_offset: DISCRIMINATOR_LEN,
            token_b_offset: DISCRIMINATOR_LEN + VolumeWidth::U64.byte_len(),
            width: VolumeWidth::U64,
        }
    }
}

impl MarketLayout {
    /// Decode a market account, checking its discriminator.
    pub fn decode(&self, data: &[u8]) -> Result<MarketAccount, LayoutError> {
        let discriminator = data.get(..DISCRIMINATOR_LEN).ok_or(LayoutError::TooShort {
            needed: DISCRIMINATOR_LEN,
            actual: data.len(),
        })?;
        if discriminator != account_discriminator(MARKET_ACCOUNT_NAME) {
            return Err(LayoutError::DiscriminatorMismatch);
        }

        Ok(MarketAccount {
            token_a_volume: read_le(data, self.token_a_offset, self.width)?,
            token_b_volume: read_le(data, self.token_b_offset, self.width)?,
        })
    }
}

fn read_le(data: &[u8], offset: usize, width: VolumeWidth) -> Result<u128, LayoutError> {
    let len = width.byte_len();
    let needed = offset.saturating_add(len);
    let field = data.get(offset..needed).ok_or(LayoutError::TooShort {
        needed,
        actual: data.len(),
    })?;

    let mut buf = [0_u8; 16];
    buf[..len].copy_from_slice(field);
    Ok(u128::from_le_bytes(buf))
}

fn discriminator(namespace: &str, name: &str) -> [u8; DISCRIMINATOR_LEN] {
    let hash = Sha256::new()
        .chain_update(namespace.as_bytes())
        .chain_update(b":")
        .chain_update(name.as_bytes())
        .finalize();
    let mut out = [0_u8; DISCRIMINATOR_LEN];
    out.copy_from_slice(&hash[..DISCRIMINATOR_LEN]);
    out
}

/// Discriminator prefixed to an account's data.
#[must_use]
pub fn account_discriminator(name: &str) -> [u8; DISCRIMINATOR_LEN] {
    discriminator("account", name)
}

/// Discriminator prefixed to an instruction's data.
#[must_use]
pub fn instruction_discriminator(operation: &str) -> [u8; DISCRIMINATOR_LEN] {
    discriminator("global", operation)
}
