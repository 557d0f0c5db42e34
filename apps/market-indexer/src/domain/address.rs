//! Ledger Addresses
//!
//! 32-byte account addresses with their base-58 text form, and the
//! program-derived address search used to locate the market account.

use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Maximum length of a single derivation seed.
pub const MAX_SEED_LEN: usize = 32;

/// Maximum number of seeds, including the bump seed.
pub const MAX_SEEDS: usize = 16;

/// Marker appended to every program-derived address hash.
const PDA_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Namespace seed of market accounts.
pub const MARKET_SEED: &[u8] = b"market";

/// Address parsing and derivation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    /// Text was not valid base-58.
    #[error("invalid base-58 address: {0}")]
    InvalidBase58(String),

    /// Decoded bytes were not 32 long.
    #[error("address must be 32 bytes, got {0}")]
    InvalidLength(usize),

    /// A seed exceeded [`MAX_SEED_LEN`].
    #[error("seed exceeds {MAX_SEED_LEN} bytes")]
    SeedTooLong,

    /// Too many seeds were supplied.
    #[error("more than {MAX_SEEDS} seeds")]
    TooManySeeds,

    /// Candidate hash lies on the ed25519 curve.
    #[error("derived address lies on the curve")]
    OnCurve,

    /// No bump in 1..=255 produced an off-curve address.
    #[error("unable to find a viable program address bump")]
    NoViableBump,
}

/// A 32-byte ledger account address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 32]);

impl Address {
    /// Wrap raw address bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw address bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Whether the bytes decode to a point on the ed25519 curve.
    ///
    /// Program-derived addresses must not, so that no private key exists
    /// for them.
    #[must_use]
    pub fn is_on_curve(&self) -> bool {
        ed25519_dalek::VerifyingKey::from_bytes(&self.0).is_ok()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s.trim())
            .into_vec()
            .map_err(|_| AddressError::InvalidBase58(s.to_string()))?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl From<[u8; 32]> for Address {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// Hash `seeds` under `program_id` into a program address.
///
/// Fails with [`AddressError::OnCurve`] when the hash happens to be a valid
/// public key.
pub fn create_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<Address, AddressError> {
    if seeds.len() > MAX_SEEDS {
        return Err(AddressError::TooManySeeds);
    }
    if seeds.iter().any(|seed| seed.len() > MAX_SEED_LEN) {
        return Err(AddressError::SeedTooLong);
    }

    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update(program_id.as_bytes());
    hasher.update(PDA_MARKER);

    let candidate = Address(hasher.finalize().into());
    if candidate.is_on_curve() {
        return Err(AddressError::OnCurve);
    }
    Ok(candidate)
}

/// Bump seeds in search order. Bump 0 is never tried.
fn bump_candidates() -> impl Iterator<Item = u8> {
    (1..=u8::MAX).rev()
}

/// Find the first off-curve program address, searching bumps from 255 down to 1.
pub fn find_program_address(
    seeds: &[&[u8]],
    program_id: &Address,
) -> Result<(Address, u8), AddressError> {
    if seeds.len() >= MAX_SEEDS {
        return Err(AddressError::TooManySeeds);
    }

    for bump in bump_candidates() {
        let bump_seed = [bump];
        let mut with_bump: Vec<&[u8]> = seeds.to_vec();
        with_bump.push(&bump_seed);

        match create_program_address(&with_bump, program_id) {
            Ok(address) => return Ok((address, bump)),
            Err(AddressError::OnCurve) => {}
            Err(e) => return Err(e),
        }
    }

    Err(AddressError::NoViableBump)
}

/// Derive the market account for an (exits, prices) pair.
pub fn derive_market_address(
    program_id: &Address,
    exits: &Address,
    prices: &Address,
) -> Result<Address, AddressError> {
    find_program_address(
        &[MARKET_SEED, exits.as_bytes().as_slice(), prices.as_bytes().as_slice()],
        program_id,
    )
    .map(|(address, _bump)| address)
}
