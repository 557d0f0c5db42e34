//! Keypair secret provider.
//!
//! The only accepted encoding is the Solana CLI keypair format: a JSON array
//! of 64 bytes, secret key followed by public key.

use ed25519_dalek::SigningKey;

use crate::application::ports::{SecretError, SecretProvider};
use crate::infrastructure::config::KeySource;

/// Length of a serialized keypair.
pub const KEYPAIR_LEN: usize = 64;

/// Loads the signing key from a file path or inline value.
#[derive(Debug, Clone)]
pub struct KeypairSecret {
    source: KeySource,
}

impl KeypairSecret {
    /// Create a provider reading from `source`.
    #[must_use]
    pub const fn new(source: KeySource) -> Self {
        Self { source }
    }
}

impl SecretProvider for KeypairSecret {
    fn signing_key(&self) -> Result<SigningKey, SecretError> {
        let text = match &self.source {
            KeySource::Path(path) => std::fs::read_to_string(path)?,
            KeySource::Inline(text) => text.clone(),
        };
        parse_keypair(&text)
    }
}

/// Parse a JSON byte-array keypair.
pub fn parse_keypair(text: &str) -> Result<SigningKey, SecretError> {
    if text.trim().is_empty() {
        return Err(SecretError::Missing);
    }

    let bytes: Vec<u8> = serde_json::from_str(text.trim())
        .map_err(|e| SecretError::Malformed(format!("expected a JSON byte array: {e}")))?;

    let keypair: [u8; KEYPAIR_LEN] = bytes.as_slice().try_into().map_err(|_| {
        SecretError::Malformed(format!("expected {KEYPAIR_LEN} bytes, got {}", bytes.len()))
    })?;

    SigningKey::from_keypair_bytes(&keypair).map_err(|e| SecretError::InvalidKey(e.to_string()))
}
