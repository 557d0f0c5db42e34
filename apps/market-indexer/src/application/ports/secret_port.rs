//! Secret Provider Port
//!
//! Single source of signing key material.

use ed25519_dalek::SigningKey;

/// Signing key loading error.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// No key source was configured.
    #[error("no signing key configured")]
    Missing,

    /// Key file could not be read.
    #[error("failed to read key material: {0}")]
    Io(#[from] std::io::Error),

    /// Key material was not in the expected encoding.
    #[error("malformed key material: {0}")]
    Malformed(String),

    /// Decoded bytes are not a consistent keypair.
    #[error("invalid keypair: {0}")]
    InvalidKey(String),
}

/// Port for obtaining the signing key.
pub trait SecretProvider: Send + Sync {
    /// Load the signing key.
    fn signing_key(&self) -> Result<SigningKey, SecretError>;
}
