//! Machine-keyed encryption for cached secrets.
//!
//! The cache protects fetched secret sets at rest by sealing them under a
//! key derived from the executing machine's identity. Nothing here is a
//! correctness requirement: every failure degrades. Unavailable crypto
//! falls back to the plaintext cache tier, a payload that will not open is
//! a cache miss.

pub mod cipher;
pub mod kdf;
pub mod machine_id;

pub use cipher::SecretCipher;
pub use kdf::DerivedKey;
pub use machine_id::MachineId;

use thiserror::Error;

/// Failures inside the crypto stack.
///
/// `Unavailable` means a primitive could not run at all (no OS randomness)
/// and callers should skip encryption for that operation. The remaining
/// variants are decrypt-side and are treated as a cache miss, never
/// surfaced to a caller.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("crypto primitive unavailable")]
    Unavailable,

    #[error("malformed payload: {0}")]
    Malformed(&'static str),

    #[error("payload failed authentication")]
    Aead,

    #[error("payload serialization: {0}")]
    Serde(#[from] serde_json::Error),
}
