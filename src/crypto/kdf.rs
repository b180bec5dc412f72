//! PBKDF2 key derivation.
//!
//! Turns the machine identity plus a random salt into the symmetric key
//! the cipher seals cache entries with. Derivation is deterministic for a
//! given (identity, salt) pair; decrypt depends on regenerating the exact
//! key from the salt carried in the payload.

use hmac::Hmac;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::CryptoError;

/// Derived key length in bytes.
pub const KEY_LEN: usize = 32;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// PBKDF2-HMAC-SHA256 iteration count.
const PBKDF2_ROUNDS: u32 = 100_000;

/// A derived symmetric key. Wiped on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

/// Derive a key from the machine identity and a salt.
///
/// A fresh random salt is drawn from the OS when none is supplied; the
/// salt actually used is returned so callers can persist it next to the
/// ciphertext. `Unavailable` means the OS randomness source failed and the
/// caller should skip encryption for this operation.
pub fn derive(
    identity: &str,
    salt: Option<[u8; SALT_LEN]>,
) -> Result<(DerivedKey, [u8; SALT_LEN]), CryptoError> {
    let salt = match salt {
        Some(salt) => salt,
        None => {
            let mut fresh = [0u8; SALT_LEN];
            OsRng
                .try_fill_bytes(&mut fresh)
                .map_err(|_| CryptoError::Unavailable)?;
            fresh
        }
    };

    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2::<Hmac<Sha256>>(identity.as_bytes(), &salt, PBKDF2_ROUNDS, &mut key)
        .map_err(|_| CryptoError::Unavailable)?;

    Ok((DerivedKey(key), salt))
}
