//! Authenticated sealing of secret maps.
//!
//! Wire form: `base64url(salt) ":" base64url(nonce || ciphertext)`, with one
//! separator colon, split on the first. The salt regenerates the key at
//! open time; the 24-byte nonce rides inside the opaque token. The AEAD
//! tag makes tampering and foreign-machine payloads fail authentication
//! instead of producing garbage plaintext.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use super::kdf::{self, SALT_LEN};
use super::machine_id::MachineId;
use super::CryptoError;
use crate::gateway::SecretMap;

/// XChaCha20-Poly1305 nonce length.
const NONCE_LEN: usize = 24;

/// Seals and opens secret maps under keys derived from the machine
/// identity.
pub struct SecretCipher {
    machine_id: MachineId,
}

impl SecretCipher {
    pub fn new(machine_id: MachineId) -> Self {
        Self { machine_id }
    }

    /// Encrypt a secret map.
    ///
    /// A fresh salt and nonce are drawn per call, so sealing the same map
    /// twice yields different payloads that both open to the same map.
    pub fn seal(&self, secrets: &SecretMap) -> Result<String, CryptoError> {
        let mut plaintext = serde_json::to_vec(secrets)?;

        let identity = self.machine_id.resolve();
        let (key, salt) = kdf::derive(&identity, None)?;

        let mut nonce = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce)
            .map_err(|_| CryptoError::Unavailable)?;

        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let ciphertext = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_ref())
            .map_err(|_| CryptoError::Unavailable)?;
        plaintext.zeroize();

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);

        Ok(format!(
            "{}:{}",
            URL_SAFE_NO_PAD.encode(salt),
            URL_SAFE_NO_PAD.encode(token)
        ))
    }

    /// Decrypt a payload produced by [`seal`](Self::seal) on this machine.
    ///
    /// Malformed payloads, payloads sealed under another machine identity,
    /// corrupted ciphertext, and bad JSON all come back as typed errors the
    /// cache treats as a miss.
    pub fn open(&self, payload: &str) -> Result<SecretMap, CryptoError> {
        let (salt_b64, token_b64) = payload
            .split_once(':')
            .ok_or(CryptoError::Malformed("missing separator"))?;

        let salt_bytes = URL_SAFE_NO_PAD
            .decode(salt_b64)
            .map_err(|_| CryptoError::Malformed("salt is not base64url"))?;
        let salt: [u8; SALT_LEN] = salt_bytes
            .try_into()
            .map_err(|_| CryptoError::Malformed("salt length"))?;

        let token = URL_SAFE_NO_PAD
            .decode(token_b64)
            .map_err(|_| CryptoError::Malformed("token is not base64url"))?;
        if token.len() < NONCE_LEN {
            return Err(CryptoError::Malformed("token shorter than nonce"));
        }
        let (nonce, ciphertext) = token.split_at(NONCE_LEN);

        let identity = self.machine_id.resolve();
        let (key, _) = kdf::derive(&identity, Some(salt))?;

        let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
        let mut plaintext = cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| CryptoError::Aead)?;

        let secrets = serde_json::from_slice(&plaintext)?;
        plaintext.zeroize();

        Ok(secrets)
    }
}
