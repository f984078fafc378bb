//! Symmetric JSON codec
//!
//! Serializes a value with serde_json and seals it under a fresh random
//! AES-256-GCM key. The key is handed back to the caller for distribution
//! (typically as Shamir shares) and is never reused for a second payload.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroize;

use crate::error::CryptoError;

pub const SYMMETRIC_KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

/// A sealed payload plus the one-shot key that opens it.
///
/// The key is wiped on drop; callers that need to keep it must copy it out
/// before the value falls out of scope.
pub struct SymmetricSealed {
    pub key: [u8; SYMMETRIC_KEY_LENGTH],
    pub data: Vec<u8>,
}

impl SymmetricSealed {
    /// Move the sealed bytes out, leaving the key to be wiped on drop.
    pub fn take_data(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.data)
    }
}

impl Drop for SymmetricSealed {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Serialize and seal a value under a fresh random key.
///
/// Output framing is `nonce (12) || ciphertext+tag`.
pub fn symmetric_encrypt_json<T: Serialize>(value: &T) -> Result<SymmetricSealed, CryptoError> {
    let plaintext = serde_json::to_vec(value)?;

    let mut key = [0u8; SYMMETRIC_KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key));

    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| CryptoError::InvalidKey)?;

    let mut data = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    data.extend_from_slice(&nonce_bytes);
    data.extend_from_slice(&ciphertext);

    Ok(SymmetricSealed { key, data })
}

/// Open a payload sealed by [`symmetric_encrypt_json`] and deserialize it.
pub fn symmetric_decrypt_json<T: DeserializeOwned>(
    data: &[u8],
    key: &[u8],
) -> Result<T, CryptoError> {
    if key.len() != SYMMETRIC_KEY_LENGTH {
        return Err(CryptoError::InvalidKey);
    }
    if data.len() < NONCE_LENGTH {
        return Err(CryptoError::InvalidHeader(
            "ciphertext too short (missing nonce)".to_string(),
        ));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(&data[..NONCE_LENGTH]);
    let plaintext = cipher
        .decrypt(nonce, &data[NONCE_LENGTH..])
        .map_err(|_| CryptoError::DecryptionFailure)?;

    Ok(serde_json::from_slice(&plaintext)?)
}
