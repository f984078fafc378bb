//! ECIES envelope encryption
//!
//! Hybrid public-key encryption against a member's secp256k1 key: an
//! ephemeral keypair performs ECDH with the recipient, HKDF-SHA256 turns the
//! shared secret into an AES-256 key, and AES-256-GCM with a 16-byte IV
//! seals the payload with a detached tag.
//!
//! Envelope layout, all offsets fixed:
//!
//! ```text
//! [0x04 | ephemeral public key x||y (64) | iv (16) | auth tag (16) | ciphertext]
//! ```

use aes_gcm::aead::consts::U16;
use aes_gcm::aes::Aes256;
use aes_gcm::{AeadInPlace, AesGcm, Key, KeyInit, Nonce, Tag};
use hkdf::Hkdf;
use k256::ecdh;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Leading byte of an uncompressed SEC1 point.
pub const PUBLIC_KEY_PREFIX: u8 = 0x04;
/// Uncompressed SEC1 public key width.
pub const PUBLIC_KEY_LENGTH: usize = 65;
pub const IV_LENGTH: usize = 16;
pub const AUTH_TAG_LENGTH: usize = 16;
/// Fixed envelope header width preceding the ciphertext.
pub const ECIES_OVERHEAD_LENGTH: usize = PUBLIC_KEY_LENGTH + IV_LENGTH + AUTH_TAG_LENGTH;

const KDF_INFO: &[u8] = b"brightchain-ecies-v1";

/// AES-256-GCM bound to the envelope's 16-byte IV width.
type EnvelopeCipher = AesGcm<Aes256, U16>;

/// Parsed view of the fixed 97-byte envelope header.
pub struct EciesHeader {
    pub ephemeral_public_key: PublicKey,
    pub iv: [u8; IV_LENGTH],
    pub auth_tag: [u8; AUTH_TAG_LENGTH],
}

impl EciesHeader {
    /// Parse the header prefix of an envelope buffer.
    pub fn parse(buffer: &[u8]) -> Result<Self, CryptoError> {
        if buffer.len() < ECIES_OVERHEAD_LENGTH {
            return Err(CryptoError::InvalidHeader(format!(
                "envelope holds {} bytes, need at least {}",
                buffer.len(),
                ECIES_OVERHEAD_LENGTH
            )));
        }
        if buffer[0] != PUBLIC_KEY_PREFIX {
            return Err(CryptoError::InvalidHeader(format!(
                "expected uncompressed point prefix 0x04, got {:#04x}",
                buffer[0]
            )));
        }
        let ephemeral_public_key = PublicKey::from_sec1_bytes(&buffer[..PUBLIC_KEY_LENGTH])
            .map_err(|_| {
                CryptoError::InvalidHeader("ephemeral key is not a valid curve point".to_string())
            })?;

        let mut iv = [0u8; IV_LENGTH];
        iv.copy_from_slice(&buffer[PUBLIC_KEY_LENGTH..PUBLIC_KEY_LENGTH + IV_LENGTH]);
        let mut auth_tag = [0u8; AUTH_TAG_LENGTH];
        auth_tag.copy_from_slice(&buffer[PUBLIC_KEY_LENGTH + IV_LENGTH..ECIES_OVERHEAD_LENGTH]);

        Ok(Self {
            ephemeral_public_key,
            iv,
            auth_tag,
        })
    }
}

fn derive_envelope_key(shared: &ecdh::SharedSecret) -> [u8; 32] {
    let hk = Hkdf::<Sha256>::new(None, shared.raw_secret_bytes());
    let mut okm = [0u8; 32];
    hk.expand(KDF_INFO, &mut okm)
        .expect("32 bytes is a valid HKDF-SHA256 output length");
    okm
}

/// Encrypt a plaintext for a recipient's public key.
///
/// Returns `header || ciphertext`; the ciphertext is exactly as long as the
/// plaintext (the tag lives in the header).
pub fn encrypt(recipient: &PublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = SecretKey::random(&mut OsRng);
    let shared = ecdh::diffie_hellman(ephemeral.to_nonzero_scalar(), recipient.as_affine());
    let mut key = derive_envelope_key(&shared);
    let cipher = EnvelopeCipher::new(Key::<EnvelopeCipher>::from_slice(&key));

    let mut iv = [0u8; IV_LENGTH];
    OsRng.fill_bytes(&mut iv);

    let mut ciphertext = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), b"", &mut ciphertext)
        .map_err(|_| CryptoError::InvalidKey)?;
    key.zeroize();

    let ephemeral_point = ephemeral.public_key().to_encoded_point(false);
    let mut envelope = Vec::with_capacity(ECIES_OVERHEAD_LENGTH + ciphertext.len());
    envelope.extend_from_slice(ephemeral_point.as_bytes());
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(&tag);
    envelope.extend_from_slice(&ciphertext);
    Ok(envelope)
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Fails with `InvalidHeader` on prefix or length violations and with
/// `DecryptionFailure` when the auth tag rejects the ciphertext.
pub fn decrypt_with_header(private_key: &SecretKey, buffer: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let header = EciesHeader::parse(buffer)?;
    let shared = ecdh::diffie_hellman(
        private_key.to_nonzero_scalar(),
        header.ephemeral_public_key.as_affine(),
    );
    let mut key = derive_envelope_key(&shared);
    let cipher = EnvelopeCipher::new(Key::<EnvelopeCipher>::from_slice(&key));

    let mut plaintext = buffer[ECIES_OVERHEAD_LENGTH..].to_vec();
    let result = cipher.decrypt_in_place_detached(
        Nonce::from_slice(&header.iv),
        b"",
        &mut plaintext,
        Tag::from_slice(&header.auth_tag),
    );
    key.zeroize();
    result.map_err(|_| CryptoError::DecryptionFailure)?;

    Ok(plaintext)
}
