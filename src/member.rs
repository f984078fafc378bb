//! Member identity
//!
//! A member is the unit of ownership and quorum participation. Each member
//! holds a secp256k1 keypair: the public half is the target of ECIES
//! envelopes and the verifier of CBL creator signatures, the private half
//! (optional in memory) decrypts and signs.

use std::fmt;

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::CryptoError;

/// ECDSA signature width (r || s).
pub const SIGNATURE_LENGTH: usize = 64;

/// Uncompressed SEC1 public key width (0x04 prefix + x + y).
pub const PUBLIC_KEY_LENGTH: usize = 65;

/// Globally unique 128-bit member identifier with a short-hex form.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MemberId(Uuid);

impl MemberId {
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// 32-character hex form without hyphens.
    pub fn short_hex(&self) -> String {
        self.0.simple().to_string()
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short_hex())
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemberId({})", self.short_hex())
    }
}

impl Serialize for MemberId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.short_hex())
    }
}

impl<'de> Deserialize<'de> for MemberId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Uuid::parse_str(&s)
            .map(MemberId)
            .map_err(serde::de::Error::custom)
    }
}

/// A member with a secp256k1 keypair. The private half may be absent when
/// only encryption or verification is needed.
#[derive(Clone)]
pub struct Member {
    id: MemberId,
    public_key: PublicKey,
    private_key: Option<SecretKey>,
}

impl Member {
    /// Generate a fresh member with both key halves loaded.
    pub fn generate() -> Self {
        let private_key = SecretKey::random(&mut OsRng);
        Self {
            id: MemberId::new_random(),
            public_key: private_key.public_key(),
            private_key: Some(private_key),
        }
    }

    /// Reassemble a member from known parts.
    pub fn from_parts(id: MemberId, public_key: PublicKey, private_key: Option<SecretKey>) -> Self {
        Self {
            id,
            public_key,
            private_key,
        }
    }

    /// A copy of this member without the private half.
    pub fn public_only(&self) -> Self {
        Self {
            id: self.id,
            public_key: self.public_key,
            private_key: None,
        }
    }

    pub fn id(&self) -> MemberId {
        self.id
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Uncompressed SEC1 encoding (65 bytes, 0x04-prefixed).
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let point = self.public_key.to_encoded_point(false);
        let mut bytes = [0u8; PUBLIC_KEY_LENGTH];
        bytes.copy_from_slice(point.as_bytes());
        bytes
    }

    pub fn private_key(&self) -> Option<&SecretKey> {
        self.private_key.as_ref()
    }

    pub fn private_key_loaded(&self) -> bool {
        self.private_key.is_some()
    }

    /// Sign a message with the member's private key (RFC 6979 deterministic
    /// ECDSA). Fails with `InvalidKey` when the private half is absent.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LENGTH], CryptoError> {
        let private_key = self.private_key.as_ref().ok_or(CryptoError::InvalidKey)?;
        let signing_key = SigningKey::from(private_key.clone());
        let signature: Signature = signing_key.sign(message);
        let mut bytes = [0u8; SIGNATURE_LENGTH];
        bytes.copy_from_slice(&signature.to_bytes());
        Ok(bytes)
    }

    /// Verify a signature against this member's public key.
    pub fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_LENGTH]) -> bool {
        let verifying_key = VerifyingKey::from(&self.public_key);
        match Signature::from_slice(signature) {
            Ok(signature) => verifying_key.verify(message, &signature).is_ok(),
            Err(_) => false,
        }
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("private_key_loaded", &self.private_key_loaded())
            .finish()
    }
}
