//! Cryptographic building blocks
//!
//! - `ecies`: the hybrid public-key envelope used for encrypted blocks and
//!   quorum share distribution
//! - `symmetric`: one-shot AES-256-GCM sealing of serialized values
//! - `shamir`: secret sharing over GF(2^bits) with an instance-scoped field
//!   width

pub mod ecies;
pub mod shamir;
pub mod symmetric;

pub use ecies::{
    decrypt_with_header, encrypt, EciesHeader, AUTH_TAG_LENGTH, ECIES_OVERHEAD_LENGTH, IV_LENGTH,
    PUBLIC_KEY_LENGTH, PUBLIC_KEY_PREFIX,
};
pub use shamir::{field_bits_for, GfField, SecretShare, MAX_FIELD_BITS, MIN_FIELD_BITS};
pub use symmetric::{
    symmetric_decrypt_json, symmetric_encrypt_json, SymmetricSealed, SYMMETRIC_KEY_LENGTH,
};
