//! Error domains for the block engine
//!
//! One enum per domain. Variants are the machine-readable reason; the
//! `#[error]` strings are the human-readable message. Validation errors are
//! always fatal to the operation that raised them and never mutate the store.

use thiserror::Error;

use crate::checksum::ChecksumBuffer;
use crate::member::MemberId;

/// Failures while constructing or validating a block.
#[derive(Error, Debug)]
pub enum BlockError {
    #[error("data length {actual} is below the {minimum}-byte minimum for this block variant")]
    DataLengthTooShort { minimum: usize, actual: usize },

    #[error("data length {actual} exceeds capacity {capacity}")]
    DataLengthExceedsCapacity { capacity: usize, actual: usize },

    #[error("creation date {date} is in the future")]
    FutureCreationDate { date: chrono::DateTime<chrono::Utc> },

    #[error("block size mismatch: expected {expected} bytes, got {actual}")]
    BlockSizeMismatch { expected: usize, actual: usize },

    #[error("checksum mismatch: expected {expected}, computed {computed}")]
    ChecksumMismatch {
        expected: ChecksumBuffer,
        computed: ChecksumBuffer,
    },

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Failures raised by a block store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("no block stored under {0}")]
    KeyNotFound(ChecksumBuffer),

    #[error("a block already exists at {0}")]
    BlockPathAlreadyExists(ChecksumBuffer),

    #[error("block file holds {actual} bytes, expected {expected}")]
    BlockFileSizeMismatch { expected: usize, actual: usize },

    #[error("block failed validation: {0}")]
    BlockValidationFailed(#[from] BlockError),

    #[error("failed to create block directory {path:?}: {source}")]
    BlockDirectoryCreationFailed {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("no blocks provided")]
    NoBlocksProvided,

    #[error(transparent)]
    Tuple(#[from] TupleError),

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures in XOR tuples and the whitening pipeline.
#[derive(Error, Debug)]
pub enum TupleError {
    #[error("tuple requires exactly {expected} handles, got {actual}")]
    InvalidTupleSize { expected: usize, actual: usize },

    #[error("all handles in a tuple must share one block size")]
    BlockSizeMismatch,

    #[error("operand streams must supply the same number of bytes")]
    BlockSizesMustMatch,

    #[error("at least two blocks are required to XOR")]
    NoBlocksToXor,

    #[error(transparent)]
    Block(#[from] BlockError),

    #[error("pipeline I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while sealing or unsealing a quorum record.
#[derive(Error, Debug)]
pub enum SealingError {
    #[error("secret sharing bit width must lie in 3..=20, got {0}")]
    InvalidBitRange(u16),

    #[error("{provided} members cannot satisfy a threshold of {required}")]
    NotEnoughMembersToUnlock { required: u32, provided: usize },

    #[error("member count {0} exceeds the maximum share count")]
    TooManyMembersToUnlock(usize),

    #[error("member list must hold at least {minimum} members, got {actual}")]
    InvalidMemberArray { minimum: usize, actual: usize },

    #[error("shares required must lie in {minimum}..={maximum}, got {actual}")]
    InvalidSharesRequired { minimum: u32, maximum: u32, actual: u32 },

    #[error("member {0} has no private key loaded")]
    MissingPrivateKeys(MemberId),

    #[error("no encrypted share recorded for member {0}")]
    EncryptedShareNotFound(MemberId),

    #[error("member {0} is not part of this record")]
    MemberNotFound(MemberId),

    #[error("malformed secret share")]
    InvalidShare,

    #[error("sealing operation failed: {0}")]
    FailedToSeal(#[from] CryptoError),
}

/// Failures in the cryptographic primitives.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("invalid envelope header: {0}")]
    InvalidHeader(String),

    #[error("decryption failed: ciphertext or tag rejected")]
    DecryptionFailure,

    #[error("invalid key material")]
    InvalidKey,

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
