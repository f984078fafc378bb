//! The block model
//!
//! Fixed-size, checksum-addressed records with ephemeral, encrypted, and
//! constituent-block-list variants. Construction always goes through the
//! [`Block::new`] factory, which validates, random-pads, and seals.

pub mod base;
pub mod cbl;
pub mod encrypted;
pub mod metadata;
pub mod size;
pub mod types;

pub use base::{Block, BlockParams, BlockVariant};
pub use cbl::{
    address_capacity, cbl_block_from_bytes, new_cbl, new_extended_cbl, CblHeader,
    ExtendedCblHeader, MAX_FILE_NAME_LENGTH, MAX_MIME_TYPE_LENGTH,
};
pub use encrypted::{decrypt_block, encrypt_block, parse_envelope_header};
pub use metadata::{BlockMetadata, EncryptedBlockMetadata, EphemeralBlockMetadata};
pub use size::BlockSize;
pub use types::{BlockDataType, BlockType};
