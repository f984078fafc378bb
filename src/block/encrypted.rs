//! Encrypted block operations
//!
//! Wraps an ephemeral block's payload in an ECIES envelope addressed to a
//! recipient member, and inverts it. The envelope header occupies the first
//! 97 bytes of the block's data; `length_without_padding` in the metadata
//! keeps reporting the original plaintext length, which is also where the
//! ciphertext ends and the random padding begins.

use crate::block::base::{Block, BlockParams, BlockVariant};
use crate::block::metadata::EncryptedBlockMetadata;
use crate::block::types::BlockDataType;
use crate::crypto::ecies::{self, ECIES_OVERHEAD_LENGTH};
use crate::error::{BlockError, CryptoError};
use crate::member::Member;

pub use crate::crypto::ecies::EciesHeader;

/// Encrypt a block's payload for a recipient, producing an encrypted block
/// of the same size.
pub fn encrypt_block(recipient: &Member, block: &Block) -> Result<Block, BlockError> {
    if matches!(block.variant(), BlockVariant::Encrypted) {
        return Err(BlockError::InvalidHeader(
            "block is already encrypted".to_string(),
        ));
    }

    let plaintext_length =
        (block.metadata().length_without_padding as usize).min(block.payload_length());
    let envelope = ecies::encrypt(recipient.public_key(), &block.payload()[..plaintext_length])?;
    if envelope.len() > block.size().as_usize() {
        return Err(BlockError::DataLengthExceedsCapacity {
            capacity: block.size().as_usize(),
            actual: envelope.len(),
        });
    }

    let metadata = EncryptedBlockMetadata::from_ephemeral(block.metadata().clone()).into_inner();
    Block::new(BlockParams {
        variant: BlockVariant::Encrypted,
        data_type: BlockDataType::EncryptedData,
        size: block.size(),
        data: &envelope,
        checksum: None,
        creator: metadata.creator,
        date_created: Some(metadata.date_created()),
        actual_data_length: Some(plaintext_length as u64),
    })
}

/// Invert [`encrypt_block`] with the recipient's private key, recovering an
/// ephemeral block holding the plaintext payload.
///
/// The result carries the same payload prefix as the original block; its
/// padding (and therefore its checksum) is freshly randomized.
pub fn decrypt_block(recipient: &Member, block: &Block) -> Result<Block, BlockError> {
    if !matches!(block.variant(), BlockVariant::Encrypted) {
        return Err(BlockError::InvalidHeader(
            "block is not encrypted".to_string(),
        ));
    }
    let private_key = recipient
        .private_key()
        .ok_or(BlockError::Crypto(CryptoError::InvalidKey))?;

    let ciphertext_end = ECIES_OVERHEAD_LENGTH + block.metadata().length_without_padding as usize;
    if ciphertext_end > block.data().len() {
        return Err(BlockError::InvalidHeader(
            "recorded payload length overruns the block".to_string(),
        ));
    }

    let plaintext = ecies::decrypt_with_header(private_key, &block.data()[..ciphertext_end])?;
    Block::new(BlockParams {
        variant: BlockVariant::Ephemeral,
        data_type: BlockDataType::RawData,
        size: block.size(),
        data: &plaintext,
        checksum: None,
        creator: block.metadata().creator,
        date_created: Some(block.date_created()),
        actual_data_length: Some(plaintext.len() as u64),
    })
}

/// Parse the ECIES header at the front of an encrypted block.
pub fn parse_envelope_header(block: &Block) -> Result<EciesHeader, BlockError> {
    if !matches!(block.variant(), BlockVariant::Encrypted) {
        return Err(BlockError::InvalidHeader(
            "block is not encrypted".to_string(),
        ));
    }
    Ok(EciesHeader::parse(block.data())?)
}
