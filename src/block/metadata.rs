//! Block metadata
//!
//! Metadata travels alongside a block in memory and, for stored blocks, in
//! an optional `.m.json` sidecar. It is never part of the block's own bytes,
//! so it does not influence the content checksum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::block::size::BlockSize;
use crate::block::types::{BlockDataType, BlockType};
use crate::member::MemberId;

/// Metadata common to every block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockMetadata {
    pub size: BlockSize,
    pub block_type: BlockType,
    pub data_type: BlockDataType,
    pub date_created: DateTime<Utc>,
}

impl BlockMetadata {
    pub fn new(
        size: BlockSize,
        block_type: BlockType,
        data_type: BlockDataType,
        date_created: DateTime<Utc>,
    ) -> Self {
        Self {
            size,
            block_type,
            data_type,
            date_created,
        }
    }
}

/// [`BlockMetadata`] extended for an in-memory block whose payload is
/// shorter than the block: the original length, the creating member, and
/// whether the payload sits inside an encryption envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EphemeralBlockMetadata {
    #[serde(flatten)]
    pub base: BlockMetadata,
    /// True payload length before random padding.
    pub length_without_padding: u64,
    pub creator: Option<MemberId>,
    pub encrypted: bool,
}

impl EphemeralBlockMetadata {
    pub fn new(
        size: BlockSize,
        block_type: BlockType,
        data_type: BlockDataType,
        date_created: DateTime<Utc>,
        length_without_padding: u64,
        creator: Option<MemberId>,
    ) -> Self {
        Self {
            base: BlockMetadata::new(size, block_type, data_type, date_created),
            length_without_padding,
            creator,
            encrypted: data_type == BlockDataType::EncryptedData,
        }
    }

    pub fn size(&self) -> BlockSize {
        self.base.size
    }

    pub fn block_type(&self) -> BlockType {
        self.base.block_type
    }

    pub fn data_type(&self) -> BlockDataType {
        self.base.data_type
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.base.date_created
    }
}

/// Metadata for a block whose payload has been ECIES-wrapped. Derived from
/// the ephemeral metadata of the plaintext block; `length_without_padding`
/// keeps reporting the original (pre-envelope) payload length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedBlockMetadata(EphemeralBlockMetadata);

impl EncryptedBlockMetadata {
    pub fn from_ephemeral(mut metadata: EphemeralBlockMetadata) -> Self {
        metadata.base.block_type = BlockType::EncryptedOwnedData;
        metadata.base.data_type = BlockDataType::EncryptedData;
        metadata.encrypted = true;
        Self(metadata)
    }

    pub fn inner(&self) -> &EphemeralBlockMetadata {
        &self.0
    }

    pub fn into_inner(self) -> EphemeralBlockMetadata {
        self.0
    }
}
