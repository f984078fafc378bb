//! Block core
//!
//! A block is a fixed-size, checksum-addressed byte record. All variants
//! share one struct; capacity, overhead, and header decoding dispatch on a
//! variant tag rather than a class hierarchy. Construction goes through the
//! [`Block::new`] factory, which validates, pads with random bytes, and
//! seals the checksum.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::block::cbl::{CblHeader, ExtendedCblHeader};
use crate::block::metadata::EphemeralBlockMetadata;
use crate::block::size::BlockSize;
use crate::block::types::{BlockDataType, BlockType};
use crate::checksum::{calculate_checksum, ChecksumBuffer};
use crate::crypto::ecies::ECIES_OVERHEAD_LENGTH;
use crate::error::BlockError;
use crate::member::MemberId;

/// The layer a block's leading bytes belong to.
#[derive(Clone, Debug)]
pub enum BlockVariant {
    /// Plain content bytes, no layer header.
    Raw,
    /// In-memory block carrying payload metadata that is not persisted.
    Ephemeral,
    /// Payload wrapped in an ECIES envelope.
    Encrypted,
    /// Constituent block list.
    Cbl(CblHeader),
    /// Constituent block list with file name and MIME type.
    ExtendedCbl(ExtendedCblHeader),
}

impl BlockVariant {
    /// Bytes at the start of `data` interpreted as this layer's header.
    pub fn header_length(&self) -> usize {
        match self {
            BlockVariant::Raw | BlockVariant::Ephemeral => 0,
            BlockVariant::Encrypted => ECIES_OVERHEAD_LENGTH,
            BlockVariant::Cbl(_) => CblHeader::SIZE,
            BlockVariant::ExtendedCbl(header) => header.header_length(),
        }
    }

    /// Minimum bytes a caller must supply to construct this variant.
    pub fn minimum_data_length(&self) -> usize {
        self.header_length()
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            BlockVariant::Raw => BlockType::RawData,
            BlockVariant::Ephemeral => BlockType::Ephemeral,
            BlockVariant::Encrypted => BlockType::EncryptedOwnedData,
            BlockVariant::Cbl(_) => BlockType::ConstituentBlockList,
            BlockVariant::ExtendedCbl(_) => BlockType::ExtendedConstituentBlockList,
        }
    }
}

/// Inputs to the [`Block::new`] factory.
pub struct BlockParams<'a> {
    pub variant: BlockVariant,
    pub data_type: BlockDataType,
    pub size: BlockSize,
    /// Layer header (if any) followed by payload. Anything beyond is padded.
    pub data: &'a [u8],
    /// Expected checksum; when given, construction fails unless it matches
    /// the checksum of the final padded buffer.
    pub checksum: Option<ChecksumBuffer>,
    pub creator: Option<MemberId>,
    /// Defaults to now. Must not be in the future.
    pub date_created: Option<DateTime<Utc>>,
    /// True payload length when the supplied data already contains padding
    /// or when the payload is shorter than `data`.
    pub actual_data_length: Option<u64>,
}

impl<'a> BlockParams<'a> {
    /// Raw content bytes with everything else defaulted.
    pub fn raw(size: BlockSize, data: &'a [u8]) -> Self {
        Self {
            variant: BlockVariant::Raw,
            data_type: BlockDataType::RawData,
            size,
            data,
            checksum: None,
            creator: None,
            date_created: None,
            actual_data_length: None,
        }
    }
}

/// A fixed-size, checksum-addressed byte record.
#[derive(Clone, Debug)]
pub struct Block {
    size: BlockSize,
    data: Vec<u8>,
    id_checksum: ChecksumBuffer,
    metadata: EphemeralBlockMetadata,
    variant: BlockVariant,
    can_read: bool,
    can_persist: bool,
}

impl Block {
    /// Validate, pad, checksum, and seal a block.
    ///
    /// Validation order, each step surfacing the first failure:
    /// data floor for the variant, block size ceiling, payload capacity,
    /// creation date, then checksum agreement.
    pub fn new(params: BlockParams<'_>) -> Result<Self, BlockError> {
        let BlockParams {
            variant,
            data_type,
            size,
            data,
            checksum,
            creator,
            date_created,
            actual_data_length,
        } = params;

        let minimum = variant.minimum_data_length();
        if data.len() < minimum {
            return Err(BlockError::DataLengthTooShort {
                minimum,
                actual: data.len(),
            });
        }

        let block_length = size.as_usize();
        if data.len() > block_length {
            return Err(BlockError::DataLengthExceedsCapacity {
                capacity: block_length,
                actual: data.len(),
            });
        }

        let capacity = block_length - variant.header_length();
        if let Some(actual) = actual_data_length {
            if actual as usize > capacity {
                return Err(BlockError::DataLengthExceedsCapacity {
                    capacity,
                    actual: actual as usize,
                });
            }
        }

        let date_created = date_created.unwrap_or_else(Utc::now);
        if date_created > Utc::now() {
            return Err(BlockError::FutureCreationDate { date: date_created });
        }

        // Fill to exactly the block size with random bytes, then lay the
        // supplied data over the prefix. Padding is deliberately random so
        // whitened blocks leak nothing about payload length.
        let mut buffer = vec![0u8; block_length];
        OsRng.fill_bytes(&mut buffer);
        buffer[..data.len()].copy_from_slice(data);

        let computed = calculate_checksum(&buffer);
        if let Some(expected) = checksum {
            if expected != computed {
                return Err(BlockError::ChecksumMismatch { expected, computed });
            }
        }

        let length_without_padding = actual_data_length
            .unwrap_or((data.len() - variant.header_length()) as u64);
        let metadata = EphemeralBlockMetadata::new(
            size,
            variant.block_type(),
            data_type,
            date_created,
            length_without_padding,
            creator,
        );

        Ok(Self {
            size,
            data: buffer,
            id_checksum: computed,
            metadata,
            variant,
            can_read: true,
            can_persist: true,
        })
    }

    /// A whitening block of pure random bytes.
    pub fn random(size: BlockSize) -> Result<Self, BlockError> {
        let mut block = Self::new(BlockParams::raw(size, &[]))?;
        block.metadata.base.block_type = BlockType::Random;
        block.metadata.length_without_padding = size.as_usize() as u64;
        Ok(block)
    }

    pub fn size(&self) -> BlockSize {
        self.size
    }

    /// The full padded buffer, exactly `size` bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn id_checksum(&self) -> ChecksumBuffer {
        self.id_checksum
    }

    pub fn metadata(&self) -> &EphemeralBlockMetadata {
        &self.metadata
    }

    pub fn variant(&self) -> &BlockVariant {
        &self.variant
    }

    pub fn date_created(&self) -> DateTime<Utc> {
        self.metadata.date_created()
    }

    /// This layer's header bytes at the start of `data`.
    pub fn layer_header_data(&self) -> &[u8] {
        &self.data[..self.variant.header_length()]
    }

    /// `data` minus the layer header: the payload window, padding included.
    pub fn payload(&self) -> &[u8] {
        &self.data[self.variant.header_length()..]
    }

    /// Allocated payload window length.
    pub fn payload_length(&self) -> usize {
        self.size.as_usize() - self.variant.header_length()
    }

    /// Usable bytes after this layer's overhead.
    pub fn capacity(&self) -> usize {
        self.payload_length()
    }

    pub fn can_read(&self) -> bool {
        self.can_read
    }

    pub fn can_persist(&self) -> bool {
        self.can_persist
    }

    /// One-way: once revoked, readability never returns.
    pub fn revoke_read(&mut self) {
        self.can_read = false;
    }

    /// One-way: once revoked, persistability never returns.
    pub fn revoke_persist(&mut self) {
        self.can_persist = false;
    }

    /// Recheck the sealed invariants: stored checksum matches the data and
    /// the creation date is not in the future. Only corruption after
    /// construction can make this fail.
    pub fn validate(&self) -> Result<(), BlockError> {
        let computed = calculate_checksum(&self.data);
        if computed != self.id_checksum {
            return Err(BlockError::ChecksumMismatch {
                expected: self.id_checksum,
                computed,
            });
        }
        if self.metadata.date_created() > Utc::now() {
            return Err(BlockError::FutureCreationDate {
                date: self.metadata.date_created(),
            });
        }
        Ok(())
    }
}
