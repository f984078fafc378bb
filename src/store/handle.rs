//! Lazy block handles
//!
//! A handle is a content-addressed reference to a stored block. It owns no
//! data: obtaining one always succeeds, and the file is only touched when
//! its data is read or validation is requested.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, BufReader};

use crate::block::{BlockDataType, BlockSize, BlockType, EphemeralBlockMetadata};
use crate::checksum::{ChecksumBuffer, StreamingChecksum};
use crate::error::{BlockError, StoreError};

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// A lazy, content-addressed reference to a stored block.
///
/// When sidecar metadata is available the handle inherits the block's type
/// tags; otherwise it is tagged [`BlockType::Handle`].
#[derive(Clone, Debug)]
pub struct BlockHandle {
    block_type: BlockType,
    data_type: BlockDataType,
    id_checksum: ChecksumBuffer,
    metadata: Option<EphemeralBlockMetadata>,
    path: PathBuf,
    block_size: BlockSize,
    can_read: bool,
    can_persist: bool,
}

impl BlockHandle {
    pub(crate) fn new(
        block_size: BlockSize,
        id_checksum: ChecksumBuffer,
        path: PathBuf,
        metadata: Option<EphemeralBlockMetadata>,
    ) -> Self {
        // Without sidecar metadata the referenced block's role is unknown;
        // the handle carries its own tag rather than claiming raw data
        let (block_type, data_type) = metadata
            .as_ref()
            .map(|m| (m.block_type(), m.data_type()))
            .unwrap_or((BlockType::Handle, BlockDataType::RawData));
        Self {
            block_type,
            data_type,
            id_checksum,
            metadata,
            path,
            block_size,
            can_read: true,
            can_persist: true,
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.block_type
    }

    pub fn data_type(&self) -> BlockDataType {
        self.data_type
    }

    pub fn id_checksum(&self) -> ChecksumBuffer {
        self.id_checksum
    }

    pub fn metadata(&self) -> Option<&EphemeralBlockMetadata> {
        self.metadata.as_ref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> BlockSize {
        self.block_size
    }

    pub fn can_read(&self) -> bool {
        self.can_read
    }

    pub fn can_persist(&self) -> bool {
        self.can_persist
    }

    pub async fn exists(&self) -> bool {
        tokio::fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Read the full padded `block_size` bytes.
    pub async fn full_data(&self) -> Result<Vec<u8>, StoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::KeyNotFound(self.id_checksum))
            }
            other => other?,
        };
        if data.len() != self.block_size.as_usize() {
            return Err(StoreError::BlockFileSizeMismatch {
                expected: self.block_size.as_usize(),
                actual: data.len(),
            });
        }
        Ok(data)
    }

    /// Open a buffered chunked reader over the block file.
    pub async fn read_stream(&self) -> Result<BufReader<File>, StoreError> {
        let file = match File::open(&self.path).await {
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::KeyNotFound(self.id_checksum))
            }
            other => other?,
        };
        Ok(BufReader::new(file))
    }

    /// Stream the file and recompute its checksum against `id_checksum`.
    pub async fn validate(&self) -> Result<(), StoreError> {
        let mut reader = self.read_stream().await?;
        let mut checksum = StreamingChecksum::new();
        let mut buffer = vec![0u8; READ_CHUNK_SIZE];
        let mut total = 0usize;
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            checksum.update(&buffer[..read]);
            total += read;
        }

        if total != self.block_size.as_usize() {
            return Err(StoreError::BlockFileSizeMismatch {
                expected: self.block_size.as_usize(),
                actual: total,
            });
        }
        let computed = checksum.finalize();
        if computed != self.id_checksum {
            return Err(StoreError::BlockValidationFailed(
                BlockError::ChecksumMismatch {
                    expected: self.id_checksum,
                    computed,
                },
            ));
        }
        Ok(())
    }
}
