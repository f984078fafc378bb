//! Block storage
//!
//! A content-addressed store of fixed-size blocks keyed by checksum. The
//! disk implementation shards paths two levels deep by hex prefix; the
//! [`BlockStore`] trait is the seam for alternative backends.

pub mod disk;
pub mod handle;

pub use disk::{DiskBlockStore, StoreConfig, METADATA_SUFFIX};
pub use handle::BlockHandle;

use async_trait::async_trait;

use crate::block::{Block, BlockSize};
use crate::checksum::ChecksumBuffer;
use crate::error::StoreError;

/// Content-addressed persistence of fixed-size blocks.
///
/// Every store holds blocks of exactly one size. Files are immutable after
/// creation; concurrent writes of one key resolve to a single winner.
#[async_trait]
pub trait BlockStore: Send + Sync {
    fn block_size(&self) -> BlockSize;

    /// Whether a block exists under this checksum.
    async fn has(&self, checksum: &ChecksumBuffer) -> bool;

    /// A lazy handle for this checksum. Always succeeds; existence and
    /// integrity are checked when the handle is read or validated.
    async fn get(&self, checksum: &ChecksumBuffer) -> BlockHandle;

    /// Read a stored block eagerly.
    async fn get_data(&self, checksum: &ChecksumBuffer) -> Result<Block, StoreError>;

    /// Persist a block under its checksum.
    async fn set_data(&self, block: &Block) -> Result<BlockHandle, StoreError>;
}
