//! XOR tuples and the whitening pipeline
//!
//! N equally sized blocks combine into one derived block whose bytes are
//! their bitwise XOR. The operation is associative, commutative, and
//! self-inverse: `XOR(XOR(a, b, c), b, c) == a`. Because operand order does
//! not change the result, a derived block's checksum is order-independent.
//!
//! The pipeline streams fixed-size chunks so operands larger than memory
//! never need to be resident at once; the content checksum is computed as
//! chunks pass. Any source error aborts the whole pipeline and surfaces the
//! first failure, and nothing reaches a store on failure.

use chrono::{DateTime, Utc};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::block::{Block, BlockDataType, BlockParams, BlockSize, BlockVariant, EphemeralBlockMetadata};
use crate::checksum::StreamingChecksum;
use crate::error::{StoreError, TupleError};
use crate::store::{BlockHandle, BlockStore, DiskBlockStore};

/// Fixed arity of a whitening tuple.
pub const TUPLE_SIZE: usize = 3;

const XOR_CHUNK_SIZE: usize = 64 * 1024;

async fn read_operand<R: AsyncRead + Unpin>(
    source: &mut R,
    buffer: &mut [u8],
) -> Result<(), TupleError> {
    match source.read_exact(buffer).await {
        Ok(_) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(TupleError::BlockSizesMustMatch)
        }
        Err(error) => Err(error.into()),
    }
}

/// Stream N ≥ 2 operands of exactly `block_size` bytes through an N-way XOR
/// and seal the result as a raw block.
///
/// The derived block's creation date comes from the destination metadata
/// when given, otherwise from the clock. No provenance linking the result
/// to its operands is retained.
pub async fn xor_pipeline<R>(
    mut sources: Vec<R>,
    block_size: BlockSize,
    date_created: Option<DateTime<Utc>>,
) -> Result<Block, TupleError>
where
    R: AsyncRead + Unpin,
{
    if sources.len() < 2 {
        return Err(TupleError::NoBlocksToXor);
    }

    let length = block_size.as_usize();
    let mut output = Vec::with_capacity(length);
    let mut checksum = StreamingChecksum::new();
    let mut accumulator = vec![0u8; XOR_CHUNK_SIZE];
    let mut operand = vec![0u8; XOR_CHUNK_SIZE];

    let mut remaining = length;
    while remaining > 0 {
        let take = remaining.min(XOR_CHUNK_SIZE);
        read_operand(&mut sources[0], &mut accumulator[..take]).await?;
        for source in &mut sources[1..] {
            read_operand(source, &mut operand[..take]).await?;
            for (acc, byte) in accumulator[..take].iter_mut().zip(&operand[..take]) {
                *acc ^= *byte;
            }
        }
        checksum.update(&accumulator[..take]);
        output.extend_from_slice(&accumulator[..take]);
        remaining -= take;
    }

    // Every operand must end exactly at the block boundary
    for source in sources.iter_mut() {
        let mut probe = [0u8; 1];
        match source.read(&mut probe).await {
            Ok(0) => {}
            Ok(_) => return Err(TupleError::BlockSizesMustMatch),
            Err(error) => return Err(error.into()),
        }
    }

    let checksum = checksum.finalize();
    let block = Block::new(BlockParams {
        variant: BlockVariant::Raw,
        data_type: BlockDataType::RawData,
        size: block_size,
        data: &output,
        checksum: Some(checksum),
        creator: None,
        date_created: Some(date_created.unwrap_or_else(Utc::now)),
        actual_data_length: None,
    })?;
    Ok(block)
}

/// A fixed-arity grouping of handles intended for XOR composition.
///
/// All handles must share one block size; arity is exactly [`TUPLE_SIZE`].
#[derive(Clone, Debug)]
pub struct BlockHandleTuple {
    handles: Vec<BlockHandle>,
}

impl BlockHandleTuple {
    pub fn new(handles: Vec<BlockHandle>) -> Result<Self, TupleError> {
        if handles.len() != TUPLE_SIZE {
            return Err(TupleError::InvalidTupleSize {
                expected: TUPLE_SIZE,
                actual: handles.len(),
            });
        }
        let first = handles[0].block_size();
        if handles.iter().any(|handle| handle.block_size() != first) {
            return Err(TupleError::BlockSizeMismatch);
        }
        Ok(Self { handles })
    }

    pub fn handles(&self) -> &[BlockHandle] {
        &self.handles
    }

    pub fn block_size(&self) -> BlockSize {
        self.handles[0].block_size()
    }

    /// XOR the members through the store, persist the derived block, and
    /// return its handle.
    pub async fn xor_to_store(
        &self,
        store: &DiskBlockStore,
        dest_meta: Option<&EphemeralBlockMetadata>,
    ) -> Result<BlockHandle, StoreError> {
        let block = store.xor(&self.handles, dest_meta).await?;
        store.set_data(&block).await
    }

    /// Validate every member handle; any failure makes the tuple unusable.
    pub async fn verify(&self) -> bool {
        for handle in &self.handles {
            if handle.validate().await.is_err() {
                return false;
            }
        }
        true
    }
}
