//! Disk-backed content-addressed block store
//!
//! Layout: `<root>/<size label>/<hex[0..2]>/<hex[2..4]>/<full hex>`. A block
//! file holds exactly `block_size` bytes whose checksum equals its file
//! name; there is no magic, trailer, or embedded metadata. The optional
//! sidecar `<full hex>.m.json` carries ephemeral metadata and is excluded
//! from enumeration and sampling.
//!
//! The store is immutable by key: a path, once written, is never rewritten.
//! Concurrent writers of one key race on an atomic test-and-create; exactly
//! one wins and the rest fail with `BlockPathAlreadyExists`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::block::{Block, BlockDataType, BlockParams, BlockSize, BlockVariant, EphemeralBlockMetadata};
use crate::checksum::{ChecksumBuffer, CHECKSUM_LENGTH};
use crate::error::{BlockError, StoreError, TupleError};
use crate::store::handle::BlockHandle;
use crate::store::BlockStore;
use crate::tuple::xor_pipeline;

/// Sidecar file suffix appended to the block's hex name.
pub const METADATA_SUFFIX: &str = ".m.json";

/// Where a store lives and which block size it holds.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub block_size: BlockSize,
}

/// Two-level hex-sharded on-disk block store.
pub struct DiskBlockStore {
    root: PathBuf,
    block_size: BlockSize,
}

impl DiskBlockStore {
    /// Open a store, creating its size root eagerly.
    pub async fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let size_root = config.root.join(config.block_size.label());
        fs::create_dir_all(&size_root).await.map_err(|source| {
            StoreError::BlockDirectoryCreationFailed {
                path: size_root.clone(),
                source,
            }
        })?;
        Ok(Self {
            root: config.root,
            block_size: config.block_size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path for a checksum.
    pub fn block_path(&self, checksum: &ChecksumBuffer) -> PathBuf {
        let hex = checksum.to_hex();
        self.root
            .join(self.block_size.label())
            .join(&hex[..2])
            .join(&hex[2..4])
            .join(&hex)
    }

    /// Sidecar path for a checksum.
    pub fn metadata_path(&self, checksum: &ChecksumBuffer) -> PathBuf {
        let hex = checksum.to_hex();
        self.root
            .join(self.block_size.label())
            .join(&hex[..2])
            .join(&hex[2..4])
            .join(format!("{}{}", hex, METADATA_SUFFIX))
    }

    async fn read_sidecar(&self, checksum: &ChecksumBuffer) -> Option<EphemeralBlockMetadata> {
        let bytes = fs::read(self.metadata_path(checksum)).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Stream the given handles through an N-way XOR into a derived raw
    /// block. The result is not persisted; nothing reaches disk on failure.
    pub async fn xor(
        &self,
        handles: &[BlockHandle],
        dest_meta: Option<&EphemeralBlockMetadata>,
    ) -> Result<Block, StoreError> {
        if handles.is_empty() {
            return Err(StoreError::NoBlocksProvided);
        }
        if handles.len() < 2 {
            return Err(TupleError::NoBlocksToXor.into());
        }
        if handles
            .iter()
            .any(|handle| handle.block_size() != self.block_size)
        {
            return Err(TupleError::BlockSizeMismatch.into());
        }

        let mut sources = Vec::with_capacity(handles.len());
        for handle in handles {
            sources.push(handle.read_stream().await?);
        }
        let block = xor_pipeline(
            sources,
            self.block_size,
            dest_meta.map(|meta| meta.date_created()),
        )
        .await?;
        Ok(block)
    }

    /// Sample up to `count` distinct block addresses by random two-level
    /// descent: pick a first-level shard, then a second-level shard, then a
    /// file. Empty directories are skipped; first-level shards with no
    /// blocks at all drop out of the candidate set. May return fewer than
    /// `count`.
    pub async fn random_block_checksums(
        &self,
        count: usize,
    ) -> Result<Vec<ChecksumBuffer>, StoreError> {
        let size_root = self.root.join(self.block_size.label());
        let mut shards = list_dirs(&size_root).await?;
        let mut found: Vec<ChecksumBuffer> = Vec::new();

        let mut attempts = 0usize;
        let max_attempts = count.saturating_mul(8).max(16);
        while found.len() < count && !shards.is_empty() && attempts < max_attempts {
            attempts += 1;
            let index = OsRng.gen_range(0..shards.len());
            match self.sample_shard(&shards[index]).await? {
                None => {
                    shards.swap_remove(index);
                }
                Some(checksum) => {
                    if !found.contains(&checksum) {
                        found.push(checksum);
                    }
                }
            }
        }
        Ok(found)
    }

    /// One random draw from a first-level shard, or `None` when the shard
    /// holds no block files at all.
    async fn sample_shard(&self, shard: &Path) -> Result<Option<ChecksumBuffer>, StoreError> {
        let mut seconds = list_dirs(shard).await?;
        while !seconds.is_empty() {
            let index = OsRng.gen_range(0..seconds.len());
            let files = list_block_files(&seconds[index]).await?;
            if files.is_empty() {
                seconds.swap_remove(index);
                continue;
            }
            let pick = OsRng.gen_range(0..files.len());
            return Ok(Some(files[pick]));
        }
        Ok(None)
    }
}

async fn list_dirs(path: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut dirs = Vec::new();
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(dirs),
        Err(error) => return Err(error.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Block files are exactly the entries whose name is a full hex checksum;
/// sidecars and strays fail the parse and drop out.
async fn list_block_files(path: &Path) -> Result<Vec<ChecksumBuffer>, StoreError> {
    let mut files = Vec::new();
    let mut entries = match fs::read_dir(path).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(files),
        Err(error) => return Err(error.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.len() != CHECKSUM_LENGTH * 2 {
            continue;
        }
        if let Some(checksum) = ChecksumBuffer::from_hex(name) {
            files.push(checksum);
        }
    }
    Ok(files)
}

#[async_trait]
impl BlockStore for DiskBlockStore {
    fn block_size(&self) -> BlockSize {
        self.block_size
    }

    async fn has(&self, checksum: &ChecksumBuffer) -> bool {
        fs::try_exists(self.block_path(checksum)).await.unwrap_or(false)
    }

    async fn get(&self, checksum: &ChecksumBuffer) -> BlockHandle {
        let metadata = self.read_sidecar(checksum).await;
        BlockHandle::new(
            self.block_size,
            *checksum,
            self.block_path(checksum),
            metadata,
        )
    }

    async fn get_data(&self, checksum: &ChecksumBuffer) -> Result<Block, StoreError> {
        let path = self.block_path(checksum);
        let file_metadata = match fs::metadata(&path).await {
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Err(StoreError::KeyNotFound(*checksum))
            }
            other => other?,
        };
        let data = fs::read(&path).await?;
        if data.len() != self.block_size.as_usize() {
            return Err(StoreError::BlockFileSizeMismatch {
                expected: self.block_size.as_usize(),
                actual: data.len(),
            });
        }

        // Creation time comes from the filesystem birth time where the
        // platform records one
        let date_created: DateTime<Utc> = file_metadata
            .created()
            .or_else(|_| file_metadata.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let block = Block::new(BlockParams {
            variant: BlockVariant::Raw,
            data_type: BlockDataType::RawData,
            size: self.block_size,
            data: &data,
            checksum: Some(*checksum),
            creator: None,
            date_created: Some(date_created),
            actual_data_length: None,
        })?;
        Ok(block)
    }

    async fn set_data(&self, block: &Block) -> Result<BlockHandle, StoreError> {
        if block.size() != self.block_size {
            return Err(StoreError::BlockValidationFailed(
                BlockError::BlockSizeMismatch {
                    expected: self.block_size.as_usize(),
                    actual: block.size().as_usize(),
                },
            ));
        }
        if !block.can_persist() {
            return Err(StoreError::BlockValidationFailed(BlockError::InvalidHeader(
                "persistability has been revoked".to_string(),
            )));
        }
        block.validate()?;

        let checksum = block.id_checksum();
        let path = self.block_path(&checksum);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|source| {
                StoreError::BlockDirectoryCreationFailed {
                    path: parent.to_path_buf(),
                    source,
                }
            })?;
        }

        // Atomic test-and-create: at most one concurrent writer of a key wins
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Err(error) if error.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::BlockPathAlreadyExists(checksum))
            }
            other => other?,
        };

        let write_result = async {
            file.write_all(block.data()).await?;
            file.flush().await
        }
        .await;
        if let Err(error) = write_result {
            drop(file);
            if let Err(cleanup) = fs::remove_file(&path).await {
                warn!(%checksum, error = %cleanup, "failed to remove partial block file");
            }
            return Err(error.into());
        }

        let sidecar = serde_json::to_vec(block.metadata())
            .map_err(|error| std::io::Error::new(ErrorKind::InvalidData, error))?;
        if let Err(error) = fs::write(self.metadata_path(&checksum), sidecar).await {
            let _ = fs::remove_file(&path).await;
            return Err(error.into());
        }

        debug!(%checksum, size = %self.block_size, "stored block");
        Ok(self.get(&checksum).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockType;

    async fn open_store(dir: &Path) -> DiskBlockStore {
        DiskBlockStore::open(StoreConfig {
            root: dir.to_path_buf(),
            block_size: BlockSize::Small,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_set_then_has_then_get_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let block = Block::new(BlockParams::raw(BlockSize::Small, b"stored bytes")).unwrap();

        assert!(!store.has(&block.id_checksum()).await);
        store.set_data(&block).await.unwrap();
        assert!(store.has(&block.id_checksum()).await);

        let loaded = store.get_data(&block.id_checksum()).await.unwrap();
        assert_eq!(loaded.data(), block.data());
        assert_eq!(loaded.id_checksum(), block.id_checksum());
    }

    #[tokio::test]
    async fn test_path_is_sharded_two_levels() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let block = Block::new(BlockParams::raw(BlockSize::Small, b"sharded")).unwrap();
        let hex = block.id_checksum().to_hex();

        let expected = dir
            .path()
            .join("small")
            .join(&hex[..2])
            .join(&hex[2..4])
            .join(&hex);
        assert_eq!(store.block_path(&block.id_checksum()), expected);

        store.set_data(&block).await.unwrap();
        assert!(expected.exists());
    }

    #[tokio::test]
    async fn test_double_set_fails_with_path_already_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let block = Block::new(BlockParams::raw(BlockSize::Small, b"only once")).unwrap();

        store.set_data(&block).await.unwrap();
        assert!(matches!(
            store.set_data(&block).await,
            Err(StoreError::BlockPathAlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_get_data_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let absent = crate::calculate_checksum(b"never stored");
        assert!(matches!(
            store.get_data(&absent).await,
            Err(StoreError::KeyNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_get_data_detects_size_violation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let block = Block::new(BlockParams::raw(BlockSize::Small, b"will truncate")).unwrap();
        store.set_data(&block).await.unwrap();

        let path = store.block_path(&block.id_checksum());
        fs::write(&path, &block.data()[..100]).await.unwrap();

        assert!(matches!(
            store.get_data(&block.id_checksum()).await,
            Err(StoreError::BlockFileSizeMismatch { actual: 100, .. })
        ));
    }

    #[tokio::test]
    async fn test_set_rejects_wrong_block_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let tiny = Block::new(BlockParams::raw(BlockSize::Tiny, b"wrong store")).unwrap();

        assert!(matches!(
            store.set_data(&tiny).await,
            Err(StoreError::BlockValidationFailed(
                BlockError::BlockSizeMismatch { .. }
            ))
        ));
    }

    #[tokio::test]
    async fn test_handle_carries_sidecar_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let block = Block::random(BlockSize::Small).unwrap();
        store.set_data(&block).await.unwrap();

        let handle = store.get(&block.id_checksum()).await;
        let metadata = handle.metadata().expect("sidecar should be readable");
        assert_eq!(metadata.block_type(), BlockType::Random);
        assert_eq!(handle.block_type(), BlockType::Random);
        handle.validate().await.unwrap();
    }

    #[tokio::test]
    async fn test_random_sampling_excludes_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;

        let mut stored = Vec::new();
        for _ in 0..5 {
            let block = Block::random(BlockSize::Small).unwrap();
            store.set_data(&block).await.unwrap();
            stored.push(block.id_checksum());
        }

        let sampled = store.random_block_checksums(10).await.unwrap();
        assert!(!sampled.is_empty());
        assert!(sampled.len() <= 5);
        for checksum in &sampled {
            assert!(stored.contains(checksum));
        }
    }

    #[tokio::test]
    async fn test_random_sampling_on_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        assert!(store.random_block_checksums(3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_xor_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;

        let a = Block::random(BlockSize::Small).unwrap();
        let b = Block::random(BlockSize::Small).unwrap();
        let c = Block::random(BlockSize::Small).unwrap();
        let mut handles = Vec::new();
        for block in [&a, &b, &c] {
            handles.push(store.set_data(block).await.unwrap());
        }

        let derived = store.xor(&handles, None).await.unwrap();
        let expected: Vec<u8> = a
            .data()
            .iter()
            .zip(b.data())
            .zip(c.data())
            .map(|((x, y), z)| x ^ y ^ z)
            .collect();
        assert_eq!(derived.data(), expected.as_slice());

        // XOR back: derived ^ b ^ c == a
        let derived_handle = store.set_data(&derived).await.unwrap();
        let recovered = store
            .xor(
                &[derived_handle, handles[1].clone(), handles[2].clone()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(recovered.data(), a.data());
        assert_eq!(recovered.id_checksum(), a.id_checksum());
    }

    #[tokio::test]
    async fn test_xor_rejects_empty_and_single() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;

        assert!(matches!(
            store.xor(&[], None).await,
            Err(StoreError::NoBlocksProvided)
        ));

        let block = Block::random(BlockSize::Small).unwrap();
        let handle = store.set_data(&block).await.unwrap();
        assert!(matches!(
            store.xor(&[handle], None).await,
            Err(StoreError::Tuple(TupleError::NoBlocksToXor))
        ));
    }
}
