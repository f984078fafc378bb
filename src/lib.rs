//! BrightChain core block engine
//!
//! Content-addressed, encrypted block storage. Arbitrary data is packaged
//! into fixed-size, checksum-addressed blocks, optionally sealed in an ECIES
//! envelope, whitened by XOR against random blocks, and described for
//! reassembly by Constituent Block List (CBL) blocks. Access to sealed
//! payloads is governed by Shamir quorum key sharing across members.

pub mod block;
pub mod checksum;
pub mod crypto;
pub mod error;
pub mod member;
pub mod quorum;
pub mod store;
pub mod tuple;

pub use block::{Block, BlockDataType, BlockParams, BlockSize, BlockType, BlockVariant};
pub use checksum::{calculate_checksum, ChecksumBuffer, CHECKSUM_LENGTH};
pub use error::{BlockError, CryptoError, SealingError, StoreError, TupleError};
pub use member::{Member, MemberId};
pub use quorum::{quorum_seal, quorum_unseal, QuorumDataRecord};
pub use store::{BlockHandle, BlockStore, DiskBlockStore, StoreConfig};
pub use tuple::{BlockHandleTuple, TUPLE_SIZE};
