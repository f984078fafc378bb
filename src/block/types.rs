//! Contextual block tags
//!
//! Tags are carried by in-memory wrappers and derived from CBLs; they are
//! never written into a block's bytes or stored on disk.

use serde::{Deserialize, Serialize};

/// What role a block plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    RawData,
    EncryptedOwnedData,
    ConstituentBlockList,
    ExtendedConstituentBlockList,
    /// A lazy reference whose underlying block metadata is not loaded.
    Handle,
    /// A whitening operand of pure random bytes.
    Random,
    Ephemeral,
}

/// What kind of bytes a block's payload holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockDataType {
    RawData,
    EncryptedData,
    EphemeralStructuredData,
}
