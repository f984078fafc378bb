//! Content checksums
//!
//! Every block is addressed by the SHA-256 digest of its full, padded data
//! buffer. The digest doubles as the block's identity and its path in the
//! on-disk store, so all identity operations route through this module.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Digest width in bytes (SHA-256).
pub const CHECKSUM_LENGTH: usize = 32;

/// A fixed-width content hash acting as a block address.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChecksumBuffer([u8; CHECKSUM_LENGTH]);

impl ChecksumBuffer {
    pub fn from_bytes(bytes: [u8; CHECKSUM_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; CHECKSUM_LENGTH] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase or uppercase hex address. Returns `None` unless the
    /// input decodes to exactly `CHECKSUM_LENGTH` bytes.
    pub fn from_hex(s: &str) -> Option<Self> {
        let decoded = hex::decode(s).ok()?;
        let bytes: [u8; CHECKSUM_LENGTH] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for ChecksumBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ChecksumBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChecksumBuffer({})", self.to_hex())
    }
}

impl Serialize for ChecksumBuffer {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChecksumBuffer {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid checksum hex"))
    }
}

/// Compute the content checksum of a byte buffer.
pub fn calculate_checksum(bytes: &[u8]) -> ChecksumBuffer {
    ChecksumBuffer(Sha256::digest(bytes).into())
}

/// Incremental checksum over streamed data.
///
/// Used where the full buffer never lives in memory at once: the XOR
/// pipeline hashes chunks as they pass, and handle validation hashes a file
/// as it streams off disk.
pub struct StreamingChecksum {
    hasher: Sha256,
}

impl StreamingChecksum {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
    }

    pub fn finalize(self) -> ChecksumBuffer {
        ChecksumBuffer(self.hasher.finalize().into())
    }
}

impl Default for StreamingChecksum {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_is_deterministic() {
        let a = calculate_checksum(b"the same bytes");
        let b = calculate_checksum(b"the same bytes");
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_input_different_checksum() {
        let a = calculate_checksum(b"one buffer");
        let b = calculate_checksum(b"another buffer");
        assert_ne!(a, b);
    }

    #[test]
    fn test_hex_round_trip() {
        let checksum = calculate_checksum(b"round trip");
        let hex = checksum.to_hex();
        assert_eq!(hex.len(), CHECKSUM_LENGTH * 2);
        assert_eq!(ChecksumBuffer::from_hex(&hex), Some(checksum));
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert_eq!(ChecksumBuffer::from_hex("abcd"), None);
        assert_eq!(ChecksumBuffer::from_hex("zz"), None);
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let data = vec![7u8; 10_000];
        let mut streaming = StreamingChecksum::new();
        for chunk in data.chunks(617) {
            streaming.update(chunk);
        }
        assert_eq!(streaming.finalize(), calculate_checksum(&data));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let checksum = calculate_checksum(b"serde");
        let json = serde_json::to_string(&checksum).unwrap();
        assert_eq!(json, format!("\"{}\"", checksum.to_hex()));
        let back: ChecksumBuffer = serde_json::from_str(&json).unwrap();
        assert_eq!(back, checksum);
    }
}
