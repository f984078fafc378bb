//! Fixed block sizes
//!
//! Every block is exactly one of a closed set of byte capacities; there is
//! no dynamic sizing. The lower-case label doubles as the first path
//! component under a store root.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockSize {
    Message,
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
}

impl BlockSize {
    pub const ALL: [BlockSize; 6] = [
        BlockSize::Message,
        BlockSize::Tiny,
        BlockSize::Small,
        BlockSize::Medium,
        BlockSize::Large,
        BlockSize::Huge,
    ];

    pub fn as_usize(self) -> usize {
        match self {
            BlockSize::Message => 512,
            BlockSize::Tiny => 1024,
            BlockSize::Small => 4096,
            BlockSize::Medium => 1_048_576,
            BlockSize::Large => 67_108_864,
            BlockSize::Huge => 268_435_456,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BlockSize::Message => "message",
            BlockSize::Tiny => "tiny",
            BlockSize::Small => "small",
            BlockSize::Medium => "medium",
            BlockSize::Large => "large",
            BlockSize::Huge => "huge",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|size| size.label() == label)
    }

    /// Match an exact byte length to its size, if any.
    pub fn from_length(length: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|size| size.as_usize() == length)
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_are_strictly_increasing() {
        let lengths: Vec<usize> = BlockSize::ALL.iter().map(|s| s.as_usize()).collect();
        assert!(lengths.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_label_round_trip() {
        for size in BlockSize::ALL {
            assert_eq!(BlockSize::from_label(size.label()), Some(size));
        }
        assert_eq!(BlockSize::from_label("giant"), None);
    }

    #[test]
    fn test_from_length() {
        assert_eq!(BlockSize::from_length(4096), Some(BlockSize::Small));
        assert_eq!(BlockSize::from_length(4097), None);
    }

    #[test]
    fn test_serde_labels() {
        assert_eq!(
            serde_json::to_string(&BlockSize::Small).unwrap(),
            "\"small\""
        );
        let back: BlockSize = serde_json::from_str("\"huge\"").unwrap();
        assert_eq!(back, BlockSize::Huge);
    }
}
