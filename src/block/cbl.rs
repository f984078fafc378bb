//! Constituent Block List blocks
//!
//! A CBL's payload is a fixed header followed by a dense run of 32-byte
//! block addresses. XORing the addressed blocks tuple-by-tuple reconstitutes
//! the described data; the CBL itself stores none of the original bytes.
//! The ExtendedCBL adds a file name and MIME type for presentation.
//!
//! Header layout (big-endian multi-byte integers):
//!
//! ```text
//! creator_signature     64   ECDSA secp256k1, r||s, over the CBL digest
//! date_created           8   u64 milliseconds since epoch
//! original_data_length   8   u64
//! address_count          4   u32
//! tuple_size             1   u8
//! -- ExtendedCBL only --
//! file_name_length       1   1..=255
//! mime_type_length       1   1..=255
//! file_name              n   UTF-8
//! mime_type              m   ASCII `type/subtype`
//! ```

use chrono::{DateTime, TimeZone, Utc};

use crate::block::base::{Block, BlockParams, BlockVariant};
use crate::block::size::BlockSize;
use crate::block::types::BlockDataType;
use crate::checksum::{ChecksumBuffer, StreamingChecksum, CHECKSUM_LENGTH};
use crate::error::BlockError;
use crate::member::{Member, SIGNATURE_LENGTH};

pub const MAX_FILE_NAME_LENGTH: usize = 255;
pub const MAX_MIME_TYPE_LENGTH: usize = 255;

/// Fixed CBL header preceding the address list.
#[derive(Clone, Debug, PartialEq)]
pub struct CblHeader {
    pub creator_signature: [u8; SIGNATURE_LENGTH],
    pub date_created: DateTime<Utc>,
    pub original_data_length: u64,
    pub address_count: u32,
    pub tuple_size: u8,
}

impl CblHeader {
    pub const SIZE: usize = SIGNATURE_LENGTH + 8 + 8 + 4 + 1;

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::SIZE);
        bytes.extend_from_slice(&self.creator_signature);
        bytes.extend_from_slice(&(self.date_created.timestamp_millis() as u64).to_be_bytes());
        bytes.extend_from_slice(&self.original_data_length.to_be_bytes());
        bytes.extend_from_slice(&self.address_count.to_be_bytes());
        bytes.push(self.tuple_size);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BlockError> {
        if bytes.len() < Self::SIZE {
            return Err(BlockError::InvalidHeader(format!(
                "CBL header needs {} bytes, got {}",
                Self::SIZE,
                bytes.len()
            )));
        }
        let mut creator_signature = [0u8; SIGNATURE_LENGTH];
        creator_signature.copy_from_slice(&bytes[..SIGNATURE_LENGTH]);

        let mut date_buf = [0u8; 8];
        date_buf.copy_from_slice(&bytes[64..72]);
        let date_millis = u64::from_be_bytes(date_buf);

        let mut length_buf = [0u8; 8];
        length_buf.copy_from_slice(&bytes[72..80]);
        let original_data_length = u64::from_be_bytes(length_buf);

        let mut count_buf = [0u8; 4];
        count_buf.copy_from_slice(&bytes[80..84]);
        let address_count = u32::from_be_bytes(count_buf);
        let tuple_size = bytes[84];

        let date_created = Utc
            .timestamp_millis_opt(date_millis as i64)
            .single()
            .ok_or_else(|| {
                BlockError::InvalidHeader("CBL creation timestamp out of range".to_string())
            })?;

        Ok(Self {
            creator_signature,
            date_created,
            original_data_length,
            address_count,
            tuple_size,
        })
    }
}

/// CBL header plus file presentation fields.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtendedCblHeader {
    pub base: CblHeader,
    pub file_name: String,
    pub mime_type: String,
}

impl ExtendedCblHeader {
    pub fn header_length(&self) -> usize {
        CblHeader::SIZE + 2 + self.file_name.len() + self.mime_type.len()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = self.base.encode();
        bytes.push(self.file_name.len() as u8);
        bytes.push(self.mime_type.len() as u8);
        bytes.extend_from_slice(self.file_name.as_bytes());
        bytes.extend_from_slice(self.mime_type.as_bytes());
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, BlockError> {
        let base = CblHeader::decode(bytes)?;
        if bytes.len() < CblHeader::SIZE + 2 {
            return Err(BlockError::InvalidHeader(
                "extended CBL header truncated before length fields".to_string(),
            ));
        }
        let file_name_length = bytes[CblHeader::SIZE] as usize;
        let mime_type_length = bytes[CblHeader::SIZE + 1] as usize;
        let names_start = CblHeader::SIZE + 2;
        let names_end = names_start + file_name_length + mime_type_length;
        if bytes.len() < names_end {
            return Err(BlockError::InvalidHeader(
                "extended CBL header truncated inside name fields".to_string(),
            ));
        }

        let file_name = std::str::from_utf8(&bytes[names_start..names_start + file_name_length])
            .map_err(|_| BlockError::InvalidHeader("file name is not valid UTF-8".to_string()))?
            .to_string();
        let mime_type =
            std::str::from_utf8(&bytes[names_start + file_name_length..names_end])
                .map_err(|_| {
                    BlockError::InvalidHeader("MIME type is not valid UTF-8".to_string())
                })?
                .to_string();

        validate_file_name(&file_name)?;
        validate_mime_type(&mime_type)?;

        Ok(Self {
            base,
            file_name,
            mime_type,
        })
    }
}

fn validate_file_name(file_name: &str) -> Result<(), BlockError> {
    if file_name.is_empty() || file_name.len() > MAX_FILE_NAME_LENGTH {
        return Err(BlockError::InvalidHeader(format!(
            "file name length must lie in 1..={}, got {}",
            MAX_FILE_NAME_LENGTH,
            file_name.len()
        )));
    }
    Ok(())
}

fn validate_mime_type(mime_type: &str) -> Result<(), BlockError> {
    if mime_type.is_empty() || mime_type.len() > MAX_MIME_TYPE_LENGTH {
        return Err(BlockError::InvalidHeader(format!(
            "MIME type length must lie in 1..={}, got {}",
            MAX_MIME_TYPE_LENGTH,
            mime_type.len()
        )));
    }
    let mut halves = mime_type.split('/');
    let (top, sub) = (halves.next().unwrap_or(""), halves.next().unwrap_or(""));
    let well_formed = halves.next().is_none()
        && !top.is_empty()
        && !sub.is_empty()
        && mime_type
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"./+-".contains(&b));
    if !well_formed {
        return Err(BlockError::InvalidHeader(format!(
            "MIME type `{}` is not a lowercase type/subtype pair",
            mime_type
        )));
    }
    Ok(())
}

/// Addresses a plain CBL of this size can hold.
pub fn address_capacity(size: BlockSize) -> usize {
    (size.as_usize() - CblHeader::SIZE) / CHECKSUM_LENGTH
}

fn truncate_to_millis(date: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(date.timestamp_millis())
        .single()
        .expect("millisecond timestamp of a valid DateTime round-trips")
}

/// Digest covered by the creator signature: every header field except the
/// signature itself, the name fields when present, then the address run.
fn signing_digest(
    date_created: DateTime<Utc>,
    original_data_length: u64,
    address_count: u32,
    tuple_size: u8,
    names: Option<(&str, &str)>,
    addresses: &[ChecksumBuffer],
) -> ChecksumBuffer {
    let mut digest = StreamingChecksum::new();
    digest.update(&(date_created.timestamp_millis() as u64).to_be_bytes());
    digest.update(&original_data_length.to_be_bytes());
    digest.update(&address_count.to_be_bytes());
    digest.update(&[tuple_size]);
    if let Some((file_name, mime_type)) = names {
        digest.update(&[file_name.len() as u8, mime_type.len() as u8]);
        digest.update(file_name.as_bytes());
        digest.update(mime_type.as_bytes());
    }
    for address in addresses {
        digest.update(address.as_bytes());
    }
    digest.finalize()
}

fn frame_cbl(
    creator: &Member,
    size: BlockSize,
    addresses: &[ChecksumBuffer],
    original_data_length: u64,
    tuple_size: u8,
    names: Option<(&str, &str)>,
) -> Result<Block, BlockError> {
    let header_length = CblHeader::SIZE
        + names.map_or(0, |(name, mime)| 2 + name.len() + mime.len());
    let capacity_bytes = size.as_usize() - header_length;
    let address_bytes = addresses.len() * CHECKSUM_LENGTH;
    if address_bytes > capacity_bytes {
        return Err(BlockError::DataLengthExceedsCapacity {
            capacity: capacity_bytes,
            actual: address_bytes,
        });
    }

    let date_created = truncate_to_millis(Utc::now());
    let digest = signing_digest(
        date_created,
        original_data_length,
        addresses.len() as u32,
        tuple_size,
        names,
        addresses,
    );
    let creator_signature = creator.sign(digest.as_bytes())?;

    let base = CblHeader {
        creator_signature,
        date_created,
        original_data_length,
        address_count: addresses.len() as u32,
        tuple_size,
    };
    let variant = match names {
        None => BlockVariant::Cbl(base),
        Some((file_name, mime_type)) => BlockVariant::ExtendedCbl(ExtendedCblHeader {
            base,
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
        }),
    };

    let mut data = match &variant {
        BlockVariant::Cbl(header) => header.encode(),
        BlockVariant::ExtendedCbl(header) => header.encode(),
        _ => unreachable!("variant constructed above"),
    };
    for address in addresses {
        data.extend_from_slice(address.as_bytes());
    }

    Block::new(BlockParams {
        variant,
        data_type: BlockDataType::EphemeralStructuredData,
        size,
        data: &data,
        checksum: None,
        creator: Some(creator.id()),
        date_created: Some(date_created),
        actual_data_length: Some(address_bytes as u64),
    })
}

/// Build a CBL block listing the given constituent addresses.
pub fn new_cbl(
    creator: &Member,
    size: BlockSize,
    addresses: &[ChecksumBuffer],
    original_data_length: u64,
    tuple_size: u8,
) -> Result<Block, BlockError> {
    frame_cbl(creator, size, addresses, original_data_length, tuple_size, None)
}

/// Build an ExtendedCBL block carrying a file name and MIME type.
pub fn new_extended_cbl(
    creator: &Member,
    size: BlockSize,
    addresses: &[ChecksumBuffer],
    original_data_length: u64,
    tuple_size: u8,
    file_name: &str,
    mime_type: &str,
) -> Result<Block, BlockError> {
    validate_file_name(file_name)?;
    validate_mime_type(mime_type)?;
    frame_cbl(
        creator,
        size,
        addresses,
        original_data_length,
        tuple_size,
        Some((file_name, mime_type)),
    )
}

/// Reinterpret stored block bytes as a CBL (or ExtendedCBL) block.
pub fn cbl_block_from_bytes(
    size: BlockSize,
    data: &[u8],
    extended: bool,
) -> Result<Block, BlockError> {
    if data.len() != size.as_usize() {
        return Err(BlockError::BlockSizeMismatch {
            expected: size.as_usize(),
            actual: data.len(),
        });
    }
    let variant = if extended {
        BlockVariant::ExtendedCbl(ExtendedCblHeader::decode(data)?)
    } else {
        BlockVariant::Cbl(CblHeader::decode(data)?)
    };
    let (address_count, date_created) = match &variant {
        BlockVariant::Cbl(header) => (header.address_count, header.date_created),
        BlockVariant::ExtendedCbl(header) => (header.base.address_count, header.base.date_created),
        _ => unreachable!("variant constructed above"),
    };
    let address_bytes = address_count as usize * CHECKSUM_LENGTH;
    if variant.header_length() + address_bytes > size.as_usize() {
        return Err(BlockError::InvalidHeader(format!(
            "address count {} overruns the block",
            address_count
        )));
    }

    Block::new(BlockParams {
        variant,
        data_type: BlockDataType::EphemeralStructuredData,
        size,
        data,
        checksum: None,
        creator: None,
        date_created: Some(date_created),
        actual_data_length: Some(address_bytes as u64),
    })
}

impl Block {
    /// The CBL header, when this block is a CBL variant.
    pub fn cbl_header(&self) -> Result<&CblHeader, BlockError> {
        match self.variant() {
            BlockVariant::Cbl(header) => Ok(header),
            BlockVariant::ExtendedCbl(header) => Ok(&header.base),
            _ => Err(BlockError::InvalidHeader(
                "block is not a constituent block list".to_string(),
            )),
        }
    }

    /// Decode the dense address list of a CBL variant.
    pub fn addresses(&self) -> Result<Vec<ChecksumBuffer>, BlockError> {
        let offset = self.variant().header_length();
        let count = self.cbl_header()?.address_count as usize;
        let end = offset + count * CHECKSUM_LENGTH;
        if end > self.data().len() {
            return Err(BlockError::InvalidHeader(format!(
                "address count {} overruns the block",
                count
            )));
        }

        let mut addresses = Vec::with_capacity(count);
        for chunk in self.data()[offset..end].chunks_exact(CHECKSUM_LENGTH) {
            let mut bytes = [0u8; CHECKSUM_LENGTH];
            bytes.copy_from_slice(chunk);
            addresses.push(ChecksumBuffer::from_bytes(bytes));
        }
        Ok(addresses)
    }

    /// File name of an ExtendedCBL.
    pub fn file_name(&self) -> Option<&str> {
        match self.variant() {
            BlockVariant::ExtendedCbl(header) => Some(&header.file_name),
            _ => None,
        }
    }

    /// MIME type of an ExtendedCBL.
    pub fn mime_type(&self) -> Option<&str> {
        match self.variant() {
            BlockVariant::ExtendedCbl(header) => Some(&header.mime_type),
            _ => None,
        }
    }

    /// Check the creator signature of a CBL variant against a member's
    /// public key.
    pub fn verify_creator_signature(&self, member: &Member) -> Result<bool, BlockError> {
        let names = match self.variant() {
            BlockVariant::ExtendedCbl(header) => {
                Some((header.file_name.as_str(), header.mime_type.as_str()))
            }
            _ => None,
        };
        let header = self.cbl_header()?;
        let digest = signing_digest(
            header.date_created,
            header.original_data_length,
            header.address_count,
            header.tuple_size,
            names,
            &self.addresses()?,
        );
        Ok(member.verify(digest.as_bytes(), &header.creator_signature))
    }
}
