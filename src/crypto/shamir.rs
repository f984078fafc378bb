//! Shamir secret sharing over GF(2^bits)
//!
//! The field width is an explicit property of a [`GfField`] instance rather
//! than process-global state, so concurrent seals with different member
//! counts cannot interfere with each other. Widths from 3 to 20 bits are
//! supported; a field of width `bits` holds `2^bits - 1` distinct nonzero
//! evaluation points and therefore at most that many shares.
//!
//! Secrets are packed into field elements bit-by-bit, one polynomial per
//! element: the constant term is the element, the remaining `threshold - 1`
//! coefficients are random, and share `i` is the polynomial evaluated at
//! `x = i`. Combination is Lagrange interpolation at `x = 0`.

use rand::RngCore;

use crate::error::SealingError;

pub const MIN_FIELD_BITS: u16 = 3;
pub const MAX_FIELD_BITS: u16 = 20;

/// Primitive polynomial tails for GF(2^bits), indexed by `bits - 3`.
/// The full modulus is `x^bits + tail`.
const PRIMITIVE_POLY_TAILS: [u32; 18] = [
    3, 3, 5, 3, 3, 29, 17, 9, 5, 83, 27, 43, 3, 45, 9, 39, 39, 9,
];

/// Smallest supported field width whose `2^bits - 1` nonzero points can hold
/// `share_count` distinct shares.
pub fn field_bits_for(share_count: usize) -> u16 {
    let mut bits = MIN_FIELD_BITS;
    while bits < MAX_FIELD_BITS && (1usize << bits) - 1 < share_count {
        bits += 1;
    }
    bits
}

/// One share of a split secret: the evaluation point plus one field element
/// per packed word of the secret.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretShare {
    pub index: u32,
    pub secret_len: u32,
    pub words: Vec<u32>,
}

impl SecretShare {
    /// Fixed big-endian serialization: `index (4) || secret_len (4) || words (4 each)`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(8 + self.words.len() * 4);
        bytes.extend_from_slice(&self.index.to_be_bytes());
        bytes.extend_from_slice(&self.secret_len.to_be_bytes());
        for word in &self.words {
            bytes.extend_from_slice(&word.to_be_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SealingError> {
        if bytes.len() < 8 || bytes.len() % 4 != 0 {
            return Err(SealingError::InvalidShare);
        }
        let index = u32::from_be_bytes(bytes[0..4].try_into().expect("slice length checked"));
        let secret_len = u32::from_be_bytes(bytes[4..8].try_into().expect("slice length checked"));
        let words = bytes[8..]
            .chunks_exact(4)
            .map(|chunk| u32::from_be_bytes(chunk.try_into().expect("chunks_exact yields 4 bytes")))
            .collect();
        Ok(Self {
            index,
            secret_len,
            words,
        })
    }
}

/// A Galois field GF(2^bits) bound to one configured width.
#[derive(Clone, Debug)]
pub struct GfField {
    bits: u16,
    poly_tail: u32,
    element_mask: u32,
}

impl GfField {
    pub fn new(bits: u16) -> Result<Self, SealingError> {
        if !(MIN_FIELD_BITS..=MAX_FIELD_BITS).contains(&bits) {
            return Err(SealingError::InvalidBitRange(bits));
        }
        Ok(Self {
            bits,
            poly_tail: PRIMITIVE_POLY_TAILS[(bits - MIN_FIELD_BITS) as usize],
            element_mask: (1u32 << bits) - 1,
        })
    }

    pub fn bits(&self) -> u16 {
        self.bits
    }

    /// Maximum share count this field can address.
    pub fn max_shares(&self) -> usize {
        (1usize << self.bits) - 1
    }

    /// Multiplication by shift-and-reduce against the primitive polynomial.
    fn mul(&self, mut a: u32, mut b: u32) -> u32 {
        let high_bit = 1u32 << (self.bits - 1);
        let mut result = 0u32;
        while b != 0 {
            if b & 1 != 0 {
                result ^= a;
            }
            b >>= 1;
            let carry = a & high_bit != 0;
            a = (a << 1) & self.element_mask;
            if carry {
                a ^= self.poly_tail;
            }
        }
        result
    }

    fn pow(&self, mut base: u32, mut exp: u32) -> u32 {
        let mut acc = 1u32;
        while exp != 0 {
            if exp & 1 != 0 {
                acc = self.mul(acc, base);
            }
            base = self.mul(base, base);
            exp >>= 1;
        }
        acc
    }

    /// Multiplicative inverse via `a^(2^bits - 2)`. Callers guard zero.
    fn inv(&self, a: u32) -> u32 {
        self.pow(a, (1u32 << self.bits) - 2)
    }

    /// Horner evaluation; `coeffs[0]` is the constant term.
    fn eval(&self, coeffs: &[u32], x: u32) -> u32 {
        let mut acc = 0u32;
        for &coeff in coeffs.iter().rev() {
            acc = self.mul(acc, x) ^ coeff;
        }
        acc
    }

    /// Pack secret bytes into field elements, most significant bits first.
    /// The final element is left-padded with zeros in its low bits.
    fn pack(&self, bytes: &[u8]) -> Vec<u32> {
        let bits = self.bits as u32;
        let mut words = Vec::with_capacity((bytes.len() * 8).div_ceil(bits as usize));
        let mut acc = 0u32;
        let mut pending = 0u32;
        for &byte in bytes {
            acc = (acc << 8) | byte as u32;
            pending += 8;
            while pending >= bits {
                pending -= bits;
                words.push((acc >> pending) & self.element_mask);
            }
            acc &= (1u32 << pending).wrapping_sub(1);
        }
        if pending > 0 {
            words.push((acc << (bits - pending)) & self.element_mask);
        }
        words
    }

    /// Inverse of [`GfField::pack`]; truncates to `byte_len` bytes.
    fn unpack(&self, words: &[u32], byte_len: usize) -> Vec<u8> {
        let bits = self.bits as u32;
        let mut out = Vec::with_capacity(byte_len);
        let mut acc = 0u64;
        let mut pending = 0u32;
        'words: for &word in words {
            acc = (acc << bits) | word as u64;
            pending += bits;
            while pending >= 8 {
                pending -= 8;
                out.push(((acc >> pending) & 0xff) as u8);
                if out.len() == byte_len {
                    break 'words;
                }
            }
            acc &= (1u64 << pending) - 1;
        }
        out
    }

    /// Split a secret into `share_count` shares, any `threshold` of which
    /// reconstruct it.
    pub fn split(
        &self,
        secret: &[u8],
        share_count: usize,
        threshold: usize,
        rng: &mut impl RngCore,
    ) -> Result<Vec<SecretShare>, SealingError> {
        if share_count > self.max_shares() {
            return Err(SealingError::TooManyMembersToUnlock(share_count));
        }
        if threshold == 0 || threshold > share_count {
            return Err(SealingError::InvalidSharesRequired {
                minimum: 1,
                maximum: share_count as u32,
                actual: threshold as u32,
            });
        }

        let words = self.pack(secret);
        let mut shares: Vec<SecretShare> = (1..=share_count)
            .map(|index| SecretShare {
                index: index as u32,
                secret_len: secret.len() as u32,
                words: Vec::with_capacity(words.len()),
            })
            .collect();

        let mut coeffs = vec![0u32; threshold];
        for &word in &words {
            coeffs[0] = word;
            for coeff in coeffs[1..].iter_mut() {
                *coeff = rng.next_u32() & self.element_mask;
            }
            for share in shares.iter_mut() {
                share.words.push(self.eval(&coeffs, share.index));
            }
        }

        Ok(shares)
    }

    /// Reconstruct a secret from shares by Lagrange interpolation at x = 0.
    ///
    /// Order-insensitive; any set of at least `threshold` valid shares of
    /// the same split yields the original secret.
    pub fn combine(&self, shares: &[SecretShare]) -> Result<Vec<u8>, SealingError> {
        let first = shares.first().ok_or(SealingError::InvalidShare)?;
        let word_len = first.words.len();
        let secret_len = first.secret_len;
        for (position, share) in shares.iter().enumerate() {
            if share.words.len() != word_len
                || share.secret_len != secret_len
                || share.index == 0
                || share.index as usize > self.max_shares()
            {
                return Err(SealingError::InvalidShare);
            }
            if shares[..position].iter().any(|other| other.index == share.index) {
                return Err(SealingError::InvalidShare);
            }
        }

        let mut words = Vec::with_capacity(word_len);
        for word_index in 0..word_len {
            let mut acc = 0u32;
            for (i, share) in shares.iter().enumerate() {
                let mut numerator = 1u32;
                let mut denominator = 1u32;
                for (j, other) in shares.iter().enumerate() {
                    if i == j {
                        continue;
                    }
                    numerator = self.mul(numerator, other.index);
                    denominator = self.mul(denominator, share.index ^ other.index);
                }
                let basis = self.mul(numerator, self.inv(denominator));
                acc ^= self.mul(share.words[word_index], basis);
            }
            words.push(acc);
        }

        Ok(self.unpack(&words, secret_len as usize))
    }
}
