//! Bitstring: an ordered sequence of bits naming a prefix-tree node.
//!
//! Bits are stored MSB-first within each byte. Unused trailing bits of the
//! last byte are always zero, so derived equality and hashing compare only
//! the meaningful bits.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A sequence of bits.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BitstringRepr", into = "BitstringRepr")]
pub struct Bitstring {
    bits: usize,
    buf: Vec<u8>,
}

impl Bitstring {
    /// Create an all-zero bitstring of `bits` length.
    pub fn new(bits: usize) -> Self {
        Self {
            bits,
            buf: vec![0u8; bits.div_ceil(8)],
        }
    }

    /// Create a bitstring covering every bit of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bits: bytes.len() * 8,
            buf: bytes.to_vec(),
        }
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.bits
    }

    /// Check for the empty (root) bitstring.
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    /// Backing bytes; trailing bits past `len()` are zero.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Read bit `i`.
    ///
    /// # Panics
    /// If `i >= len()`.
    pub fn get(&self, i: usize) -> bool {
        assert!(i < self.bits, "bit index {i} out of range for length {}", self.bits);
        self.buf[i / 8] & (1 << (7 - (i % 8))) != 0
    }

    /// Set bit `i` to one.
    pub fn set(&mut self, i: usize) {
        assert!(i < self.bits, "bit index {i} out of range for length {}", self.bits);
        self.buf[i / 8] |= 1 << (7 - (i % 8));
    }

    /// Clear bit `i` to zero.
    pub fn clear(&mut self, i: usize) {
        assert!(i < self.bits, "bit index {i} out of range for length {}", self.bits);
        self.buf[i / 8] &= !(1 << (7 - (i % 8)));
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) {
        if self.bits % 8 == 0 {
            self.buf.push(0);
        }
        self.bits += 1;
        if bit {
            self.set(self.bits - 1);
        }
    }

    /// The first `n` bits. Saturates at `len()`.
    pub fn prefix(&self, n: usize) -> Bitstring {
        let n = n.min(self.bits);
        let mut out = Bitstring::new(n);
        for i in 0..n {
            if self.get(i) {
                out.set(i);
            }
        }
        out
    }

    /// Extend `self` with the low `width` bits of `value`, most significant first.
    pub fn extend_with(&self, value: usize, width: usize) -> Bitstring {
        let mut out = self.clone();
        for shift in (0..width).rev() {
            out.push((value >> shift) & 1 == 1);
        }
        out
    }

    /// Read `width` bits starting at `start` as an integer, most significant first.
    ///
    /// Bits past `len()` read as zero.
    pub fn read_bits(&self, start: usize, width: usize) -> usize {
        (start..start + width).fold(0, |acc, i| {
            let bit = i < self.bits && self.get(i);
            (acc << 1) | usize::from(bit)
        })
    }

    /// Concatenate `other` after `self`.
    pub fn concat(&self, other: &Bitstring) -> Bitstring {
        let mut out = self.clone();
        for i in 0..other.len() {
            out.push(other.get(i));
        }
        out
    }

    /// True if `self` is a (not necessarily proper) prefix of `other`.
    pub fn is_prefix_of(&self, other: &Bitstring) -> bool {
        self.bits <= other.bits && (0..self.bits).all(|i| self.get(i) == other.get(i))
    }
}

impl fmt::Display for Bitstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.bits {
            f.write_str(if self.get(i) { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for Bitstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitstring({self})")
    }
}

impl FromStr for Bitstring {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bs = Bitstring::default();
        for c in s.chars() {
            match c {
                '0' => bs.push(false),
                '1' => bs.push(true),
                other => {
                    return Err(CoreError::InvalidBitstring(format!(
                        "unexpected character {other:?}"
                    )))
                }
            }
        }
        Ok(bs)
    }
}

/// Wire form of a bitstring; validated on the way in.
#[derive(Serialize, Deserialize)]
struct BitstringRepr {
    bits: usize,
    buf: Vec<u8>,
}

impl From<Bitstring> for BitstringRepr {
    fn from(bs: Bitstring) -> Self {
        Self {
            bits: bs.bits,
            buf: bs.buf,
        }
    }
}

impl TryFrom<BitstringRepr> for Bitstring {
    type Error = CoreError;

    fn try_from(repr: BitstringRepr) -> Result<Self, Self::Error> {
        if repr.buf.len() != repr.bits.div_ceil(8) {
            return Err(CoreError::InvalidBitstring(format!(
                "{} bytes cannot hold exactly {} bits",
                repr.buf.len(),
                repr.bits
            )));
        }
        let used = repr.bits % 8;
        if let (Some(last), true) = (repr.buf.last(), used != 0) {
            if last & (0xff >> used) != 0 {
                return Err(CoreError::InvalidBitstring(
                    "trailing bits past the length are set".into(),
                ));
            }
        }
        Ok(Self {
            bits: repr.bits,
            buf: repr.buf,
        })
    }
}
