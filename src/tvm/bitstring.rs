//! Immutable bit strings
//!
//! A `Bitstring` is a view over a bit range of a shared byte buffer. Cells,
//! slices and dictionary labels all hand out `Bitstring`s that point into the
//! same `Bytes` allocation, so taking a substring never copies data.

use crate::tvm::error::{CellError, CellResult};
use bytes::Bytes;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// An immutable sequence of bits backed by a shared byte buffer
#[derive(Clone)]
pub struct Bitstring {
    data: Bytes,
    offset: usize,
    length: usize,
}

impl Bitstring {
    /// The canonical empty bit string
    pub const EMPTY: Bitstring = Bitstring {
        data: Bytes::new(),
        offset: 0,
        length: 0,
    };

    /// Creates a view of `length` bits starting at bit `offset` of `data`
    pub fn new(data: impl Into<Bytes>, offset: usize, length: usize) -> CellResult<Self> {
        let data = data.into();
        let available = data.len() * 8;
        if offset > available || length > available - offset {
            return Err(CellError::OffsetOutOfBounds {
                offset,
                length,
                available,
            });
        }
        Ok(Self {
            data,
            offset,
            length,
        })
    }

    /// Wraps whole bytes as a bit string
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let length = data.len() * 8;
        Self {
            data,
            offset: 0,
            length,
        }
    }

    /// Parses bytes carrying the `10*` completion tag and strips it
    ///
    /// The result shares the input buffer.
    pub fn from_padded_bytes(data: impl Into<Bytes>) -> CellResult<Self> {
        let data = data.into();
        let total = data.len() * 8;
        let padded = Self::from_bytes(data);
        for i in (0..total).rev() {
            if padded.bit(i) {
                return padded.substring(0, i);
            }
        }
        Err(CellError::InvalidData(
            "completion tag not found in padded bits".to_string(),
        ))
    }

    /// Number of bits
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Returns the bit at `index`
    pub fn at(&self, index: usize) -> CellResult<bool> {
        if index >= self.length {
            return Err(CellError::IndexOutOfBounds {
                index,
                length: self.length,
            });
        }
        Ok(self.bit(index))
    }

    #[inline]
    pub(crate) fn bit(&self, index: usize) -> bool {
        let absolute = self.offset + index;
        (self.data[absolute / 8] >> (7 - absolute % 8)) & 1 == 1
    }

    /// Returns a view of `length` bits starting at `offset`
    pub fn substring(&self, offset: usize, length: usize) -> CellResult<Bitstring> {
        if offset > self.length || length > self.length - offset {
            return Err(CellError::OffsetOutOfBounds {
                offset,
                length,
                available: self.length,
            });
        }
        if length == 0 {
            return Ok(Self::EMPTY);
        }
        Ok(Self {
            data: self.data.clone(),
            offset: self.offset + offset,
            length,
        })
    }

    /// Returns the underlying bytes of a range if it is byte aligned
    ///
    /// `Ok(None)` means the range exists but cannot be represented as whole bytes.
    pub fn subbuffer(&self, offset: usize, length: usize) -> CellResult<Option<Bytes>> {
        if offset > self.length || length > self.length - offset {
            return Err(CellError::OffsetOutOfBounds {
                offset,
                length,
                available: self.length,
            });
        }
        let start = self.offset + offset;
        if start % 8 != 0 || length % 8 != 0 {
            return Ok(None);
        }
        Ok(Some(self.data.slice(start / 8..(start + length) / 8)))
    }

    /// Drops the first `n` bits
    pub fn drop_first(&self, n: usize) -> CellResult<Bitstring> {
        if n > self.length {
            return Err(CellError::OffsetOutOfBounds {
                offset: n,
                length: 0,
                available: self.length,
            });
        }
        self.substring(n, self.length - n)
    }

    /// Returns the repeated bit if every bit is the same
    pub fn repeats_same_bit(&self) -> Option<bool> {
        if self.length == 0 {
            return None;
        }
        let first = self.bit(0);
        (1..self.length)
            .all(|i| self.bit(i) == first)
            .then_some(first)
    }

    /// Pads with leading zero bits up to `length` bits
    pub fn pad_left(&self, length: usize) -> Bitstring {
        if self.length >= length {
            return self.clone();
        }
        let mut bits = vec![false; length - self.length];
        bits.extend(self.iter());
        Self::from_bits(&bits)
    }

    /// Builds a bit string from individual bits
    pub fn from_bits(bits: &[bool]) -> Self {
        if bits.is_empty() {
            return Self::EMPTY;
        }
        let mut data = vec![0u8; bits.len().div_ceil(8)];
        for (i, &bit) in bits.iter().enumerate() {
            if bit {
                data[i / 8] |= 0x80 >> (i % 8);
            }
        }
        Self {
            data: Bytes::from(data),
            offset: 0,
            length: bits.len(),
        }
    }

    /// Iterates over the bits
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.length).map(move |i| self.bit(i))
    }

    /// Appends the bits to `out`, starting at a byte boundary, without padding
    pub(crate) fn write_bytes_to(&self, out: &mut Vec<u8>) {
        let start = out.len();
        if self.offset % 8 == 0 {
            let from = self.offset / 8;
            out.extend_from_slice(&self.data[from..from + self.length.div_ceil(8)]);
        } else {
            out.resize(start + self.length.div_ceil(8), 0);
            for i in 0..self.length {
                if self.bit(i) {
                    out[start + i / 8] |= 0x80 >> (i % 8);
                }
            }
        }
        let rem = self.length % 8;
        if rem != 0 {
            let last = out.len() - 1;
            out[last] &= 0xFF << (8 - rem);
        }
    }

    /// Returns the bits as bytes with the `10*` completion tag when not byte aligned
    pub fn to_padded_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.length.div_ceil(8));
        self.write_padded_to(&mut out);
        out
    }

    pub(crate) fn write_padded_to(&self, out: &mut Vec<u8>) {
        self.write_bytes_to(out);
        let rem = self.length % 8;
        if rem != 0 {
            let last = out.len() - 1;
            out[last] |= 0x80 >> rem;
        }
    }

    /// Canonical hex form with `_` marking a non nibble-aligned length
    pub fn to_hex(&self) -> String {
        let padded = self.to_padded_bytes();
        if self.length % 4 == 0 {
            let s = hex::encode_upper(&padded[..self.length.div_ceil(8)]);
            if self.length % 8 == 0 {
                s
            } else {
                s[..s.len() - 1].to_string()
            }
        } else {
            let s = hex::encode_upper(&padded);
            if self.length % 8 <= 4 {
                format!("{}_", &s[..s.len() - 1])
            } else {
                format!("{}_", s)
            }
        }
    }
}

impl Default for Bitstring {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl PartialEq for Bitstring {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.iter().eq(other.iter())
    }
}

impl Eq for Bitstring {}

impl Ord for Bitstring {
    fn cmp(&self, other: &Self) -> Ordering {
        self.iter()
            .cmp(other.iter())
    }
}

impl PartialOrd for Bitstring {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Bitstring {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        self.to_padded_bytes().hash(state);
    }
}

impl fmt::Display for Bitstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Bitstring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{{{}}}", self.to_hex())
    }
}

impl From<Vec<u8>> for Bitstring {
    fn from(data: Vec<u8>) -> Self {
        Self::from_bytes(data)
    }
}
