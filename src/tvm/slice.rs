//! Slice implementation for reading data from cells
//!
//! A Slice reads a cell sequentially, tracking the current position in both
//! bits and references. Every `load_*` has a `preload_*` twin that returns the
//! same value without moving the cursor. Reading past the end fails with
//! [`CellError::OffsetOutOfBounds`] and leaves the cursor where it was.

use crate::tvm::address::Address;
use crate::tvm::bitstring::Bitstring;
use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, CellResult};
use num_bigint::{BigInt, BigUint};
use std::sync::Arc;

/// A cursor over the bits and references of a cell
#[derive(Debug, Clone)]
pub struct Slice {
    bits: Bitstring,
    bit_pos: usize,
    references: Vec<Arc<Cell>>,
    ref_pos: usize,
}

impl Slice {
    /// Creates a new slice from a cell
    pub fn new(cell: Arc<Cell>) -> Self {
        Self {
            bits: cell.bits().clone(),
            bit_pos: 0,
            references: cell.references().to_vec(),
            ref_pos: 0,
        }
    }

    /// Creates a slice over bare bits, without references
    pub fn from_bits(bits: Bitstring) -> Self {
        Self {
            bits,
            bit_pos: 0,
            references: Vec::new(),
            ref_pos: 0,
        }
    }

    /// Returns the number of remaining bits
    pub fn remaining_bits(&self) -> usize {
        self.bits.len() - self.bit_pos
    }

    /// Returns the number of remaining references
    pub fn remaining_refs(&self) -> usize {
        self.references.len() - self.ref_pos
    }

    /// Checks if nothing is left to read
    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0 && self.remaining_refs() == 0
    }

    /// Gets the current bit position
    pub fn bit_position(&self) -> usize {
        self.bit_pos
    }

    /// Gets the current reference position
    pub fn ref_position(&self) -> usize {
        self.ref_pos
    }

    /// Resets the slice to the beginning
    pub fn reset(&mut self) {
        self.bit_pos = 0;
        self.ref_pos = 0;
    }

    /// Checks if a specific number of bits can be read
    pub fn can_read_bits(&self, n: usize) -> bool {
        n <= self.remaining_bits()
    }

    /// Checks if a specific number of references can be read
    pub fn can_read_refs(&self, n: usize) -> bool {
        n <= self.remaining_refs()
    }

    fn ensure_bits(&self, n: usize) -> CellResult<()> {
        if !self.can_read_bits(n) {
            return Err(CellError::OffsetOutOfBounds {
                offset: self.bit_pos,
                length: n,
                available: self.bits.len(),
            });
        }
        Ok(())
    }

    /// Reads up to 64 bits at the cursor, bounds already checked
    fn read_u64(&self, bits: usize) -> u64 {
        (0..bits).fold(0u64, |acc, i| {
            (acc << 1) | self.bits.bit(self.bit_pos + i) as u64
        })
    }

    /// Runs `f` on a copy of the slice and commits the cursor only on success
    pub fn try_load<T, F>(&mut self, f: F) -> CellResult<T>
    where
        F: FnOnce(&mut Slice) -> CellResult<T>,
    {
        let mut probe = self.clone();
        let value = f(&mut probe)?;
        self.bit_pos = probe.bit_pos;
        self.ref_pos = probe.ref_pos;
        Ok(value)
    }

    /// Fails unless every bit and reference has been consumed
    pub fn end_parse(&self) -> CellResult<()> {
        if !self.is_empty() {
            return Err(CellError::NotEmpty {
                bits: self.remaining_bits(),
                refs: self.remaining_refs(),
            });
        }
        Ok(())
    }

    /// Preloads a single bit
    pub fn preload_bit(&self) -> CellResult<bool> {
        self.ensure_bits(1)?;
        Ok(self.bits.bit(self.bit_pos))
    }

    /// Loads a single bit
    pub fn load_bit(&mut self) -> CellResult<bool> {
        let bit = self.preload_bit()?;
        self.bit_pos += 1;
        Ok(bit)
    }

    /// Loads a boolean stored as a single bit
    pub fn load_bool(&mut self) -> CellResult<bool> {
        self.load_bit()
    }

    /// Preloads `n` bits as a view into the cell data
    pub fn preload_bits(&self, n: usize) -> CellResult<Bitstring> {
        self.ensure_bits(n)?;
        self.bits.substring(self.bit_pos, n)
    }

    /// Loads `n` bits as a view into the cell data
    pub fn load_bits(&mut self, n: usize) -> CellResult<Bitstring> {
        let bits = self.preload_bits(n)?;
        self.bit_pos += n;
        Ok(bits)
    }

    /// Bit width of `n` bytes, failing like any other overrun when it does not fit
    fn byte_bits(&self, n: usize) -> CellResult<usize> {
        n.checked_mul(8).ok_or(CellError::OffsetOutOfBounds {
            offset: self.bit_pos,
            length: usize::MAX,
            available: self.bits.len(),
        })
    }

    /// Preloads `n` whole bytes
    pub fn preload_bytes(&self, n: usize) -> CellResult<Vec<u8>> {
        let bits = self.preload_bits(self.byte_bits(n)?)?;
        let mut out = Vec::with_capacity(n);
        bits.write_bytes_to(&mut out);
        Ok(out)
    }

    /// Loads multiple bytes
    pub fn load_bytes(&mut self, n: usize) -> CellResult<Vec<u8>> {
        let bytes = self.preload_bytes(n)?;
        self.bit_pos += bytes.len() * 8;
        Ok(bytes)
    }

    /// Loads a byte (8 bits)
    pub fn load_u8(&mut self) -> CellResult<u8> {
        Ok(self.load_uint(8)? as u8)
    }

    /// Loads a u16 value (16 bits, big-endian)
    pub fn load_u16(&mut self) -> CellResult<u16> {
        Ok(self.load_uint(16)? as u16)
    }

    /// Loads a u32 value (32 bits, big-endian)
    pub fn load_u32(&mut self) -> CellResult<u32> {
        Ok(self.load_uint(32)? as u32)
    }

    /// Loads a u64 value (64 bits, big-endian)
    pub fn load_u64(&mut self) -> CellResult<u64> {
        self.load_uint(64)
    }

    /// Preloads an unsigned integer of `bits` bits
    ///
    /// Widths above 64 bits are accepted when the value still fits into `u64`.
    pub fn preload_uint(&self, bits: usize) -> CellResult<u64> {
        if bits <= 64 {
            self.ensure_bits(bits)?;
            return Ok(self.read_u64(bits));
        }
        let value = self.preload_biguint(bits)?;
        u64::try_from(&value).map_err(|_| CellError::out_of_range(value, 64))
    }

    /// Loads an unsigned integer of `bits` bits
    pub fn load_uint(&mut self, bits: usize) -> CellResult<u64> {
        let value = self.preload_uint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Preloads a two's complement integer of `bits` bits
    pub fn preload_int(&self, bits: usize) -> CellResult<i64> {
        match bits {
            0 => Ok(0),
            1..=64 => {
                let unsigned = self.preload_uint(bits)?;
                // Sign extension
                let shift = 64 - bits;
                Ok(((unsigned << shift) as i64) >> shift)
            }
            _ => {
                let value = self.preload_bigint(bits)?;
                i64::try_from(&value).map_err(|_| CellError::out_of_range(value, 64))
            }
        }
    }

    /// Loads a signed integer with a specific number of bits
    pub fn load_int(&mut self, bits: usize) -> CellResult<i64> {
        let value = self.preload_int(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    pub fn preload_biguint(&self, bits: usize) -> CellResult<BigUint> {
        let raw = self.preload_bits(bits)?;
        let mut bytes = Vec::with_capacity(bits.div_ceil(8));
        raw.pad_left(bits.div_ceil(8) * 8).write_bytes_to(&mut bytes);
        Ok(BigUint::from_bytes_be(&bytes))
    }

    /// Loads an arbitrary precision unsigned integer
    pub fn load_biguint(&mut self, bits: usize) -> CellResult<BigUint> {
        let value = self.preload_biguint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    pub fn preload_bigint(&self, bits: usize) -> CellResult<BigInt> {
        let unsigned = BigInt::from(self.preload_biguint(bits)?);
        if bits > 0 && self.bits.bit(self.bit_pos) {
            return Ok(unsigned - (BigInt::from(1u8) << bits));
        }
        Ok(unsigned)
    }

    /// Loads an arbitrary precision signed integer
    pub fn load_bigint(&mut self, bits: usize) -> CellResult<BigInt> {
        let value = self.preload_bigint(bits)?;
        self.bit_pos += bits;
        Ok(value)
    }

    /// Loads a variable-length unsigned integer (VarUInteger)
    ///
    /// The first `header_bits` encode the byte length, then that many bytes follow.
    pub fn load_var_uint(&mut self, header_bits: usize) -> CellResult<u128> {
        self.try_load(|s| {
            let byte_len = s.load_uint(header_bits)? as usize;
            if byte_len > 16 {
                return Err(CellError::out_of_range(
                    format!("{byte_len} bytes"),
                    128,
                ));
            }
            let bytes = s.load_bytes(byte_len)?;
            Ok(bytes
                .iter()
                .fold(0u128, |acc, &b| (acc << 8) | b as u128))
        })
    }

    pub fn preload_var_uint(&self, header_bits: usize) -> CellResult<u128> {
        self.clone().load_var_uint(header_bits)
    }

    /// Arbitrary precision variant of [`Slice::load_var_uint`]
    pub fn load_var_biguint(&mut self, header_bits: usize) -> CellResult<BigUint> {
        self.try_load(|s| {
            let byte_len = s.load_uint(header_bits)? as usize;
            let bytes = s.load_bytes(byte_len)?;
            Ok(BigUint::from_bytes_be(&bytes))
        })
    }

    /// Loads a variable-length signed integer (VarInteger)
    pub fn load_var_int(&mut self, header_bits: usize) -> CellResult<i64> {
        self.try_load(|s| {
            let byte_len = s.load_uint(header_bits)? as usize;
            let bits = s.byte_bits(byte_len)?;
            s.load_int(bits)
        })
    }

    /// Loads coins (VarUInteger 16)
    pub fn load_coins(&mut self) -> CellResult<u128> {
        self.load_var_uint(4)
    }

    pub fn preload_coins(&self) -> CellResult<u128> {
        self.preload_var_uint(4)
    }

    /// Preloads the next reference without advancing the position
    pub fn preload_ref(&self) -> CellResult<Arc<Cell>> {
        self.references
            .get(self.ref_pos)
            .cloned()
            .ok_or(CellError::NoMoreReferences)
    }

    /// Loads a reference to another cell
    pub fn load_ref(&mut self) -> CellResult<Arc<Cell>> {
        let reference = self.preload_ref()?;
        self.ref_pos += 1;
        Ok(reference)
    }

    /// Loads an optional reference (Maybe ^Cell)
    pub fn load_maybe_ref(&mut self) -> CellResult<Option<Arc<Cell>>> {
        self.try_load(|s| {
            if s.load_bit()? {
                Ok(Some(s.load_ref()?))
            } else {
                Ok(None)
            }
        })
    }

    pub fn preload_maybe_ref(&self) -> CellResult<Option<Arc<Cell>>> {
        self.clone().load_maybe_ref()
    }

    /// Skips a number of bits
    pub fn skip_bits(&mut self, n: usize) -> CellResult<()> {
        self.ensure_bits(n)?;
        self.bit_pos += n;
        Ok(())
    }

    /// Skips a number of references
    pub fn skip_refs(&mut self, n: usize) -> CellResult<()> {
        if !self.can_read_refs(n) {
            return Err(CellError::NoMoreReferences);
        }
        self.ref_pos += n;
        Ok(())
    }

    /// Loads all remaining bits
    pub fn load_remaining_bits(&mut self) -> CellResult<Bitstring> {
        self.load_bits(self.remaining_bits())
    }

    /// Loads all remaining references
    pub fn load_remaining_refs(&mut self) -> CellResult<Vec<Arc<Cell>>> {
        let refs = self.references[self.ref_pos..].to_vec();
        self.ref_pos = self.references.len();
        Ok(refs)
    }

    /// Loads snake-encoded bytes, following the reference chain
    ///
    /// Consumes every remaining data bit of this slice. The chain continues
    /// through the next unread reference, so any references stored before
    /// it must be loaded first. Continuation cells hold at most one reference.
    pub fn load_snake_bytes(&mut self) -> CellResult<Vec<u8>> {
        let mut out = Vec::new();
        let mut current = self.clone();
        let mut head = true;
        loop {
            if !head && current.remaining_refs() > 1 {
                return Err(CellError::InvalidData(format!(
                    "snake continuation cell has {} references",
                    current.remaining_refs()
                )));
            }
            head = false;
            let bits = current.remaining_bits();
            if bits % 8 != 0 {
                return Err(CellError::InvalidData(format!(
                    "snake cell holds {bits} bits, not a whole number of bytes"
                )));
            }
            out.extend(current.load_bytes(bits / 8)?);
            if current.remaining_refs() == 0 {
                break;
            }
            let next = current.load_ref()?;
            current = Slice::new(next);
        }

        self.bit_pos = self.bits.len();
        if self.remaining_refs() > 0 {
            self.ref_pos += 1;
        }
        Ok(out)
    }

    /// Loads `n` inline bytes as a UTF-8 string
    pub fn load_string(&mut self, n: usize) -> CellResult<String> {
        self.try_load(|s| {
            let bytes = s.load_bytes(n)?;
            String::from_utf8(bytes).map_err(|e| CellError::InvalidData(e.to_string()))
        })
    }

    /// Loads a snake-encoded UTF-8 string
    pub fn load_snake_string(&mut self) -> CellResult<String> {
        let bytes = self.try_load(Slice::load_snake_bytes)?;
        String::from_utf8(bytes).map_err(|e| CellError::InvalidData(e.to_string()))
    }

    /// Loads a standard address, `None` for `addr_none`
    pub fn load_address(&mut self) -> CellResult<Option<Address>> {
        self.try_load(|s| match s.load_uint(2)? {
            0b00 => Ok(None),
            0b10 => {
                if s.load_bit()? {
                    return Err(CellError::InvalidData(
                        "anycast addresses are not supported".to_string(),
                    ));
                }
                let workchain = s.load_int(8)? as i8;
                let bytes = s.load_bytes(32)?;
                let mut hash_part = [0u8; 32];
                hash_part.copy_from_slice(&bytes);
                Ok(Some(Address::new(workchain, hash_part)))
            }
            tag => Err(CellError::InvalidData(format!(
                "unsupported address tag {tag:02b}"
            ))),
        })
    }
}

impl From<Arc<Cell>> for Slice {
    fn from(cell: Arc<Cell>) -> Self {
        Self::new(cell)
    }
}
