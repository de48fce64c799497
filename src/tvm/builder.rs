//! Builder for constructing cells
//!
//! A `Builder` accumulates up to 1023 bits and 4 references and is turned into
//! an immutable [`Cell`] by [`Builder::build`] (or [`Builder::build_exotic`]).
//! Every store checks the remaining capacity first, so a failed store leaves
//! the already written content untouched.
//!
//! # Examples
//!
//! ```rust
//! use tonutils_cell::tvm::{Address, Builder};
//!
//! let mut builder = Builder::new();
//!
//! // Store an address
//! let addr = Address::new(0, [0u8; 32]);
//! builder.store_address(Some(&addr)).unwrap();
//!
//! // Store coins (1 TON)
//! builder.store_coins(1_000_000_000).unwrap();
//!
//! // Store a string
//! builder.store_string("Hello, TON!").unwrap();
//!
//! // Build the cell
//! let cell = builder.build().unwrap();
//! assert_eq!(cell.bit_len(), 267 + 4 + 32 + 88);
//! ```

use crate::tvm::address::Address;
use crate::tvm::bitstring::Bitstring;
use crate::tvm::cell::{Cell, MAX_CELL_BITS, MAX_CELL_REFS};
use crate::tvm::error::{CellError, CellResult};
use crate::tvm::slice::Slice;
use num_bigint::{BigInt, BigUint, Sign};
use std::sync::Arc;

/// Maximum number of whole bytes that fit into one cell
const SNAKE_CHUNK_BYTES: usize = MAX_CELL_BITS / 8;

/// Append-only writer that finalizes into a cell
#[derive(Debug, Clone)]
pub struct Builder {
    data: Vec<u8>,
    bit_len: usize,
    references: Vec<Arc<Cell>>,
    capacity_bits: usize,
    capacity_refs: usize,
}

impl Builder {
    /// Creates a new builder with the full cell capacity
    pub fn new() -> Self {
        Self::with_capacity(MAX_CELL_BITS, MAX_CELL_REFS)
    }

    /// Creates a builder limited to `bits` bits and `refs` references
    ///
    /// Limits above the cell maximum are clamped.
    pub fn with_capacity(bits: usize, refs: usize) -> Self {
        let capacity_bits = bits.min(MAX_CELL_BITS);
        Self {
            data: Vec::with_capacity(capacity_bits.div_ceil(8)),
            bit_len: 0,
            references: Vec::new(),
            capacity_bits,
            capacity_refs: refs.min(MAX_CELL_REFS),
        }
    }

    /// Returns the number of bits used
    pub fn bit_len(&self) -> usize {
        self.bit_len
    }

    /// Returns the number of available bits
    pub fn available_bits(&self) -> usize {
        self.capacity_bits - self.bit_len
    }

    /// Returns the number of available bytes
    pub fn available_bytes(&self) -> usize {
        self.available_bits() / 8
    }

    /// Returns the number of references
    pub fn ref_count(&self) -> usize {
        self.references.len()
    }

    /// Returns the number of available references
    pub fn available_refs(&self) -> usize {
        self.capacity_refs - self.references.len()
    }

    /// Returns a view of the bits written so far
    pub fn bits(&self) -> Bitstring {
        Bitstring::new(self.data.clone(), 0, self.bit_len).unwrap_or_default()
    }

    fn ensure_bits(&self, requested: usize) -> CellResult<()> {
        if requested > self.available_bits() {
            return Err(CellError::Overflow {
                requested,
                available: self.available_bits(),
            });
        }
        Ok(())
    }

    fn ensure_refs(&self, requested: usize) -> CellResult<()> {
        if requested > self.available_refs() {
            return Err(CellError::TooManyReferences {
                max: self.capacity_refs,
            });
        }
        Ok(())
    }

    #[inline]
    fn push_bit(&mut self, bit: bool) {
        if self.bit_len % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 0x80 >> (self.bit_len % 8);
        }
        self.bit_len += 1;
    }

    /// Appends `count` bits of `bytes` starting at bit `skip`, capacity already checked
    fn push_bytes_bits(&mut self, bytes: &[u8], skip: usize, count: usize) {
        if skip == 0 && self.bit_len % 8 == 0 && count % 8 == 0 {
            self.data.extend_from_slice(&bytes[..count / 8]);
            self.bit_len += count;
            return;
        }
        for i in skip..skip + count {
            self.push_bit((bytes[i / 8] >> (7 - i % 8)) & 1 == 1);
        }
    }

    /// Stores a single bit
    pub fn store_bit(&mut self, bit: bool) -> CellResult<&mut Self> {
        self.ensure_bits(1)?;
        self.push_bit(bit);
        Ok(self)
    }

    /// Stores a boolean value as a single bit
    pub fn store_bool(&mut self, value: bool) -> CellResult<&mut Self> {
        self.store_bit(value)
    }

    /// Stores `count` zero bits
    pub fn store_zeros(&mut self, count: usize) -> CellResult<&mut Self> {
        self.ensure_bits(count)?;
        for _ in 0..count {
            self.push_bit(false);
        }
        Ok(self)
    }

    /// Stores all bits of a bit string
    pub fn store_bits(&mut self, bits: &Bitstring) -> CellResult<&mut Self> {
        self.ensure_bits(bits.len())?;
        let mut bytes = Vec::with_capacity(bits.len().div_ceil(8));
        bits.write_bytes_to(&mut bytes);
        self.push_bytes_bits(&bytes, 0, bits.len());
        Ok(self)
    }

    /// Stores multiple bytes
    pub fn store_bytes(&mut self, bytes: &[u8]) -> CellResult<&mut Self> {
        self.ensure_bits(bytes.len() * 8)?;
        self.push_bytes_bits(bytes, 0, bytes.len() * 8);
        Ok(self)
    }

    /// Stores a byte
    pub fn store_u8(&mut self, value: u8) -> CellResult<&mut Self> {
        self.store_bytes(&[value])
    }

    pub fn store_u16(&mut self, value: u16) -> CellResult<&mut Self> {
        self.store_bytes(&value.to_be_bytes())
    }

    /// Stores a u32 value
    pub fn store_u32(&mut self, value: u32) -> CellResult<&mut Self> {
        self.store_bytes(&value.to_be_bytes())
    }

    /// Stores a u64 value
    pub fn store_u64(&mut self, value: u64) -> CellResult<&mut Self> {
        self.store_bytes(&value.to_be_bytes())
    }

    /// Stores the least significant `bits` of the value in big-endian bit order
    ///
    /// Widths above 64 bits are padded with leading zeros.
    pub fn store_uint(&mut self, value: u64, bits: usize) -> CellResult<&mut Self> {
        if bits < 64 && value >> bits != 0 {
            return Err(CellError::out_of_range(value, bits));
        }
        self.ensure_bits(bits)?;
        let value_bits = bits.min(64);
        for _ in value_bits..bits {
            self.push_bit(false);
        }
        let bytes = value.to_be_bytes();
        self.push_bytes_bits(&bytes, 64 - value_bits, value_bits);
        Ok(self)
    }

    /// Stores a signed integer in two's complement
    ///
    /// Widths above 64 bits are sign extended.
    pub fn store_int(&mut self, value: i64, bits: usize) -> CellResult<&mut Self> {
        let fits = match bits {
            0 => value == 0,
            1..=63 => {
                let bound = 1i64 << (bits - 1);
                (-bound..bound).contains(&value)
            }
            _ => true,
        };
        if !fits {
            return Err(CellError::out_of_range(value, bits));
        }
        self.ensure_bits(bits)?;
        let value_bits = bits.min(64);
        for _ in value_bits..bits {
            self.push_bit(value < 0);
        }
        let bytes = value.to_be_bytes();
        self.push_bytes_bits(&bytes, 64 - value_bits, value_bits);
        Ok(self)
    }

    /// Stores an arbitrary precision unsigned integer in `bits` bits
    pub fn store_biguint(&mut self, value: &BigUint, bits: usize) -> CellResult<&mut Self> {
        let value_bits = value.bits() as usize;
        if value_bits > bits {
            return Err(CellError::out_of_range(value, bits));
        }
        self.ensure_bits(bits)?;
        for _ in value_bits..bits {
            self.push_bit(false);
        }
        if value_bits > 0 {
            let bytes = value.to_bytes_be();
            self.push_bytes_bits(&bytes, bytes.len() * 8 - value_bits, value_bits);
        }
        Ok(self)
    }

    /// Stores an arbitrary precision signed integer in two's complement
    pub fn store_bigint(&mut self, value: &BigInt, bits: usize) -> CellResult<&mut Self> {
        let magnitude = value.magnitude();
        let fits = match (value.sign(), bits) {
            (Sign::NoSign, _) => true,
            (_, 0) => false,
            (Sign::Plus, _) => (magnitude.bits() as usize) < bits,
            (Sign::Minus, _) => ((magnitude.clone() - 1u32).bits() as usize) < bits,
        };
        if !fits {
            return Err(CellError::out_of_range(value, bits));
        }
        let unsigned = if value.sign() == Sign::Minus {
            (BigUint::from(1u32) << bits) - magnitude
        } else {
            magnitude.clone()
        };
        self.store_biguint(&unsigned, bits)
    }

    /// Stores a variable-length unsigned integer (VarUInteger)
    ///
    /// `header_bits` encode the byte length, followed by that many bytes.
    pub fn store_var_uint(&mut self, value: u128, header_bits: usize) -> CellResult<&mut Self> {
        let byte_len = (128 - value.leading_zeros() as usize).div_ceil(8);
        if header_bits < 64 && (byte_len as u64) >> header_bits != 0 {
            return Err(CellError::out_of_range(value, header_bits));
        }
        self.ensure_bits(header_bits + byte_len * 8)?;
        self.store_uint(byte_len as u64, header_bits)?;
        self.store_bytes(&value.to_be_bytes()[16 - byte_len..])
    }

    /// Arbitrary precision variant of [`Builder::store_var_uint`]
    pub fn store_var_biguint(&mut self, value: &BigUint, header_bits: usize) -> CellResult<&mut Self> {
        let byte_len = (value.bits() as usize).div_ceil(8);
        if header_bits < 64 && (byte_len as u64) >> header_bits != 0 {
            return Err(CellError::out_of_range(value, header_bits));
        }
        self.ensure_bits(header_bits + byte_len * 8)?;
        self.store_uint(byte_len as u64, header_bits)?;
        self.store_biguint(value, byte_len * 8)
    }

    /// Stores a variable-length signed integer (VarInteger)
    pub fn store_var_int(&mut self, value: i64, header_bits: usize) -> CellResult<&mut Self> {
        let significant = if value < 0 {
            64 - (!value).leading_zeros() as usize
        } else {
            64 - value.leading_zeros() as usize
        };
        let byte_len = if value == 0 {
            0
        } else {
            (significant + 1).div_ceil(8)
        };
        if header_bits < 64 && (byte_len as u64) >> header_bits != 0 {
            return Err(CellError::out_of_range(value, header_bits));
        }
        self.ensure_bits(header_bits + byte_len * 8)?;
        self.store_uint(byte_len as u64, header_bits)?;
        self.store_int(value, byte_len * 8)
    }

    /// Stores coins (VarUInteger 16)
    pub fn store_coins(&mut self, amount: u128) -> CellResult<&mut Self> {
        self.store_var_uint(amount, 4)
    }

    /// Stores a reference to another cell
    pub fn store_ref(&mut self, cell: Arc<Cell>) -> CellResult<&mut Self> {
        self.ensure_refs(1)?;
        self.references.push(cell);
        Ok(self)
    }

    /// Finalizes `builder` and stores it as a reference
    pub fn store_builder_ref(&mut self, builder: Builder) -> CellResult<&mut Self> {
        self.ensure_refs(1)?;
        let cell = builder.build()?;
        self.store_ref(cell)
    }

    /// Stores an optional reference (Maybe ^Cell)
    pub fn store_maybe_ref(&mut self, cell: Option<Arc<Cell>>) -> CellResult<&mut Self> {
        match cell {
            Some(c) => {
                self.ensure_bits(1)?;
                self.ensure_refs(1)?;
                self.store_bit(true)?;
                self.store_ref(c)?;
            }
            None => {
                self.store_bit(false)?;
            }
        }
        Ok(self)
    }

    /// Stores the contents of another cell
    pub fn store_cell(&mut self, cell: &Cell) -> CellResult<&mut Self> {
        self.ensure_bits(cell.bit_len())?;
        self.ensure_refs(cell.reference_count())?;
        self.store_bits(cell.bits())?;
        for reference in cell.references() {
            self.store_ref(reference.clone())?;
        }
        Ok(self)
    }

    /// Stores the unread contents of a slice
    pub fn store_slice(&mut self, slice: &Slice) -> CellResult<&mut Self> {
        self.ensure_bits(slice.remaining_bits())?;
        self.ensure_refs(slice.remaining_refs())?;
        let mut rest = slice.clone();
        let bits = rest.load_remaining_bits()?;
        self.store_bits(&bits)?;
        for reference in rest.load_remaining_refs()? {
            self.store_ref(reference)?;
        }
        Ok(self)
    }

    /// Stores the string bytes inline
    pub fn store_string(&mut self, s: &str) -> CellResult<&mut Self> {
        self.store_bytes(s.as_bytes())
    }

    /// Stores a string using snake encoding, optionally with the zero text prefix
    pub fn store_snake_string(&mut self, s: &str, with_prefix: bool) -> CellResult<&mut Self> {
        if with_prefix {
            let mut bytes = Vec::with_capacity(s.len() + 1);
            bytes.push(0x00);
            bytes.extend_from_slice(s.as_bytes());
            return self.store_snake_bytes(&bytes);
        }
        self.store_snake_bytes(s.as_bytes())
    }

    /// Stores bytes using snake encoding
    ///
    /// Whatever does not fit into this builder continues in a chain of
    /// single-reference cells.
    pub fn store_snake_bytes(&mut self, bytes: &[u8]) -> CellResult<&mut Self> {
        let available = self.available_bytes();
        if bytes.len() <= available {
            return self.store_bytes(bytes);
        }
        self.ensure_refs(1)?;

        let (head, rest) = bytes.split_at(available);
        let mut tail: Option<Arc<Cell>> = None;
        for chunk in rest.chunks(SNAKE_CHUNK_BYTES).rev() {
            let mut builder = Builder::new();
            builder.store_bytes(chunk)?;
            if let Some(next) = tail.take() {
                builder.store_ref(next)?;
            }
            tail = Some(builder.build()?);
        }

        self.store_bytes(head)?;
        if let Some(next) = tail {
            self.store_ref(next)?;
        }
        Ok(self)
    }

    /// Stores a standard address or `addr_none`
    pub fn store_address(&mut self, address: Option<&Address>) -> CellResult<&mut Self> {
        match address {
            None => {
                // addr_none$00
                self.store_uint(0b00, 2)?;
            }
            Some(addr) => {
                // addr_std$10 anycast:(Maybe Anycast) workchain_id:int8 address:bits256
                self.ensure_bits(Address::BIT_LEN)?;
                self.store_uint(0b10, 2)?;
                self.store_bit(false)?;
                self.store_int(addr.workchain as i64, 8)?;
                self.store_bytes(&addr.hash_part)?;
            }
        }
        Ok(self)
    }

    /// Stores a dictionary root (as an optional reference)
    pub fn store_dict(&mut self, dict: Option<Arc<Cell>>) -> CellResult<&mut Self> {
        self.store_maybe_ref(dict)
    }

    /// Builds an ordinary cell
    pub fn build(self) -> CellResult<Arc<Cell>> {
        let bits = Bitstring::new(self.data, 0, self.bit_len)?;
        Ok(Arc::new(Cell::new(bits, self.references, false)?))
    }

    /// Builds an exotic cell, resolving its type from the first byte
    pub fn build_exotic(self) -> CellResult<Arc<Cell>> {
        let bits = Bitstring::new(self.data, 0, self.bit_len)?;
        Ok(Arc::new(Cell::new(bits, self.references, true)?))
    }

    /// Converts to a cell (alias for build)
    pub fn end_cell(self) -> CellResult<Arc<Cell>> {
        self.build()
    }

    /// Converts to a slice
    pub fn to_slice(self) -> CellResult<Slice> {
        let cell = self.build()?;
        Ok(Slice::new(cell))
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
