//! Cell implementation for TON blockchain
//!
//! A cell is a fundamental data structure in TON that can store up to 1023 bits
//! of data and maintain up to 4 references to other cells. Cells are immutable:
//! hashes and depths for every level are computed once, when the cell is built.

use crate::tvm::bitstring::Bitstring;
use crate::tvm::error::{CellError, CellResult};
use crate::tvm::exotic::{self, PrunedBranch};
use crate::tvm::level_mask::LevelMask;
use crate::tvm::slice::Slice;
use sha2::{Digest, Sha256};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Maximum number of bits a cell can store
pub const MAX_CELL_BITS: usize = 1023;

/// Maximum number of references a cell can have
pub const MAX_CELL_REFS: usize = 4;

/// Cell level range (0-3)
pub const MAX_CELL_LEVEL: u8 = 3;

/// Size of a cell hash in bytes
pub const HASH_BYTES: usize = 32;

/// SHA-256 hash of a cell representation
pub type CellHash = [u8; HASH_BYTES];

/// Kind of a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    Ordinary,
    PrunedBranch,
    MerkleProof,
    MerkleUpdate,
}

impl CellType {
    pub fn is_exotic(self) -> bool {
        !matches!(self, CellType::Ordinary)
    }

    pub fn is_merkle(self) -> bool {
        matches!(self, CellType::MerkleProof | CellType::MerkleUpdate)
    }
}

/// Represents a cell in the TON blockchain
pub struct Cell {
    cell_type: CellType,
    bits: Bitstring,
    references: Vec<Arc<Cell>>,
    level_mask: LevelMask,
    hashes: [CellHash; 4],
    depths: [u16; 4],
}

impl Cell {
    /// Creates a cell from its bits and references
    ///
    /// When `exotic` is set the first byte of `bits` selects the cell type and the
    /// body is validated against it.
    pub fn new(bits: Bitstring, references: Vec<Arc<Cell>>, exotic: bool) -> CellResult<Self> {
        if bits.len() > MAX_CELL_BITS {
            return Err(CellError::Overflow {
                requested: bits.len(),
                available: MAX_CELL_BITS,
            });
        }
        if references.len() > MAX_CELL_REFS {
            return Err(CellError::TooManyReferences { max: MAX_CELL_REFS });
        }

        if !exotic {
            return Ok(Self::finalize(CellType::Ordinary, None, bits, references));
        }

        let (cell_type, pruned) = exotic::resolve(&bits, &references)?;
        Ok(Self::finalize(cell_type, pruned.as_ref(), bits, references))
    }

    /// Creates an empty ordinary cell
    pub fn empty() -> Self {
        Self::finalize(CellType::Ordinary, None, Bitstring::EMPTY, Vec::new())
    }

    fn finalize(
        cell_type: CellType,
        pruned: Option<&PrunedBranch>,
        bits: Bitstring,
        references: Vec<Arc<Cell>>,
    ) -> Self {
        let level_mask = match cell_type {
            CellType::Ordinary => references
                .iter()
                .fold(LevelMask::EMPTY, |mask, r| mask.union(r.level_mask)),
            CellType::PrunedBranch => pruned.map(|p| p.mask).unwrap_or_default(),
            CellType::MerkleProof | CellType::MerkleUpdate => references
                .iter()
                .fold(LevelMask::EMPTY, |mask, r| mask.union(r.level_mask))
                .shift_right(),
        };

        let (own_hashes, own_depths) =
            compute_level_hashes(cell_type, level_mask, pruned.is_some(), &bits, &references);

        let mut hashes = [[0u8; HASH_BYTES]; 4];
        let mut depths = [0u16; 4];
        let top_index = level_mask.hash_index() as usize;
        for level in 0..=MAX_CELL_LEVEL {
            let index = level_mask.apply(level).hash_index() as usize;
            let slot = level as usize;
            match pruned {
                Some(pruned) if index != top_index => {
                    let (hash, depth) = pruned.entries[index];
                    hashes[slot] = hash;
                    depths[slot] = depth;
                }
                Some(_) => {
                    hashes[slot] = own_hashes[0];
                    depths[slot] = own_depths[0];
                }
                None => {
                    hashes[slot] = own_hashes[index];
                    depths[slot] = own_depths[index];
                }
            }
        }

        Self {
            cell_type,
            bits,
            references,
            level_mask,
            hashes,
            depths,
        }
    }

    /// Returns the cell's data bits
    pub fn bits(&self) -> &Bitstring {
        &self.bits
    }

    /// Returns the number of bits in the cell
    pub fn bit_len(&self) -> usize {
        self.bits.len()
    }

    /// Returns the cell's references
    pub fn references(&self) -> &[Arc<Cell>] {
        &self.references
    }

    /// Returns the number of references
    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    /// Gets a reference by index
    pub fn reference(&self, index: usize) -> Option<&Arc<Cell>> {
        self.references.get(index)
    }

    pub fn cell_type(&self) -> CellType {
        self.cell_type
    }

    /// Returns whether this is an exotic (special) cell
    pub fn is_exotic(&self) -> bool {
        self.cell_type.is_exotic()
    }

    pub fn level_mask(&self) -> LevelMask {
        self.level_mask
    }

    /// Returns the cell's level (0-3)
    pub fn level(&self) -> u8 {
        self.level_mask.level()
    }

    /// Representation hash, the hash callers usually mean
    pub fn hash(&self) -> CellHash {
        self.hashes[MAX_CELL_LEVEL as usize]
    }

    /// Hash as seen from `level`; levels above 3 are clamped
    pub fn hash_at(&self, level: u8) -> CellHash {
        self.hashes[level.min(MAX_CELL_LEVEL) as usize]
    }

    /// Depth of the representation
    pub fn depth(&self) -> u16 {
        self.depths[MAX_CELL_LEVEL as usize]
    }

    pub fn depth_at(&self, level: u8) -> u16 {
        self.depths[level.min(MAX_CELL_LEVEL) as usize]
    }

    /// Computes the cell's descriptors (2 bytes) as stored in a BoC
    pub fn descriptors(&self) -> [u8; 2] {
        [
            refs_descriptor(self.references.len(), self.is_exotic(), self.level_mask),
            bits_descriptor(self.bits.len()),
        ]
    }

    /// Serializes the cell data with the completion tag if needed
    pub fn padded_data(&self) -> Vec<u8> {
        self.bits.to_padded_bytes()
    }

    /// Starts reading the cell
    pub fn to_slice(self: &Arc<Self>) -> Slice {
        Slice::new(self.clone())
    }
}

/// First descriptor byte: r + 8*s + 32*l
pub(crate) fn refs_descriptor(refs: usize, exotic: bool, mask: LevelMask) -> u8 {
    let exotic_flag = if exotic { 8 } else { 0 };
    refs as u8 + exotic_flag + mask.value() * 32
}

/// Second descriptor byte: floor(b/8) + ceil(b/8)
pub(crate) fn bits_descriptor(bit_len: usize) -> u8 {
    (bit_len / 8 + bit_len.div_ceil(8)) as u8
}

/// Computes hashes and depths for every significant level the cell owns
///
/// A pruned branch only owns its topmost level; lower levels come from its body.
fn compute_level_hashes(
    cell_type: CellType,
    level_mask: LevelMask,
    is_pruned: bool,
    bits: &Bitstring,
    references: &[Arc<Cell>],
) -> (Vec<CellHash>, Vec<u16>) {
    let total = level_mask.hash_count() as usize;
    let skip = if is_pruned { total - 1 } else { 0 };
    let mut hashes: Vec<CellHash> = Vec::with_capacity(total - skip);
    let mut depths = Vec::with_capacity(total - skip);

    let mut hash_index = 0;
    for level in 0..=level_mask.level() {
        if !level_mask.is_significant(level) {
            continue;
        }
        if hash_index < skip {
            hash_index += 1;
            continue;
        }

        let child_level = if cell_type.is_merkle() {
            level + 1
        } else {
            level
        };

        let mut repr = Vec::with_capacity(2 + 128 + references.len() * (2 + HASH_BYTES));
        repr.push(refs_descriptor(
            references.len(),
            cell_type.is_exotic(),
            level_mask.apply(level),
        ));
        repr.push(bits_descriptor(bits.len()));
        match hashes.last() {
            Some(previous) => repr.extend_from_slice(previous),
            None => bits.write_padded_to(&mut repr),
        }

        let mut depth = 0u16;
        for reference in references {
            let child_depth = reference.depth_at(child_level);
            repr.extend_from_slice(&child_depth.to_be_bytes());
            depth = depth.max(child_depth);
        }
        if !references.is_empty() {
            depth = depth.saturating_add(1);
        }
        for reference in references {
            repr.extend_from_slice(&reference.hash_at(child_level));
        }

        hashes.push(Sha256::digest(&repr).into());
        depths.push(depth);
        hash_index += 1;
    }

    (hashes, depths)
}

impl Default for Cell {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.hash_at(0) == other.hash_at(0)
    }
}

impl Eq for Cell {}

impl Hash for Cell {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_at(0).hash(state);
    }
}

impl fmt::Debug for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cell")
            .field("type", &self.cell_type)
            .field("bits", &self.bits)
            .field("references", &self.references.len())
            .field("hash", &hex::encode(self.hash()))
            .finish()
    }
}

/// Prints the tree in fift notation, one cell per line
impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut stack: Vec<(&Cell, usize)> = vec![(self, 0)];
        let mut first = true;
        while let Some((cell, indent)) = stack.pop() {
            if !first {
                writeln!(f)?;
            }
            first = false;
            let tag = match cell.cell_type {
                CellType::Ordinary => 'x',
                CellType::PrunedBranch => 'p',
                CellType::MerkleProof => 'm',
                CellType::MerkleUpdate => 'u',
            };
            write!(f, "{:indent$}{}{{{}}}", "", tag, cell.bits, indent = indent)?;
            for reference in cell.references.iter().rev() {
                stack.push((reference.as_ref(), indent + 1));
            }
        }
        Ok(())
    }
}
