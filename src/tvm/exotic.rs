//! Exotic cell resolution
//!
//! Exotic cells carry their type in the first byte of data. Pruned branches
//! stand in for a removed subtree, Merkle proofs and updates wrap subtrees
//! whose level-0 hashes are committed in the body.

use crate::tvm::bitstring::Bitstring;
use crate::tvm::builder::Builder;
use crate::tvm::cell::{Cell, CellHash, CellType, HASH_BYTES};
use crate::tvm::error::{CellResult, ExoticCellError};
use crate::tvm::level_mask::LevelMask;
use crate::tvm::slice::Slice;
use std::sync::Arc;

const PRUNED_BRANCH_TAG: u8 = 1;
const LIBRARY_TAG: u8 = 2;
const MERKLE_PROOF_TAG: u8 = 3;
const MERKLE_UPDATE_TAG: u8 = 4;

/// Pruned branch body without the mask byte, kept for old config proofs
const LEGACY_PRUNED_BITS: usize = 8 + 256 + 16;
const MERKLE_PROOF_BITS: usize = 8 + 256 + 16;
const MERKLE_UPDATE_BITS: usize = 8 + 2 * (256 + 16);

/// Decoded body of a pruned branch
#[derive(Debug, Clone)]
pub(crate) struct PrunedBranch {
    pub mask: LevelMask,
    /// Hash and depth of every level below the top one
    pub entries: Vec<(CellHash, u16)>,
}

/// Determines the type of an exotic cell and validates its body
pub(crate) fn resolve(
    bits: &Bitstring,
    references: &[Arc<Cell>],
) -> CellResult<(CellType, Option<PrunedBranch>)> {
    if bits.len() < 8 {
        return Err(ExoticCellError::TooShort.into());
    }
    let mut slice = Slice::from_bits(bits.clone());
    let tag = slice.load_u8()?;
    match tag {
        PRUNED_BRANCH_TAG => {
            let pruned = parse_pruned_branch(&mut slice, bits.len(), references)?;
            Ok((CellType::PrunedBranch, Some(pruned)))
        }
        LIBRARY_TAG => Err(ExoticCellError::LibraryNotSupported.into()),
        MERKLE_PROOF_TAG => {
            check_merkle_proof(&mut slice, bits.len(), references)?;
            Ok((CellType::MerkleProof, None))
        }
        MERKLE_UPDATE_TAG => {
            check_merkle_update(&mut slice, bits.len(), references)?;
            Ok((CellType::MerkleUpdate, None))
        }
        other => Err(ExoticCellError::UnknownType(other).into()),
    }
}

fn parse_pruned_branch(
    slice: &mut Slice,
    bit_len: usize,
    references: &[Arc<Cell>],
) -> CellResult<PrunedBranch> {
    if !references.is_empty() {
        return Err(ExoticCellError::InvalidPrunedBranch("pruned branch must have no references").into());
    }

    let mask = if bit_len == LEGACY_PRUNED_BITS {
        LevelMask::new(1)
    } else {
        let raw = slice.load_u8()?;
        let mask = LevelMask::new(raw);
        if raw > 0b111 || mask.level() < 1 {
            return Err(ExoticCellError::InvalidPrunedBranch("level mask out of range").into());
        }
        let expected = 16 + mask.apply(mask.level() - 1).hash_count() as usize * (256 + 16);
        if bit_len != expected {
            return Err(ExoticCellError::InvalidPrunedBranch("unexpected body length").into());
        }
        mask
    };

    let count = mask.apply(mask.level() - 1).hash_count() as usize;
    let mut hashes = Vec::with_capacity(count);
    for _ in 0..count {
        hashes.push(load_hash(slice)?);
    }
    let mut entries = Vec::with_capacity(count);
    for hash in hashes {
        entries.push((hash, slice.load_u16()?));
    }

    Ok(PrunedBranch { mask, entries })
}

fn check_merkle_proof(
    slice: &mut Slice,
    bit_len: usize,
    references: &[Arc<Cell>],
) -> CellResult<()> {
    if references.len() != 1 {
        return Err(ExoticCellError::InvalidMerkleProof("expected exactly one reference").into());
    }
    if bit_len != MERKLE_PROOF_BITS {
        return Err(ExoticCellError::InvalidMerkleProof("unexpected body length").into());
    }
    let hash = load_hash(slice)?;
    let depth = slice.load_u16()?;
    let child = &references[0];
    if hash != child.hash_at(0) {
        return Err(ExoticCellError::InvalidMerkleProof("hash mismatch").into());
    }
    if depth != child.depth_at(0) {
        return Err(ExoticCellError::InvalidMerkleProof("depth mismatch").into());
    }
    Ok(())
}

fn check_merkle_update(
    slice: &mut Slice,
    bit_len: usize,
    references: &[Arc<Cell>],
) -> CellResult<()> {
    if references.len() != 2 {
        return Err(ExoticCellError::InvalidMerkleUpdate("expected exactly two references").into());
    }
    if bit_len != MERKLE_UPDATE_BITS {
        return Err(ExoticCellError::InvalidMerkleUpdate("unexpected body length").into());
    }
    let old_hash = load_hash(slice)?;
    let new_hash = load_hash(slice)?;
    let old_depth = slice.load_u16()?;
    let new_depth = slice.load_u16()?;
    if old_hash != references[0].hash_at(0) || new_hash != references[1].hash_at(0) {
        return Err(ExoticCellError::InvalidMerkleUpdate("hash mismatch").into());
    }
    if old_depth != references[0].depth_at(0) || new_depth != references[1].depth_at(0) {
        return Err(ExoticCellError::InvalidMerkleUpdate("depth mismatch").into());
    }
    Ok(())
}

fn load_hash(slice: &mut Slice) -> CellResult<CellHash> {
    let mut hash = [0u8; HASH_BYTES];
    hash.copy_from_slice(&slice.load_bytes(HASH_BYTES)?);
    Ok(hash)
}

impl Cell {
    /// Replaces a level 0 `cell` with a level 1 pruned branch
    ///
    /// Cells that already carry a level would lose their higher hashes and are rejected.
    pub fn pruned_branch(cell: &Cell) -> CellResult<Arc<Cell>> {
        if cell.level() != 0 {
            return Err(
                ExoticCellError::InvalidPrunedBranch("only level 0 cells can be pruned").into(),
            );
        }
        let mask = LevelMask::one_level(1);
        let entries = [(cell.hash_at(0), cell.depth_at(0))];

        let mut builder = Builder::new();
        builder.store_u8(PRUNED_BRANCH_TAG)?;
        builder.store_u8(mask.value())?;
        for (hash, _) in &entries {
            builder.store_bytes(hash)?;
        }
        for (_, depth) in &entries {
            builder.store_u16(*depth)?;
        }
        builder.build_exotic()
    }

    /// Wraps `cell` in a Merkle proof
    pub fn merkle_proof(cell: Arc<Cell>) -> CellResult<Arc<Cell>> {
        let mut builder = Builder::new();
        builder.store_u8(MERKLE_PROOF_TAG)?;
        builder.store_bytes(&cell.hash_at(0))?;
        builder.store_u16(cell.depth_at(0))?;
        builder.store_ref(cell)?;
        builder.build_exotic()
    }

    /// Builds a Merkle update from `old` to `new`
    pub fn merkle_update(old: Arc<Cell>, new: Arc<Cell>) -> CellResult<Arc<Cell>> {
        let mut builder = Builder::new();
        builder.store_u8(MERKLE_UPDATE_TAG)?;
        builder.store_bytes(&old.hash_at(0))?;
        builder.store_bytes(&new.hash_at(0))?;
        builder.store_u16(old.depth_at(0))?;
        builder.store_u16(new.depth_at(0))?;
        builder.store_ref(old)?;
        builder.store_ref(new)?;
        builder.build_exotic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::error::CellError;

    fn data_cell(value: u32) -> Arc<Cell> {
        let mut builder = Builder::new();
        builder.store_u32(value).unwrap();
        builder.build().unwrap()
    }

    fn proof_body(hash: &CellHash, depth: u16) -> Builder {
        let mut builder = Builder::new();
        builder.store_u8(MERKLE_PROOF_TAG).unwrap();
        builder.store_bytes(hash).unwrap();
        builder.store_u16(depth).unwrap();
        builder
    }

    #[test]
    fn test_merkle_proof_valid() {
        let child = data_cell(42);
        let proof = Cell::merkle_proof(child.clone()).unwrap();
        assert_eq!(proof.cell_type(), CellType::MerkleProof);
        assert!(proof.is_exotic());
        assert_eq!(proof.level(), 0);
        assert_ne!(proof.hash(), child.hash());
    }

    #[test]
    fn test_merkle_proof_hash_mismatch() {
        let child = data_cell(42);
        let mut builder = proof_body(&[0xAA; 32], child.depth_at(0));
        builder.store_ref(child).unwrap();
        assert_eq!(
            builder.build_exotic().unwrap_err(),
            CellError::InvalidExoticCell(ExoticCellError::InvalidMerkleProof("hash mismatch"))
        );
    }

    #[test]
    fn test_merkle_proof_depth_mismatch() {
        let child = data_cell(42);
        let mut builder = proof_body(&child.hash_at(0), 7);
        builder.store_ref(child).unwrap();
        assert!(matches!(
            builder.build_exotic(),
            Err(CellError::InvalidExoticCell(ExoticCellError::InvalidMerkleProof(_)))
        ));
    }

    #[test]
    fn test_merkle_proof_reference_count() {
        let child = data_cell(42);

        let builder = proof_body(&child.hash_at(0), child.depth_at(0));
        assert!(matches!(
            builder.build_exotic(),
            Err(CellError::InvalidExoticCell(_))
        ));

        let mut builder = proof_body(&child.hash_at(0), child.depth_at(0));
        builder.store_ref(child.clone()).unwrap();
        builder.store_ref(child).unwrap();
        assert!(matches!(
            builder.build_exotic(),
            Err(CellError::InvalidExoticCell(_))
        ));
    }

    #[test]
    fn test_pruned_branch() {
        let original = data_cell(7);
        let pruned = Cell::pruned_branch(&original).unwrap();
        assert_eq!(pruned.cell_type(), CellType::PrunedBranch);
        assert_eq!(pruned.bit_len(), 288);
        assert_eq!(pruned.level(), 1);
        assert_eq!(pruned.hash_at(0), original.hash());
        assert_eq!(pruned.depth_at(0), original.depth());
        assert_ne!(pruned.hash_at(1), original.hash());
        assert_eq!(pruned.hash_at(1), pruned.hash());
        assert_eq!(*pruned, *original);
    }

    #[test]
    fn test_pruned_branch_requires_level_zero() {
        let pruned = Cell::pruned_branch(&data_cell(7)).unwrap();
        let mut holder = Builder::new();
        holder.store_ref(pruned.clone()).unwrap();
        let holder = holder.build().unwrap();
        assert_eq!(holder.level(), 1);

        for cell in [&pruned, &holder] {
            assert!(matches!(
                Cell::pruned_branch(cell),
                Err(CellError::InvalidExoticCell(ExoticCellError::InvalidPrunedBranch(_)))
            ));
        }
    }

    #[test]
    fn test_legacy_pruned_branch() {
        let original = data_cell(7);
        let mut builder = Builder::new();
        builder.store_u8(PRUNED_BRANCH_TAG).unwrap();
        builder.store_bytes(&original.hash()).unwrap();
        builder.store_u16(0).unwrap();
        let pruned = builder.build_exotic().unwrap();
        assert_eq!(pruned.bit_len(), 280);
        assert_eq!(pruned.level_mask(), LevelMask::new(1));
        assert_eq!(pruned.hash_at(0), original.hash());
    }

    #[test]
    fn test_pruned_branch_rejects_references() {
        let mut builder = Builder::new();
        builder.store_u8(PRUNED_BRANCH_TAG).unwrap();
        builder.store_u8(1).unwrap();
        builder.store_bytes(&[0u8; 32]).unwrap();
        builder.store_u16(0).unwrap();
        builder.store_ref(data_cell(1)).unwrap();
        assert!(matches!(
            builder.build_exotic(),
            Err(CellError::InvalidExoticCell(ExoticCellError::InvalidPrunedBranch(_)))
        ));
    }

    #[test]
    fn test_proof_over_pruned_subtree() {
        let left = data_cell(1);
        let right = data_cell(2);
        let mut root = Builder::new();
        root.store_ref(left.clone()).unwrap();
        root.store_ref(right.clone()).unwrap();
        let root = root.build().unwrap();

        let mut partial = Builder::new();
        partial.store_ref(left).unwrap();
        partial.store_ref(Cell::pruned_branch(&right).unwrap()).unwrap();
        let partial = partial.build().unwrap();

        assert_eq!(partial.level(), 1);
        assert_eq!(partial.hash_at(0), root.hash());
        assert_ne!(partial.hash(), root.hash());

        let proof = Cell::merkle_proof(partial).unwrap();
        assert_eq!(proof.level(), 0);
    }

    #[test]
    fn test_merkle_update() {
        let old = data_cell(1);
        let new = data_cell(2);
        let update = Cell::merkle_update(old.clone(), new).unwrap();
        assert_eq!(update.cell_type(), CellType::MerkleUpdate);
        assert_eq!(update.depth(), 1);

        let mut builder = Builder::new();
        builder.store_u8(MERKLE_UPDATE_TAG).unwrap();
        builder.store_bytes(&old.hash()).unwrap();
        builder.store_bytes(&old.hash()).unwrap();
        builder.store_u16(0).unwrap();
        builder.store_u16(0).unwrap();
        builder.store_ref(old).unwrap();
        builder.store_ref(data_cell(3)).unwrap();
        assert!(matches!(
            builder.build_exotic(),
            Err(CellError::InvalidExoticCell(ExoticCellError::InvalidMerkleUpdate(_)))
        ));
    }

    #[test]
    fn test_library_and_unknown_tags() {
        let mut builder = Builder::new();
        builder.store_u8(LIBRARY_TAG).unwrap();
        builder.store_bytes(&[0u8; 32]).unwrap();
        assert_eq!(
            builder.build_exotic().unwrap_err(),
            CellError::InvalidExoticCell(ExoticCellError::LibraryNotSupported)
        );

        let mut builder = Builder::new();
        builder.store_u8(9).unwrap();
        assert_eq!(
            builder.build_exotic().unwrap_err(),
            CellError::InvalidExoticCell(ExoticCellError::UnknownType(9))
        );

        assert_eq!(
            Builder::new().build_exotic().unwrap_err(),
            CellError::InvalidExoticCell(ExoticCellError::TooShort)
        );
    }
}
