//! Bag of Cells (BoC) serialization and deserialization
//!
//! BoC is a serialization format that encodes a cell graph into a byte array.
//! Identical subtrees are stored once, cells are ordered so that every
//! reference points to a later index, and the first cell is the root.
//!
//! The writer always produces the generic `b5ee9c72` layout. The reader also
//! accepts the legacy indexed layouts `68ff65f3` and `acc3a728`.

use crate::crc::crc32c;
use crate::tvm::bitstring::Bitstring;
use crate::tvm::cell::{Cell, CellHash, MAX_CELL_REFS};
use crate::tvm::error::{CellError, CellResult};
use crate::tvm::level_mask::LevelMask;
use base64::Engine;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// BoC magic number for the generic format
const BOC_GENERIC_MAGIC: u32 = 0xb5ee9c72;

/// BoC magic number for the legacy indexed format
const BOC_INDEXED_MAGIC: u32 = 0x68ff65f3;

/// BoC magic number for the legacy indexed format with CRC32-C
const BOC_INDEXED_CRC32C_MAGIC: u32 = 0xacc3a728;

/// Flags of the generic header
const FLAG_HAS_IDX: u8 = 0x80;
const FLAG_HAS_CRC32C: u8 = 0x40;
const FLAG_HAS_CACHE_BITS: u8 = 0x20;
const FLAG_HAS_HASHES: u8 = 0x10;
const FLAG_RESERVED: u8 = 0x18;

/// Writer options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BocOptions {
    /// Emit the offset index after the root list
    pub has_idx: bool,
    /// Append a CRC32-C of everything before it
    pub has_crc32c: bool,
}

impl BocOptions {
    pub fn new(has_idx: bool, has_crc32c: bool) -> Self {
        Self {
            has_idx,
            has_crc32c,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Orders unique cells so that the roots come first and references point forward
fn topological_sort(roots: &[Arc<Cell>]) -> CellResult<Vec<Arc<Cell>>> {
    let mut marks: HashMap<CellHash, Mark> = HashMap::new();
    let mut postorder: Vec<Arc<Cell>> = Vec::new();

    for root in roots.iter().rev() {
        if marks.contains_key(&root.hash()) {
            continue;
        }
        marks.insert(root.hash(), Mark::Visiting);
        let mut stack: Vec<(Arc<Cell>, usize)> = vec![(root.clone(), 0)];

        while let Some((cell, next)) = stack.last_mut() {
            if *next < cell.reference_count() {
                let child = cell.references()[*next].clone();
                *next += 1;
                match marks.get(&child.hash()) {
                    Some(Mark::Visiting) => return Err(CellError::NotADag),
                    Some(Mark::Done) => {}
                    None => {
                        marks.insert(child.hash(), Mark::Visiting);
                        stack.push((child, 0));
                    }
                }
            } else if let Some((cell, _)) = stack.pop() {
                marks.insert(cell.hash(), Mark::Done);
                postorder.push(cell);
            }
        }
    }

    postorder.reverse();
    Ok(postorder)
}

/// Number of bytes needed to store `value`, at least one
fn bytes_needed(value: usize) -> usize {
    let bits = (usize::BITS - value.leading_zeros()) as usize;
    bits.div_ceil(8).max(1)
}

fn write_uint(out: &mut Vec<u8>, value: usize, size: usize) {
    let mut buf = [0u8; 8];
    BigEndian::write_uint(&mut buf, value as u64, size);
    out.extend_from_slice(&buf[..size]);
}

/// Serializes a single root into a Bag of Cells
pub fn serialize_boc(root: &Arc<Cell>, options: &BocOptions) -> CellResult<Vec<u8>> {
    serialize_boc_multi(std::slice::from_ref(root), options)
}

/// Serializes several roots into one Bag of Cells
pub fn serialize_boc_multi(roots: &[Arc<Cell>], options: &BocOptions) -> CellResult<Vec<u8>> {
    if roots.is_empty() {
        return Err(CellError::boc("at least one root is required"));
    }

    let cells = topological_sort(roots)?;
    let indices: HashMap<CellHash, usize> = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| (cell.hash(), i))
        .collect();
    let index_of = |cell: &Arc<Cell>| {
        indices
            .get(&cell.hash())
            .copied()
            .ok_or_else(|| CellError::boc("cell missing from the index map"))
    };

    let size_bytes = bytes_needed(cells.len());

    // Cell bodies and their cumulative end offsets
    let mut body = Vec::new();
    let mut offsets = Vec::with_capacity(cells.len());
    for cell in &cells {
        body.extend_from_slice(&cell.descriptors());
        body.extend_from_slice(&cell.padded_data());
        for reference in cell.references() {
            write_uint(&mut body, index_of(reference)?, size_bytes);
        }
        offsets.push(body.len());
    }
    let offset_bytes = bytes_needed(body.len());

    let mut flags = size_bytes as u8;
    if options.has_idx {
        flags |= FLAG_HAS_IDX;
    }
    if options.has_crc32c {
        flags |= FLAG_HAS_CRC32C;
    }

    let mut result = Vec::with_capacity(body.len() + 32);
    result.extend_from_slice(&BOC_GENERIC_MAGIC.to_be_bytes());
    result.push(flags);
    result.push(offset_bytes as u8);
    write_uint(&mut result, cells.len(), size_bytes);
    write_uint(&mut result, roots.len(), size_bytes);
    // Absent cells
    write_uint(&mut result, 0, size_bytes);
    write_uint(&mut result, body.len(), offset_bytes);
    for root in roots {
        write_uint(&mut result, index_of(root)?, size_bytes);
    }
    if options.has_idx {
        for offset in &offsets {
            write_uint(&mut result, *offset, offset_bytes);
        }
    }
    result.extend_from_slice(&body);

    if options.has_crc32c {
        let crc = crc32c(&result);
        result.extend_from_slice(&crc.to_le_bytes());
    }

    log::debug!(
        "Serialized BoC: {} cells, {} roots, {} bytes",
        cells.len(),
        roots.len(),
        result.len()
    );
    Ok(result)
}

/// Cursor over the raw BoC bytes
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read_bytes(&mut self, n: usize) -> CellResult<&'a [u8]> {
        if n > self.data.len() - self.pos {
            return Err(CellError::boc(format!(
                "unexpected end of data: need {} bytes at offset {}, have {}",
                n,
                self.pos,
                self.data.len() - self.pos
            )));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> CellResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    fn read_uint(&mut self, size: usize) -> CellResult<usize> {
        Ok(BigEndian::read_uint(self.read_bytes(size)?, size) as usize)
    }
}

struct Header {
    size_bytes: usize,
    offset_bytes: usize,
    cell_count: usize,
    root_indices: Vec<usize>,
    has_crc32c: bool,
}

fn read_header(reader: &mut Reader<'_>) -> CellResult<Header> {
    let magic = BigEndian::read_u32(reader.read_bytes(4)?);

    let (size_bytes, has_idx, has_crc32c) = match magic {
        BOC_GENERIC_MAGIC => {
            let flags = reader.read_u8()?;
            if flags & FLAG_RESERVED != 0 {
                return Err(CellError::boc("reserved flags set"));
            }
            if flags & FLAG_HAS_CACHE_BITS != 0 && flags & FLAG_HAS_IDX == 0 {
                return Err(CellError::boc("cache bits require an index"));
            }
            (
                (flags & 0x07) as usize,
                flags & FLAG_HAS_IDX != 0,
                flags & FLAG_HAS_CRC32C != 0,
            )
        }
        BOC_INDEXED_MAGIC => (reader.read_u8()? as usize, true, false),
        BOC_INDEXED_CRC32C_MAGIC => (reader.read_u8()? as usize, true, true),
        _ => {
            return Err(CellError::boc(format!(
                "invalid magic number 0x{magic:08x}"
            )));
        }
    };
    if !(1..=4).contains(&size_bytes) {
        return Err(CellError::boc(format!("invalid reference size {size_bytes}")));
    }

    let offset_bytes = reader.read_u8()? as usize;
    if !(1..=8).contains(&offset_bytes) {
        return Err(CellError::boc(format!("invalid offset size {offset_bytes}")));
    }

    let cell_count = reader.read_uint(size_bytes)?;
    let root_count = reader.read_uint(size_bytes)?;
    let absent = reader.read_uint(size_bytes)?;
    let total_size = reader.read_uint(offset_bytes)?;
    if root_count == 0 || root_count > cell_count {
        return Err(CellError::boc(format!(
            "{root_count} roots declared for {cell_count} cells"
        )));
    }
    if absent > cell_count {
        return Err(CellError::boc("more absent cells than cells"));
    }
    // Every cell takes at least its two descriptor bytes
    let remaining = reader.data.len() - reader.pos;
    if cell_count > remaining / 2 {
        return Err(CellError::boc(format!(
            "{cell_count} cells declared, only {remaining} bytes left"
        )));
    }

    let root_indices = if magic == BOC_GENERIC_MAGIC {
        (0..root_count)
            .map(|_| reader.read_uint(size_bytes))
            .collect::<CellResult<Vec<_>>>()?
    } else {
        vec![0]
    };
    if let Some(bad) = root_indices.iter().find(|&&i| i >= cell_count) {
        return Err(CellError::boc(format!("root index {bad} out of range")));
    }

    if has_idx {
        reader.read_bytes(cell_count * offset_bytes)?;
    }

    // The remaining length is checked against the declared size before parsing cells
    let remaining = reader.data.len() - reader.pos;
    let needed = total_size.saturating_add(if has_crc32c { 4 } else { 0 });
    if remaining < needed {
        return Err(CellError::boc(format!(
            "declared {total_size} bytes of cells, only {remaining} available"
        )));
    }

    Ok(Header {
        size_bytes,
        offset_bytes,
        cell_count,
        root_indices,
        has_crc32c,
    })
}

struct RawCell {
    bits: Bitstring,
    exotic: bool,
    references: Vec<usize>,
}

fn read_raw_cell(reader: &mut Reader<'_>, cells: &Bytes, size_bytes: usize) -> CellResult<RawCell> {
    let d1 = reader.read_u8()?;
    let d2 = reader.read_u8()?;

    let ref_count = (d1 & 0x07) as usize;
    if ref_count > MAX_CELL_REFS {
        return Err(CellError::boc(format!("cell declares {ref_count} references")));
    }
    let exotic = d1 & 0x08 != 0;
    if d1 & FLAG_HAS_HASHES != 0 {
        let mask = LevelMask::new(d1 >> 5);
        reader.read_bytes(mask.hash_count() as usize * (32 + 2))?;
    }

    let data_size = (d2 as usize).div_ceil(2);
    let start = reader.pos;
    reader.read_bytes(data_size)?;
    let data = cells.slice(start..start + data_size);
    let bits = if d2 & 1 == 1 {
        Bitstring::from_padded_bytes(data)?
    } else {
        Bitstring::from_bytes(data)
    };

    let references = (0..ref_count)
        .map(|_| reader.read_uint(size_bytes))
        .collect::<CellResult<Vec<_>>>()?;

    Ok(RawCell {
        bits,
        exotic,
        references,
    })
}

/// Deserializes a Bag of Cells and returns its first root
pub fn deserialize_boc(data: &[u8]) -> CellResult<Arc<Cell>> {
    deserialize_boc_multi(data)?
        .into_iter()
        .next()
        .ok_or_else(|| CellError::boc("no roots"))
}

/// Deserializes a Bag of Cells and returns every root in header order
pub fn deserialize_boc_multi(data: &[u8]) -> CellResult<Vec<Arc<Cell>>> {
    let mut reader = Reader::new(data);
    let header = read_header(&mut reader)?;

    // Cell bodies are sliced out of one shared buffer
    let cells_start = reader.pos;
    let shared = Bytes::copy_from_slice(data);
    let mut raw = Vec::with_capacity(header.cell_count);
    for _ in 0..header.cell_count {
        raw.push(read_raw_cell(&mut reader, &shared, header.size_bytes)?);
    }
    log::trace!(
        "Parsed {} cells from {} bytes (offset size {})",
        raw.len(),
        reader.pos - cells_start,
        header.offset_bytes
    );

    if header.has_crc32c {
        let expected = crc32c(&data[..reader.pos]);
        let stored = LittleEndian::read_u32(reader.read_bytes(4)?);
        if expected != stored {
            return Err(CellError::boc(format!(
                "CRC32-C mismatch: stored 0x{stored:08x}, computed 0x{expected:08x}"
            )));
        }
    }
    if reader.pos != data.len() {
        log::debug!("Ignoring {} trailing bytes after BoC", data.len() - reader.pos);
    }

    // References point forward, so build from the last cell back to the first
    let mut built: Vec<Option<Arc<Cell>>> = vec![None; raw.len()];
    for (i, cell) in raw.into_iter().enumerate().rev() {
        let mut references = Vec::with_capacity(cell.references.len());
        for index in cell.references {
            let child = built
                .get(index)
                .and_then(|c| c.clone())
                .ok_or_else(|| {
                    CellError::boc(format!(
                        "cell {i} references unresolved cell {index}"
                    ))
                })?;
            references.push(child);
        }
        built[i] = Some(Arc::new(Cell::new(cell.bits, references, cell.exotic)?));
    }

    header
        .root_indices
        .iter()
        .map(|&i| {
            built[i]
                .clone()
                .ok_or_else(|| CellError::boc(format!("root {i} was not built")))
        })
        .collect()
}

/// Converts a hex string to a BoC
pub fn hex_to_boc(hex: &str) -> CellResult<Arc<Cell>> {
    let hex: String = hex.split_whitespace().collect();
    let bytes =
        hex::decode(&hex).map_err(|e| CellError::boc(format!("failed to decode hex: {e}")))?;
    deserialize_boc(&bytes)
}

/// Converts a BoC to a hex string
pub fn boc_to_hex(cell: &Arc<Cell>, options: &BocOptions) -> CellResult<String> {
    let bytes = serialize_boc(cell, options)?;
    Ok(hex::encode(bytes))
}

/// Converts a BoC to base64
pub fn boc_to_base64(cell: &Arc<Cell>, options: &BocOptions) -> CellResult<String> {
    let bytes = serialize_boc(cell, options)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
}

/// Converts a base64 string to a BoC
pub fn base64_to_boc(b64: &str) -> CellResult<Arc<Cell>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(b64.trim())
        .map_err(|e| CellError::boc(format!("failed to decode base64: {e}")))?;
    deserialize_boc(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tvm::builder::Builder;
    use crate::tvm::cell::CellType;

    fn sample_tree() -> Arc<Cell> {
        let mut leaf = Builder::new();
        leaf.store_uint(0b101, 3).unwrap();
        let leaf = leaf.build().unwrap();

        let mut middle = Builder::new();
        middle.store_u32(0xDEADBEEF).unwrap();
        middle.store_ref(leaf.clone()).unwrap();
        let middle = middle.build().unwrap();

        let mut root = Builder::new();
        root.store_u8(0x42).unwrap();
        root.store_ref(middle).unwrap();
        root.store_ref(leaf).unwrap();
        root.build().unwrap()
    }

    #[test]
    fn test_empty_cell_bytes() {
        let cell = Arc::new(Cell::empty());
        let plain = serialize_boc(&cell, &BocOptions::default()).unwrap();
        assert_eq!(hex::encode(&plain), "b5ee9c72010101010002000000");
        assert_eq!(
            boc_to_base64(&cell, &BocOptions::default()).unwrap(),
            "te6ccgEBAQEAAgAAAA=="
        );
        assert_eq!(
            boc_to_base64(&cell, &BocOptions::new(false, true)).unwrap(),
            "te6cckEBAQEAAgAAAEysuc0="
        );
    }

    #[test]
    fn test_round_trip_all_flags() {
        let root = sample_tree();
        for has_idx in [false, true] {
            for has_crc32c in [false, true] {
                let options = BocOptions::new(has_idx, has_crc32c);
                let boc = serialize_boc(&root, &options).unwrap();
                let decoded = deserialize_boc(&boc).unwrap();
                assert_eq!(decoded.hash(), root.hash());
                assert_eq!(serialize_boc(&decoded, &options).unwrap(), boc);
            }
        }
    }

    #[test]
    fn test_shared_cell_stored_once() {
        let root = sample_tree();
        let boc = serialize_boc(&root, &BocOptions::default()).unwrap();
        // magic, flags, offset size, then the cell count
        assert_eq!(boc[6], 3);
        // Root index follows the absent count and the total size
        assert_eq!(boc[10], 0);
    }

    #[test]
    fn test_references_point_forward() {
        let root = sample_tree();
        let cells = topological_sort(std::slice::from_ref(&root)).unwrap();
        assert_eq!(cells[0].hash(), root.hash());
        let position: HashMap<CellHash, usize> =
            cells.iter().enumerate().map(|(i, c)| (c.hash(), i)).collect();
        for (i, cell) in cells.iter().enumerate() {
            for reference in cell.references() {
                assert!(position[&reference.hash()] > i);
            }
        }
    }

    #[test]
    fn test_multiple_roots() {
        let a = sample_tree();
        let mut b = Builder::new();
        b.store_u16(0x1234).unwrap();
        let b = b.build().unwrap();

        let boc = serialize_boc_multi(&[a.clone(), b.clone()], &BocOptions::new(true, true)).unwrap();
        let roots = deserialize_boc_multi(&boc).unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0].hash(), a.hash());
        assert_eq!(roots[1].hash(), b.hash());
        assert_eq!(deserialize_boc(&boc).unwrap().hash(), a.hash());
    }

    #[test]
    fn test_unresolved_reference_rejected() {
        // Two cells, the first one referencing itself
        let data = hex::decode("b5ee9c72010102010005000100000000").unwrap();
        let err = deserialize_boc(&data).unwrap_err();
        assert!(matches!(err, CellError::InvalidBoc(_)));
    }

    #[test]
    fn test_bad_magic() {
        let err = deserialize_boc(&hex::decode("deadbeef01010101000200").unwrap()).unwrap_err();
        assert!(matches!(err, CellError::InvalidBoc(msg) if msg.contains("magic")));
    }

    #[test]
    fn test_reserved_flags_rejected() {
        let err = deserialize_boc(&hex::decode("b5ee9c72190101010002000000").unwrap()).unwrap_err();
        assert!(matches!(err, CellError::InvalidBoc(msg) if msg.contains("reserved")));
    }

    #[test]
    fn test_huge_cell_count_rejected() {
        let data = hex::decode("b5ee9c720401ffffffff00000001000000000000000000").unwrap();
        let err = deserialize_boc(&data).unwrap_err();
        assert!(matches!(err, CellError::InvalidBoc(msg) if msg.contains("cells declared")));
    }

    #[test]
    fn test_bad_crc() {
        let root = sample_tree();
        let mut boc = serialize_boc(&root, &BocOptions::new(false, true)).unwrap();
        let last = boc.len() - 1;
        boc[last] ^= 0x01;
        let err = deserialize_boc(&boc).unwrap_err();
        assert!(matches!(err, CellError::InvalidBoc(msg) if msg.contains("CRC32-C")));
    }

    #[test]
    fn test_truncated_input() {
        let root = sample_tree();
        let boc = serialize_boc(&root, &BocOptions::default()).unwrap();
        for len in [0, 3, 5, 9, boc.len() - 1] {
            assert!(deserialize_boc(&boc[..len]).is_err());
        }
    }

    #[test]
    fn test_legacy_indexed_formats() {
        // size, offset size, cells, roots, absent, total size, index, cell data
        let mut v1 = hex::decode("68ff65f3").unwrap();
        v1.extend_from_slice(&[1, 1, 1, 1, 0, 2, 2, 0, 0]);
        let cell = deserialize_boc(&v1).unwrap();
        assert_eq!(cell.hash(), Cell::empty().hash());

        let mut v2 = hex::decode("acc3a728").unwrap();
        v2.extend_from_slice(&[1, 1, 1, 1, 0, 2, 2, 0, 0]);
        let crc = crc32c(&v2);
        v2.extend_from_slice(&crc.to_le_bytes());
        let cell = deserialize_boc(&v2).unwrap();
        assert_eq!(cell.hash(), Cell::empty().hash());

        let last = v2.len() - 1;
        v2[last] ^= 0xFF;
        assert!(deserialize_boc(&v2).is_err());
    }

    #[test]
    fn test_stored_hashes_are_skipped() {
        // Empty cell with the has_hashes bit and one precomputed hash + depth
        let mut data = hex::decode("b5ee9c7201010101002400").unwrap();
        data.push(0x10);
        data.push(0x00);
        data.extend_from_slice(&Cell::empty().hash());
        data.extend_from_slice(&[0, 0]);
        let cell = deserialize_boc(&data).unwrap();
        assert_eq!(cell.hash(), Cell::empty().hash());
    }

    #[test]
    fn test_exotic_cells_round_trip() {
        let root = sample_tree();
        let pruned = Cell::pruned_branch(&root).unwrap();
        let mut holder = Builder::new();
        holder.store_ref(pruned).unwrap();
        let proof = Cell::merkle_proof(holder.build().unwrap()).unwrap();

        let boc = serialize_boc(&proof, &BocOptions::new(true, true)).unwrap();
        let decoded = deserialize_boc(&boc).unwrap();
        assert_eq!(decoded.cell_type(), CellType::MerkleProof);
        assert_eq!(decoded.hash(), proof.hash());
        let inner = decoded.reference(0).unwrap().reference(0).unwrap();
        assert_eq!(inner.cell_type(), CellType::PrunedBranch);
        assert_eq!(inner.hash_at(0), root.hash());
    }

    #[test]
    fn test_hex_conversion() {
        let mut builder = Builder::new();
        builder.store_u8(0xFF).unwrap();
        let cell = builder.build().unwrap();

        let hex = boc_to_hex(&cell, &BocOptions::default()).unwrap();
        let decoded = hex_to_boc(&hex).unwrap();
        assert_eq!(cell.hash(), decoded.hash());
    }

    #[test]
    fn test_options_serde() {
        let options = BocOptions::new(true, false);
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(json, r#"{"has_idx":true,"has_crc32c":false}"#);
        let parsed: BocOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, options);
    }
}
