//! TON Dictionary (HashmapE) implementation
//!
//! Dictionaries in TON are binary prefix trees stored in cells. Every edge
//! carries a label with the common prefix of the keys below it, a fork stores
//! the `0` and `1` subtrees as two references, and a leaf stores the value
//! right after its label.
//!
//! Encoding is canonical: the label form is picked by bit cost with short
//! winning ties over long, and same only used when strictly cheaper.

use crate::tvm::address::Address;
use crate::tvm::bitstring::Bitstring;
use crate::tvm::builder::Builder;
use crate::tvm::cell::Cell;
use crate::tvm::error::{CellError, CellResult};
use crate::tvm::slice::Slice;
use num_bigint::BigUint;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bits needed to encode a label length up to `max_len`
fn label_len_bits(max_len: usize) -> usize {
    (usize::BITS - max_len.leading_zeros()) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelKind {
    Short,
    Long,
    Same(bool),
}

fn choose_label(label: &Bitstring, max_len: usize) -> LabelKind {
    let n = label.len();
    let k = label_len_bits(max_len);

    let mut kind = LabelKind::Short;
    let mut cost = 2 * n + 2;
    if 2 + k + n < cost {
        kind = LabelKind::Long;
        cost = 2 + k + n;
    }
    if n > 1 {
        if let Some(bit) = label.repeats_same_bit() {
            if 3 + k < cost {
                kind = LabelKind::Same(bit);
            }
        }
    }
    kind
}

/// Writes an edge label whose length is at most `max_len`
fn write_label(label: &Bitstring, max_len: usize, builder: &mut Builder) -> CellResult<()> {
    let n = label.len();
    let k = label_len_bits(max_len);
    match choose_label(label, max_len) {
        LabelKind::Short => {
            // hml_short$0 len:(Unary ~n) s:(n * Bit)
            builder.store_bit(false)?;
            for _ in 0..n {
                builder.store_bit(true)?;
            }
            builder.store_bit(false)?;
            builder.store_bits(label)?;
        }
        LabelKind::Long => {
            // hml_long$10 n:(#<= m) s:(n * Bit)
            builder.store_uint(0b10, 2)?;
            builder.store_uint(n as u64, k)?;
            builder.store_bits(label)?;
        }
        LabelKind::Same(bit) => {
            // hml_same$11 v:Bit n:(#<= m)
            builder.store_uint(0b11, 2)?;
            builder.store_bit(bit)?;
            builder.store_uint(n as u64, k)?;
        }
    }
    Ok(())
}

/// Reads an edge label whose length is at most `max_len`
fn read_label(slice: &mut Slice, max_len: usize) -> CellResult<Bitstring> {
    let k = label_len_bits(max_len);
    let label = if !slice.load_bit()? {
        let mut n = 0;
        while slice.load_bit()? {
            n += 1;
        }
        if n > max_len {
            return Err(label_too_long(n, max_len));
        }
        slice.load_bits(n)?
    } else if !slice.load_bit()? {
        let n = slice.load_uint(k)? as usize;
        if n > max_len {
            return Err(label_too_long(n, max_len));
        }
        slice.load_bits(n)?
    } else {
        let bit = slice.load_bit()?;
        let n = slice.load_uint(k)? as usize;
        if n > max_len {
            return Err(label_too_long(n, max_len));
        }
        Bitstring::from_bits(&vec![bit; n])
    };
    Ok(label)
}

fn label_too_long(n: usize, max_len: usize) -> CellError {
    CellError::InvalidData(format!(
        "dictionary label of {n} bits exceeds the remaining key length {max_len}"
    ))
}

/// Trie node kinds used while encoding
#[derive(Debug, Clone, Copy)]
enum Node {
    Fork(usize, usize),
    Leaf(usize),
}

#[derive(Debug, Clone)]
struct Edge {
    label: Bitstring,
    node: Node,
}

/// Groups sorted keys by common prefix into an edge arena
///
/// Children always get larger indices than their parent.
fn build_edges(keys: &[&Bitstring], key_len: usize) -> CellResult<Vec<Edge>> {
    let placeholder = Edge {
        label: Bitstring::EMPTY,
        node: Node::Leaf(0),
    };
    let mut edges = vec![placeholder.clone()];
    let mut tasks = vec![(0usize, 0usize, keys.len(), 0usize)];

    while let Some((index, lo, hi, prefix)) = tasks.pop() {
        let first = keys[lo];
        let last = keys[hi - 1];
        let mut common = 0;
        while prefix + common < key_len && first.bit(prefix + common) == last.bit(prefix + common) {
            common += 1;
        }
        let label = first.substring(prefix, common)?;

        let node = if hi - lo == 1 {
            Node::Leaf(lo)
        } else {
            let split = prefix + common;
            let mid = lo + keys[lo..hi].partition_point(|key| !key.bit(split));
            let left = edges.len();
            let right = left + 1;
            edges.push(placeholder.clone());
            edges.push(placeholder.clone());
            tasks.push((left, lo, mid, split + 1));
            tasks.push((right, mid, hi, split + 1));
            Node::Fork(left, right)
        };
        edges[index] = Edge { label, node };
    }

    Ok(edges)
}

/// Serializes a non-empty map with `key_len`-bit keys, root edge written into `builder`
pub fn serialize_dict<V, F>(
    entries: &BTreeMap<Bitstring, V>,
    key_len: usize,
    builder: &mut Builder,
    mut store_value: F,
) -> CellResult<()>
where
    F: FnMut(&V, &mut Builder) -> CellResult<()>,
{
    if entries.is_empty() {
        return Err(CellError::EmptyDictionary);
    }
    if let Some(key) = entries.keys().find(|key| key.len() != key_len) {
        return Err(CellError::InvalidData(format!(
            "dictionary key {key} has {} bits, expected {key_len}",
            key.len()
        )));
    }

    let keys: Vec<&Bitstring> = entries.keys().collect();
    let values: Vec<&V> = entries.values().collect();
    let edges = build_edges(&keys, key_len)?;

    // Remaining key length at the start of every edge
    let mut remaining = vec![0usize; edges.len()];
    remaining[0] = key_len;
    for (index, edge) in edges.iter().enumerate() {
        if let Node::Fork(left, right) = edge.node {
            let rest = remaining[index] - edge.label.len() - 1;
            remaining[left] = rest;
            remaining[right] = rest;
        }
    }

    let mut cells: Vec<Option<Arc<Cell>>> = vec![None; edges.len()];
    let mut write_edge = |index: usize,
                          target: &mut Builder,
                          cells: &mut Vec<Option<Arc<Cell>>>|
     -> CellResult<()> {
        let edge = &edges[index];
        write_label(&edge.label, remaining[index], target)?;
        match edge.node {
            Node::Leaf(entry) => store_value(values[entry], target)?,
            Node::Fork(left, right) => {
                for child in [left, right] {
                    let cell = cells[child]
                        .take()
                        .ok_or_else(|| CellError::InvalidData("dictionary child not built".into()))?;
                    target.store_ref(cell)?;
                }
            }
        }
        Ok(())
    };

    for index in (1..edges.len()).rev() {
        let mut child = Builder::new();
        write_edge(index, &mut child, &mut cells)?;
        cells[index] = Some(child.build()?);
    }
    write_edge(0, builder, &mut cells)?;

    log::trace!("Serialized dictionary: {} entries, {} edges", values.len(), edges.len());
    Ok(())
}

/// Parses a dictionary whose root edge starts at the slice cursor
///
/// Exotic child cells (pruned branches of a proof) contribute no entries.
pub fn parse_dict<V, F>(
    slice: &mut Slice,
    key_len: usize,
    mut load_value: F,
) -> CellResult<BTreeMap<Bitstring, V>>
where
    F: FnMut(&mut Slice) -> CellResult<V>,
{
    let mut out = BTreeMap::new();
    let mut pending = Vec::new();
    parse_edge(slice, Vec::new(), key_len, &mut load_value, &mut out, &mut pending)?;
    while let Some((prefix, mut child, rest)) = pending.pop() {
        parse_edge(&mut child, prefix, rest, &mut load_value, &mut out, &mut pending)?;
    }
    Ok(out)
}

fn parse_edge<V, F>(
    slice: &mut Slice,
    mut prefix: Vec<bool>,
    key_len: usize,
    load_value: &mut F,
    out: &mut BTreeMap<Bitstring, V>,
    pending: &mut Vec<(Vec<bool>, Slice, usize)>,
) -> CellResult<()>
where
    F: FnMut(&mut Slice) -> CellResult<V>,
{
    let label = read_label(slice, key_len)?;
    prefix.extend(label.iter());
    let rest = key_len - label.len();
    if rest == 0 {
        out.insert(Bitstring::from_bits(&prefix), load_value(slice)?);
        return Ok(());
    }

    let left = slice.load_ref()?;
    let right = slice.load_ref()?;
    for (bit, child) in [(false, left), (true, right)] {
        if child.is_exotic() {
            log::trace!("Skipping exotic dictionary branch {:?}", child.cell_type());
            continue;
        }
        let mut child_prefix = prefix.clone();
        child_prefix.push(bit);
        pending.push((child_prefix, child.to_slice(), rest - 1));
    }
    Ok(())
}

/// Looks up a single key without decoding the whole dictionary
///
/// Returns the slice positioned at the value, `None` if the key is absent or
/// hidden behind an exotic branch.
pub fn dict_get(root: &Slice, key_len: usize, key: &Bitstring) -> CellResult<Option<Slice>> {
    if key.len() != key_len {
        return Err(CellError::InvalidData(format!(
            "lookup key has {} bits, expected {key_len}",
            key.len()
        )));
    }

    let mut slice = root.clone();
    let mut matched = 0;
    loop {
        let remaining = key_len - matched;
        let label = read_label(&mut slice, remaining)?;
        if label != key.substring(matched, label.len())? {
            return Ok(None);
        }
        matched += label.len();
        if matched == key_len {
            return Ok(Some(slice));
        }

        let branch = key.bit(matched);
        let child = if branch {
            slice.skip_refs(1)?;
            slice.load_ref()?
        } else {
            slice.load_ref()?
        };
        if child.is_exotic() {
            return Ok(None);
        }
        matched += 1;
        slice = child.to_slice();
    }
}

/// Conversion of a key type to and from fixed-width key bits
pub trait DictKey: Sized {
    fn to_key_bits(&self, key_len: usize) -> CellResult<Bitstring>;
    fn from_key_bits(bits: &Bitstring) -> CellResult<Self>;
}

impl DictKey for u64 {
    fn to_key_bits(&self, key_len: usize) -> CellResult<Bitstring> {
        let mut builder = Builder::new();
        builder.store_uint(*self, key_len)?;
        Ok(builder.bits())
    }

    fn from_key_bits(bits: &Bitstring) -> CellResult<Self> {
        Slice::from_bits(bits.clone()).load_uint(bits.len())
    }
}

impl DictKey for i64 {
    fn to_key_bits(&self, key_len: usize) -> CellResult<Bitstring> {
        let mut builder = Builder::new();
        builder.store_int(*self, key_len)?;
        Ok(builder.bits())
    }

    fn from_key_bits(bits: &Bitstring) -> CellResult<Self> {
        Slice::from_bits(bits.clone()).load_int(bits.len())
    }
}

impl DictKey for BigUint {
    fn to_key_bits(&self, key_len: usize) -> CellResult<Bitstring> {
        let mut builder = Builder::new();
        builder.store_biguint(self, key_len)?;
        Ok(builder.bits())
    }

    fn from_key_bits(bits: &Bitstring) -> CellResult<Self> {
        Slice::from_bits(bits.clone()).load_biguint(bits.len())
    }
}

impl DictKey for Bitstring {
    fn to_key_bits(&self, key_len: usize) -> CellResult<Bitstring> {
        if self.len() != key_len {
            return Err(CellError::InvalidData(format!(
                "key has {} bits, expected {key_len}",
                self.len()
            )));
        }
        Ok(self.clone())
    }

    fn from_key_bits(bits: &Bitstring) -> CellResult<Self> {
        Ok(bits.clone())
    }
}

impl DictKey for Address {
    fn to_key_bits(&self, key_len: usize) -> CellResult<Bitstring> {
        if key_len != Address::BIT_LEN {
            return Err(CellError::InvalidData(format!(
                "address keys require {} bit keys",
                Address::BIT_LEN
            )));
        }
        let mut builder = Builder::new();
        builder.store_address(Some(self))?;
        Ok(builder.bits())
    }

    fn from_key_bits(bits: &Bitstring) -> CellResult<Self> {
        Slice::from_bits(bits.clone())
            .load_address()?
            .ok_or_else(|| CellError::InvalidData("addr_none is not a valid key".into()))
    }
}

/// Values with a fixed in-cell representation
pub trait DictValue: Sized {
    fn store_value(&self, builder: &mut Builder) -> CellResult<()>;
    fn load_value(slice: &mut Slice) -> CellResult<Self>;
}

/// Cells are stored as a reference
impl DictValue for Arc<Cell> {
    fn store_value(&self, builder: &mut Builder) -> CellResult<()> {
        builder.store_ref(self.clone())?;
        Ok(())
    }

    fn load_value(slice: &mut Slice) -> CellResult<Self> {
        slice.load_ref()
    }
}

/// A slice value takes everything left in the leaf
impl DictValue for Slice {
    fn store_value(&self, builder: &mut Builder) -> CellResult<()> {
        builder.store_slice(self)?;
        Ok(())
    }

    fn load_value(slice: &mut Slice) -> CellResult<Self> {
        let value = slice.clone();
        slice.skip_bits(slice.remaining_bits())?;
        slice.skip_refs(slice.remaining_refs())?;
        Ok(value)
    }
}

impl DictValue for Address {
    fn store_value(&self, builder: &mut Builder) -> CellResult<()> {
        builder.store_address(Some(self))?;
        Ok(())
    }

    fn load_value(slice: &mut Slice) -> CellResult<Self> {
        slice
            .load_address()?
            .ok_or_else(|| CellError::InvalidData("expected addr_std value".into()))
    }
}

/// TON Dictionary
///
/// An ordered map from fixed-width keys to values. Keys are kept as their
/// canonical bit strings, so iteration follows trie order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dict<V> {
    key_len: usize,
    map: BTreeMap<Bitstring, V>,
}

impl<V> Dict<V> {
    /// Creates a new dictionary with the specified key size
    pub fn new(key_len: usize) -> Self {
        Self {
            key_len,
            map: BTreeMap::new(),
        }
    }

    /// Returns the key size in bits
    pub fn key_len(&self) -> usize {
        self.key_len
    }

    /// Returns the number of entries in the dictionary
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the dictionary is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sets a value, returning the previous one
    pub fn set<K: DictKey>(&mut self, key: K, value: V) -> CellResult<Option<V>> {
        let bits = key.to_key_bits(self.key_len)?;
        Ok(self.map.insert(bits, value))
    }

    /// Gets a value by key
    pub fn get<K: DictKey>(&self, key: &K) -> CellResult<Option<&V>> {
        let bits = key.to_key_bits(self.key_len)?;
        Ok(self.map.get(&bits))
    }

    pub fn remove<K: DictKey>(&mut self, key: &K) -> CellResult<Option<V>> {
        let bits = key.to_key_bits(self.key_len)?;
        Ok(self.map.remove(&bits))
    }

    /// Iterates over raw key bits and values in key order
    pub fn iter(&self) -> impl Iterator<Item = (&Bitstring, &V)> {
        self.map.iter()
    }

    /// Iterates with keys converted to `K`
    pub fn iter_as<K: DictKey>(&self) -> impl Iterator<Item = CellResult<(K, &V)>> {
        self.map
            .iter()
            .map(|(bits, value)| K::from_key_bits(bits).map(|key| (key, value)))
    }

    /// Builds the root cell, `None` for an empty dictionary
    pub fn to_cell_with<F>(&self, store_value: F) -> CellResult<Option<Arc<Cell>>>
    where
        F: FnMut(&V, &mut Builder) -> CellResult<()>,
    {
        if self.is_empty() {
            return Ok(None);
        }
        let mut builder = Builder::new();
        serialize_dict(&self.map, self.key_len, &mut builder, store_value)?;
        Ok(Some(builder.build()?))
    }

    /// Writes the root edge directly into `builder`; fails on an empty dictionary
    pub fn store_root_with<F>(&self, builder: &mut Builder, store_value: F) -> CellResult<()>
    where
        F: FnMut(&V, &mut Builder) -> CellResult<()>,
    {
        serialize_dict(&self.map, self.key_len, builder, store_value)
    }

    /// Writes the dictionary as `Maybe ^Cell`
    pub fn store_with<F>(&self, builder: &mut Builder, store_value: F) -> CellResult<()>
    where
        F: FnMut(&V, &mut Builder) -> CellResult<()>,
    {
        let root = self.to_cell_with(store_value)?;
        builder.store_dict(root)?;
        Ok(())
    }

    /// Parses a root edge starting at the slice cursor
    pub fn load_root_with<F>(slice: &mut Slice, key_len: usize, load_value: F) -> CellResult<Self>
    where
        F: FnMut(&mut Slice) -> CellResult<V>,
    {
        let map = parse_dict(slice, key_len, load_value)?;
        Ok(Self { key_len, map })
    }

    /// Parses a `Maybe ^Cell` dictionary
    pub fn load_with<F>(slice: &mut Slice, key_len: usize, load_value: F) -> CellResult<Self>
    where
        F: FnMut(&mut Slice) -> CellResult<V>,
    {
        match slice.load_maybe_ref()? {
            None => Ok(Self::new(key_len)),
            Some(root) => Self::load_root_with(&mut root.to_slice(), key_len, load_value),
        }
    }
}

impl<V: DictValue> Dict<V> {
    /// Builds the root cell using the value's own representation
    pub fn to_cell(&self) -> CellResult<Option<Arc<Cell>>> {
        self.to_cell_with(|value, builder| value.store_value(builder))
    }

    /// Parses a dictionary stored directly in `cell`
    pub fn from_cell(cell: &Arc<Cell>, key_len: usize) -> CellResult<Self> {
        Self::load_root_with(&mut cell.to_slice(), key_len, V::load_value)
    }
}

impl<V> Default for Dict<V> {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Builder extension for dictionary operations
impl Builder {
    /// Stores a dictionary as `Maybe ^Cell`
    pub fn store_dictionary<V: DictValue>(&mut self, dict: &Dict<V>) -> CellResult<&mut Self> {
        let root = dict.to_cell()?;
        self.store_dict(root)
    }
}

/// Slice extension for dictionary operations
impl Slice {
    /// Loads a `Maybe ^Cell` dictionary
    pub fn load_dict<V: DictValue>(&mut self, key_len: usize) -> CellResult<Dict<V>> {
        Dict::load_with(self, key_len, V::load_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u16_dict(entries: &[(u64, u64)]) -> Dict<u64> {
        let mut dict = Dict::new(16);
        for &(key, value) in entries {
            dict.set(key, value).unwrap();
        }
        dict
    }

    fn store_u16(value: &u64, builder: &mut Builder) -> CellResult<()> {
        builder.store_uint(*value, 16)?;
        Ok(())
    }

    fn label_bits(label: &Bitstring, max_len: usize) -> Bitstring {
        let mut builder = Builder::new();
        write_label(label, max_len, &mut builder).unwrap();
        builder.bits()
    }

    fn bits(s: &str) -> Bitstring {
        Bitstring::from_bits(&s.chars().map(|c| c == '1').collect::<Vec<_>>())
    }

    #[test]
    fn test_reference_dictionary_hash() {
        let dict = u16_dict(&[(13, 169), (17, 289), (239, 57121)]);
        let root = dict.to_cell_with(store_u16).unwrap().unwrap();

        let hash = root.hash();
        assert_eq!(hash[0], 0xC8);
        assert_eq!(hash[31], 0x6A);
        assert_eq!(root.depth(), 2);
    }

    #[test]
    fn test_label_forms() {
        // Empty label: short form
        assert_eq!(label_bits(&Bitstring::EMPTY, 16), bits("00"));
        // One bit: short and long both cost 4, short wins
        assert_eq!(label_bits(&bits("1"), 1), bits("0101"));
        // Eight zero bits: same is cheapest
        assert_eq!(label_bits(&bits("00000000"), 8), bits("1101000"));
        // Mixed bits: long beats short
        assert_eq!(
            label_bits(&bits("1011001110"), 10),
            bits("1010101011001110")
        );
    }

    #[test]
    fn test_label_read_back() {
        for (label, max_len) in [
            (Bitstring::EMPTY, 16),
            (bits("1"), 1),
            (bits("11111"), 7),
            (bits("0110"), 300),
        ] {
            let mut builder = Builder::new();
            write_label(&label, max_len, &mut builder).unwrap();
            let mut slice = builder.build().unwrap().to_slice();
            assert_eq!(read_label(&mut slice, max_len).unwrap(), label);
            slice.end_parse().unwrap();
        }
    }

    #[test]
    fn test_label_longer_than_key_rejected() {
        let mut builder = Builder::new();
        write_label(&bits("11"), 16, &mut builder).unwrap();
        let mut slice = builder.build().unwrap().to_slice();
        assert!(read_label(&mut slice, 1).is_err());
    }

    #[test]
    fn test_round_trip() {
        let dict = u16_dict(&[(0, 1), (1, 2), (0xFFFF, 3), (0x8000, 4), (0x1234, 5)]);
        let root = dict.to_cell_with(store_u16).unwrap().unwrap();
        let parsed = Dict::load_root_with(&mut root.to_slice(), 16, |s| s.load_uint(16)).unwrap();
        assert_eq!(parsed, dict);

        let keys: Vec<u64> = parsed.iter_as::<u64>().map(|r| r.unwrap().0).collect();
        assert_eq!(keys, vec![0, 1, 0x1234, 0x8000, 0xFFFF]);
    }

    #[test]
    fn test_single_entry() {
        let dict = u16_dict(&[(7, 70)]);
        let root = dict.to_cell_with(store_u16).unwrap().unwrap();
        assert_eq!(root.reference_count(), 0);
        let parsed = Dict::load_root_with(&mut root.to_slice(), 16, |s| s.load_uint(16)).unwrap();
        assert_eq!(parsed.get(&7u64).unwrap(), Some(&70));
    }

    #[test]
    fn test_empty_dictionary() {
        let dict: Dict<u64> = Dict::new(16);
        let mut builder = Builder::new();
        assert_eq!(
            dict.store_root_with(&mut builder, store_u16),
            Err(CellError::EmptyDictionary)
        );

        dict.store_with(&mut builder, store_u16).unwrap();
        assert_eq!(builder.bit_len(), 1);
        let mut slice = builder.build().unwrap().to_slice();
        let parsed = Dict::load_with(&mut slice, 16, |s| s.load_uint(16)).unwrap();
        assert!(parsed.is_empty());
        slice.end_parse().unwrap();
    }

    #[test]
    fn test_maybe_form_round_trip() {
        let dict = u16_dict(&[(13, 169), (17, 289)]);
        let mut builder = Builder::new();
        builder.store_u8(0xAB).unwrap();
        dict.store_with(&mut builder, store_u16).unwrap();
        let mut slice = builder.build().unwrap().to_slice();

        assert_eq!(slice.load_u8().unwrap(), 0xAB);
        let parsed = Dict::load_with(&mut slice, 16, |s| s.load_uint(16)).unwrap();
        assert_eq!(parsed, dict);
        slice.end_parse().unwrap();
    }

    #[test]
    fn test_dict_get() {
        let dict = u16_dict(&[(13, 169), (17, 289), (239, 57121)]);
        let root = dict.to_cell_with(store_u16).unwrap().unwrap();
        let slice = root.to_slice();

        for (key, value) in [(13u64, 169u64), (17, 289), (239, 57121)] {
            let key_bits = key.to_key_bits(16).unwrap();
            let mut found = dict_get(&slice, 16, &key_bits).unwrap().unwrap();
            assert_eq!(found.load_uint(16).unwrap(), value);
        }
        let missing = 14u64.to_key_bits(16).unwrap();
        assert!(dict_get(&slice, 16, &missing).unwrap().is_none());
    }

    #[test]
    fn test_pruned_branch_contributes_nothing() {
        let dict = u16_dict(&[(13, 169), (17, 289), (239, 57121)]);
        let root = dict.to_cell_with(store_u16).unwrap().unwrap();

        // Replace the right subtree (key 239) by its pruned branch
        let mut partial = Builder::new();
        partial.store_bits(root.bits()).unwrap();
        partial.store_ref(root.reference(0).unwrap().clone()).unwrap();
        partial
            .store_ref(Cell::pruned_branch(root.reference(1).unwrap()).unwrap())
            .unwrap();
        let partial = partial.build().unwrap();
        assert_eq!(partial.hash_at(0), root.hash_at(0));

        let parsed = Dict::load_root_with(&mut partial.to_slice(), 16, |s| s.load_uint(16)).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed.get(&239u64).unwrap(), None);
        assert!(dict_get(&partial.to_slice(), 16, &239u64.to_key_bits(16).unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_typed_keys_and_values() {
        let owner = Address::new(0, [0x11; 32]);
        let mut dict: Dict<Address> = Dict::new(Address::BIT_LEN);
        dict.set(owner, Address::new(-1, [0x22; 32])).unwrap();
        dict.set(Address::new(-1, [0x01; 32]), owner).unwrap();

        let mut builder = Builder::new();
        builder.store_dictionary(&dict).unwrap();
        let mut slice = builder.build().unwrap().to_slice();
        let parsed: Dict<Address> = slice.load_dict(Address::BIT_LEN).unwrap();
        assert_eq!(parsed, dict);
        assert_eq!(parsed.get(&owner).unwrap(), Some(&Address::new(-1, [0x22; 32])));

        let mut signed: Dict<Arc<Cell>> = Dict::new(8);
        signed.set(-1i64, Arc::new(Cell::empty())).unwrap();
        signed.set(1i64, Arc::new(Cell::empty())).unwrap();
        let root = signed.to_cell().unwrap().unwrap();
        let parsed: Dict<Arc<Cell>> = Dict::from_cell(&root, 8).unwrap();
        let keys: Vec<i64> = parsed.iter_as::<i64>().map(|r| r.unwrap().0).collect();
        assert_eq!(keys, vec![1, -1]);
    }

    #[test]
    fn test_key_width_checked() {
        let mut dict: Dict<u64> = Dict::new(8);
        assert!(dict.set(256u64, 1).is_err());
        assert!(dict.set(bits("101"), 1).is_err());
        assert!(dict.set(BigUint::from(255u32), 1).is_ok());
        assert_eq!(dict.get(&255u64).unwrap(), Some(&1));
    }
}
