//! TVM (TON Virtual Machine) data structures and utilities
//!
//! This module provides the cell model used across TON:
//! - Bitstring: immutable bit views over shared buffers
//! - Cell: up to 1023 bits and 4 references, with per-level hashes
//! - Builder / Slice: writing and reading cells
//! - BoC: Bag of Cells serialization
//! - Dict: prefix-tree dictionaries stored in cells
//! - Address: standard address record

pub mod address;
pub mod bitstring;
pub mod boc;
pub mod builder;
pub mod cell;
pub mod dict;
pub mod error;
mod exotic;
pub mod level_mask;
pub mod slice;

pub use address::Address;
pub use bitstring::Bitstring;
pub use boc::{
    BocOptions, base64_to_boc, boc_to_base64, boc_to_hex, deserialize_boc,
    deserialize_boc_multi, hex_to_boc, serialize_boc, serialize_boc_multi,
};
pub use builder::Builder;
pub use cell::{Cell, CellHash, CellType, MAX_CELL_BITS, MAX_CELL_LEVEL, MAX_CELL_REFS};
pub use dict::{Dict, DictKey, DictValue, dict_get, parse_dict, serialize_dict};
pub use error::{CellError, CellResult, ExoticCellError};
pub use level_mask::LevelMask;
pub use slice::Slice;
