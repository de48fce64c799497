//! Error types shared by the cell model

use thiserror::Error;

/// Errors produced while building, parsing or serializing cells
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CellError {
    #[error("Bit index {index} is out of bounds for length {length}")]
    IndexOutOfBounds { index: usize, length: usize },
    #[error("Range {offset}+{length} is out of bounds for length {available}")]
    OffsetOutOfBounds {
        offset: usize,
        length: usize,
        available: usize,
    },
    #[error("Builder overflow: requested {requested} bits, {available} available")]
    Overflow { requested: usize, available: usize },
    #[error("Value {value} does not fit into {bits} bits")]
    ValueOutOfRange { value: String, bits: usize },
    #[error("Too many references (maximum {max})")]
    TooManyReferences { max: usize },
    #[error("No more references to read")]
    NoMoreReferences,
    #[error("Invalid exotic cell: {0}")]
    InvalidExoticCell(#[from] ExoticCellError),
    #[error("Invalid BoC: {0}")]
    InvalidBoc(String),
    #[error("Cell graph is not a DAG")]
    NotADag,
    #[error("Slice is not empty: {bits} bits and {refs} references left")]
    NotEmpty { bits: usize, refs: usize },
    #[error("Dictionary is empty")]
    EmptyDictionary,
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Reasons an exotic cell failed to resolve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ExoticCellError {
    #[error("exotic cell body is shorter than 8 bits")]
    TooShort,
    #[error("unknown exotic cell type {0}")]
    UnknownType(u8),
    #[error("library cells must be resolved before construction")]
    LibraryNotSupported,
    #[error("invalid pruned branch: {0}")]
    InvalidPrunedBranch(&'static str),
    #[error("invalid merkle proof: {0}")]
    InvalidMerkleProof(&'static str),
    #[error("invalid merkle update: {0}")]
    InvalidMerkleUpdate(&'static str),
}

pub type CellResult<T> = Result<T, CellError>;

impl CellError {
    pub(crate) fn out_of_range(value: impl ToString, bits: usize) -> Self {
        CellError::ValueOutOfRange {
            value: value.to_string(),
            bits,
        }
    }

    pub(crate) fn boc(message: impl Into<String>) -> Self {
        CellError::InvalidBoc(message.into())
    }
}
