//! Level mask of a cell
//!
//! Bit `l - 1` of the mask is set when level `l` of the cell carries its own
//! hash. Ordinary cells without pruned descendants have an empty mask.

use crate::tvm::cell::MAX_CELL_LEVEL;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LevelMask(u8);

impl LevelMask {
    pub const EMPTY: LevelMask = LevelMask(0);

    pub const fn new(mask: u8) -> Self {
        Self(mask & 0b111)
    }

    /// Mask with only level `level` significant
    pub const fn one_level(level: u8) -> Self {
        if level == 0 {
            Self(0)
        } else {
            Self::new(1 << (level - 1))
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }

    /// Position of the highest set bit
    pub const fn level(self) -> u8 {
        8 - self.0.leading_zeros() as u8
    }

    /// Number of hashes stored below the top level
    pub const fn hash_index(self) -> u8 {
        self.0.count_ones() as u8
    }

    pub const fn hash_count(self) -> u8 {
        self.hash_index() + 1
    }

    /// Keeps only the low `level` bits
    pub const fn apply(self, level: u8) -> Self {
        if level >= MAX_CELL_LEVEL {
            return self;
        }
        Self(self.0 & ((1 << level) - 1))
    }

    pub const fn is_significant(self, level: u8) -> bool {
        level == 0 || (self.0 >> (level - 1)) & 1 != 0
    }

    pub const fn union(self, other: LevelMask) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn shift_right(self) -> Self {
        Self(self.0 >> 1)
    }
}

impl From<u8> for LevelMask {
    fn from(mask: u8) -> Self {
        Self::new(mask)
    }
}
