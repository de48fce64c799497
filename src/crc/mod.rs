//! Checksums used by the bag-of-cells format

use crc::{Crc, CRC_32_ISCSI};

/// CRC32-C (Castagnoli) implementation
pub const CRC32C: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Computes the CRC32-C checksum of `data`
pub fn crc32c(data: &[u8]) -> u32 {
    CRC32C.checksum(data)
}

#[cfg(test)]
mod tests;
